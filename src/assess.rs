use crate::tables::RiskRules;
use crate::types::PortOutcome;

/// Produce advisory findings for the open ports in `outcomes`.
///
/// Each matching rule yields one finding per port. Findings are ordered by port,
/// then by rule order, regardless of the order of `outcomes`.
pub fn assess(outcomes: &[PortOutcome], rules: &RiskRules) -> Vec<String> {
    let mut open: Vec<&PortOutcome> = outcomes.iter().filter(|o| o.state.is_open()).collect();
    open.sort_by_key(|o| o.port);

    open.into_iter()
        .flat_map(|o| {
            rules
                .iter()
                .filter(move |rule| rule.matches(o.port, o.service.as_deref()))
                .map(move |rule| format!("Port {}: {}", o.port, rule.advisory))
        })
        .collect()
}
