//! Fundamental rule: trailing institutional accumulation.

use crate::types::{FundFlow, StrategyResult};

const NAME: &str = "Fundamental";

/// Observations summed for the trigger.
const WINDOW: usize = 3;

/// Net-flow threshold in thousand-share lots.
const FLOW_THRESHOLD: f64 = 1500.0;

/// Triggers when the three institutional categories combined net-bought
/// more than the threshold over the trailing three days. Missing
/// categories were already zeroed during parsing.
pub fn strategy_fundamental(fund_flow: Option<&FundFlow>) -> StrategyResult {
    let Some(flow) = fund_flow else {
        return StrategyResult::skipped(NAME, "insufficient data");
    };
    if flow.len() < WINDOW {
        return StrategyResult::skipped(NAME, "insufficient data");
    }

    let total = flow.trailing_net(WINDOW);
    let triggered = total > FLOW_THRESHOLD;
    let reason = if triggered {
        format!("trailing-3 net institutional flow {total:.0} lots")
    } else {
        format!("trailing-3 net institutional flow {total:.0} lots (below {FLOW_THRESHOLD:.0})")
    };

    StrategyResult {
        strategy: NAME,
        triggered,
        reason,
        advice: None,
    }
}
