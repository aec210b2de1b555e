//! Strategy router.
//!
//! Three independent rules evaluated against a candidate's context:
//! technical (price action), fundamental (institutional flow) and news
//! (ranked sentiment). Each rule is a pure function that degrades to a
//! non-triggered "insufficient data" verdict when its input is missing,
//! so the router always returns exactly three results.

mod fundamental;
mod news;
mod technical;

pub use fundamental::strategy_fundamental;
pub use news::strategy_news;
pub use technical::strategy_technical;

use crate::types::{FundFlow, NewsItem, PriceHistory, StrategyResult};

/// Tunables shared across rules. Everything else is fixed by the rules
/// themselves.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    /// Volume must exceed its trailing average by this factor.
    pub volume_multiplier: f64,
    /// Minimum positive sentiment score for the news rule.
    pub positive_threshold: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            volume_multiplier: 1.8,
            positive_threshold: 0.80,
        }
    }
}

/// Evaluate every rule. Order is stable: technical, fundamental, news.
pub fn run_all(
    prices: Option<&PriceHistory>,
    fund_flow: Option<&FundFlow>,
    news: &[NewsItem],
    params: &StrategyParams,
) -> Vec<StrategyResult> {
    vec![
        strategy_technical(prices, params.volume_multiplier),
        strategy_fundamental(fund_flow),
        strategy_news(news, params.positive_threshold),
    ]
}
