//! Upstream data collaborators.
//!
//! Defines the fetch traits the scan engine depends on and provides the
//! concrete implementations: FinMind (daily prices, institutional flow),
//! Yahoo (fast quotes), and the UDN / cnyes headline feeds, plus the
//! news ranker and the news→candidate alias linker.

pub mod finmind;
pub mod linker;
pub mod news;
pub mod quotes;
pub mod ranker;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::types::{FundFlow, NewsItem, PriceHistory};

/// Snapshot quote for one candidate from a batched lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub volume: f64,
    pub avg_volume_3m: f64,
}

/// Daily price history with derived indicators.
///
/// `None` means the history is unavailable this cycle (upstream down,
/// quota exhausted, unknown id) — never an error to propagate.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_price_history(&self, id: &str, years: u32) -> Option<PriceHistory>;
}

/// Net institutional buy/sell series. `None` when the feature is
/// disabled or the upstream quota is exhausted; rules degrade gracefully.
#[async_trait]
pub trait FundFlowProvider: Send + Sync {
    async fn fetch_fund_flow(&self, id: &str) -> Option<FundFlow>;
}

/// Fast last-price lookups used only by the liquidity prefilter.
///
/// Unlike the providers above, these surface errors: the prefilter's
/// tiered fallback needs to distinguish "the lookup raised" from
/// "the lookup legitimately found nothing".
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Batched quote lookup for `ids` against one market suffix.
    /// Ids absent from the result simply had no quote.
    async fn fetch_batch(&self, ids: &[String], suffix: &str) -> Result<HashMap<String, Quote>>;

    /// Single-candidate latest close. `Ok(None)` means no price known.
    async fn fetch_latest(&self, id: &str, suffix: &str) -> Result<Option<f64>>;
}

/// One raw headline feed. Items come back unranked and unlinked.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch(&self, pages: u32) -> Result<Vec<NewsItem>>;

    /// Source name for logging.
    fn name(&self) -> &'static str;
}
