//! Shared types for the SENTINEL scanner.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that data, strategy, and
//! engine modules can depend on them without circular references.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// One listed security under evaluation in a scan cycle.
/// Identity is `id`; `name` is the display name used in alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.name)
    }
}

// ---------------------------------------------------------------------------
// Price history
// ---------------------------------------------------------------------------

/// One daily observation with derived trailing indicators.
///
/// `ma5`/`ma20` are trailing close averages, `volume_avg` the trailing
/// 20-day volume average. Short prefixes average whatever exists, so the
/// fields are always populated once a history is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
    pub ma5: f64,
    pub ma20: f64,
    pub volume_avg: f64,
}

/// Ordered-by-date daily price history for one candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceHistory {
    pub bars: Vec<PriceBar>,
}

impl PriceHistory {
    /// Build a history from raw (date, close, volume) rows, sorting by date
    /// and computing the derived averages.
    pub fn from_rows(mut rows: Vec<(NaiveDate, f64, f64)>) -> Self {
        rows.sort_by_key(|(d, _, _)| *d);

        let closes: Vec<f64> = rows.iter().map(|(_, c, _)| *c).collect();
        let volumes: Vec<f64> = rows.iter().map(|(_, _, v)| *v).collect();

        let trailing_mean = |xs: &[f64], i: usize, window: usize| -> f64 {
            let start = (i + 1).saturating_sub(window);
            let slice = &xs[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        };

        let bars = rows
            .iter()
            .enumerate()
            .map(|(i, (date, close, volume))| PriceBar {
                date: *date,
                close: *close,
                volume: *volume,
                ma5: trailing_mean(&closes, i, 5),
                ma20: trailing_mean(&closes, i, 20),
                volume_avg: trailing_mean(&volumes, i, 20),
            })
            .collect();

        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// Maximum close over the `n` bars preceding the latest one
    /// (the latest bar itself is excluded).
    pub fn prior_high(&self, n: usize) -> Option<f64> {
        let len = self.bars.len();
        if len < 2 {
            return None;
        }
        let end = len - 1;
        let start = end.saturating_sub(n);
        self.bars[start..end]
            .iter()
            .map(|b| b.close)
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))))
    }
}

// ---------------------------------------------------------------------------
// Fund flow
// ---------------------------------------------------------------------------

/// One day of net institutional buy/sell volume per category.
/// Values are net (buy − sell); missing upstream categories are zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundFlowDay {
    pub date: NaiveDate,
    pub foreign_investor: f64,
    pub investment_trust: f64,
    pub dealer: f64,
}

impl FundFlowDay {
    /// Net flow across all categories for this day.
    pub fn net_total(&self) -> f64 {
        self.foreign_investor + self.investment_trust + self.dealer
    }
}

/// Ordered-by-date institutional fund-flow series for one candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundFlow {
    pub days: Vec<FundFlowDay>,
}

impl FundFlow {
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Sum of net flow over the trailing `n` days.
    pub fn trailing_net(&self, n: usize) -> f64 {
        let start = self.days.len().saturating_sub(n);
        self.days[start..].iter().map(|d| d.net_total()).sum()
    }
}

// ---------------------------------------------------------------------------
// News
// ---------------------------------------------------------------------------

/// Sentiment classification for a ranked news item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "POSITIVE"),
            Sentiment::Negative => write!(f, "NEGATIVE"),
            Sentiment::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// One news item, produced once per refresh cycle and shared read-only
/// across all candidates. The sentiment fields are filled by the ranker;
/// a freshly fetched item is Neutral with zero scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub body: String,
    /// Publish time as reported by the source, best-effort parseable.
    pub publish_time: String,
    pub source: String,
    pub url: String,
    pub sentiment: Sentiment,
    pub sentiment_score: f64,
    pub weighted_score: f64,
}

impl NewsItem {
    pub fn raw(
        title: impl Into<String>,
        body: impl Into<String>,
        publish_time: impl Into<String>,
        source: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            publish_time: publish_time.into(),
            source: source.into(),
            url: url.into(),
            sentiment: Sentiment::Neutral,
            sentiment_score: 0.0,
            weighted_score: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy results
// ---------------------------------------------------------------------------

/// Suggested price levels attached to a triggered strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub buy_low: f64,
    pub buy_high: f64,
    pub stop: f64,
    pub tp1: f64,
    pub tp2: f64,
}

/// Verdict of one rule evaluated against a candidate's context.
#[derive(Debug, Clone)]
pub struct StrategyResult {
    pub strategy: &'static str,
    pub triggered: bool,
    pub reason: String,
    pub advice: Option<Advice>,
}

impl StrategyResult {
    pub fn skipped(strategy: &'static str, reason: impl Into<String>) -> Self {
        Self {
            strategy,
            triggered: false,
            reason: reason.into(),
            advice: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Fetch outcomes
// ---------------------------------------------------------------------------

/// Terminal classification of a resilient fetch.
///
/// Upstream failures are data, not control flow: they never abort the
/// caller's larger workflow. `QuotaExhausted` means the feature is
/// unavailable this cycle, not that anything is fatally wrong.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("upstream quota exhausted (HTTP 402)")]
    QuotaExhausted,
    #[error("request failed after retries: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
