//! FinMind market-data client.
//!
//! Single entry point for the FinMind v4 dataset API: daily candles
//! (`TaiwanStockPrice`) and institutional buy/sell (`TaiwanStock-
//! InstitutionalInvestorsBuySell`). Every request goes through the shared
//! rate limiter and the resilient client; HTTP 402 (quota exhausted) maps
//! to `None` so callers treat the feature as unavailable, not broken.
//!
//! Responses are cached per candidate as same-day JSON files under
//! `cache/price/` and `cache/fund/` — a cold start is slow, a warm one
//! nearly free.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FundFlowProvider, PriceProvider};
use crate::net::rate_limit::RateLimiter;
use crate::net::ResilientClient;
use crate::types::{FetchError, FundFlow, FundFlowDay, PriceHistory};

const BASE_URL: &str = "https://api.finmindtrade.com/api/v4/data";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

const PRICE_CACHE_DIR: &str = "cache/price";
const FUND_CACHE_DIR: &str = "cache/fund";

// ---------------------------------------------------------------------------
// Same-day cache envelope
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct CacheEnvelope<T> {
    date: NaiveDate,
    payload: T,
}

fn read_cache<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = std::fs::read_to_string(path).ok()?;
    let envelope: CacheEnvelope<T> = serde_json::from_str(&raw).ok()?;
    if envelope.date == Local::now().date_naive() {
        Some(envelope.payload)
    } else {
        None
    }
}

fn write_cache<T: Serialize>(path: &Path, payload: &T) {
    let envelope = CacheEnvelope {
        date: Local::now().date_naive(),
        payload,
    };
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    match serde_json::to_string(&envelope) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                debug!(path = %path.display(), error = %e, "Cache write failed");
            }
        }
        Err(e) => debug!(error = %e, "Cache serialise failed"),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct FinMindClient {
    http: ResilientClient,
    limiter: Arc<RateLimiter>,
    token: Option<String>,
    fund_flow_enabled: bool,
    price_cache: PathBuf,
    fund_cache: PathBuf,
}

impl FinMindClient {
    pub fn new(
        limiter: Arc<RateLimiter>,
        token: Option<String>,
        retries: u32,
        fund_flow_enabled: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: ResilientClient::new(REQUEST_TIMEOUT, retries)?,
            limiter,
            token,
            fund_flow_enabled,
            price_cache: PathBuf::from(PRICE_CACHE_DIR),
            fund_cache: PathBuf::from(FUND_CACHE_DIR),
        })
    }

    /// Redirect the on-disk caches (used by tests).
    pub fn with_cache_root(mut self, root: &Path) -> Self {
        self.price_cache = root.join("price");
        self.fund_cache = root.join("fund");
        self
    }

    /// Fetch one dataset window. Returns the `data` rows, or `None` for
    /// any failure including quota exhaustion — the distinction is logged
    /// but callers see the same "absent" either way.
    async fn get_dataset(
        &self,
        dataset: &str,
        data_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Option<Vec<serde_json::Value>> {
        let mut query: Vec<(&str, String)> = vec![
            ("dataset", dataset.to_string()),
            ("data_id", data_id.to_string()),
            ("start_date", start_date.format("%Y-%m-%d").to_string()),
            ("end_date", end_date.format("%Y-%m-%d").to_string()),
        ];
        if let Some(token) = &self.token {
            query.push(("token", token.clone()));
        }

        self.limiter.acquire().await;

        match self.http.get_json(BASE_URL, &query, &[]).await {
            Ok(body) => body
                .get("data")
                .and_then(|d| d.as_array())
                .cloned(),
            Err(FetchError::QuotaExhausted) => {
                warn!(dataset, data_id, "FinMind quota exhausted; feature off this cycle");
                None
            }
            Err(FetchError::Failed(msg)) => {
                debug!(dataset, data_id, error = %msg, "FinMind fetch failed");
                None
            }
        }
    }

    fn window(years: u32) -> (NaiveDate, NaiveDate) {
        let end = Local::now().date_naive();
        let start = end - ChronoDuration::days(365 * i64::from(years.max(1)));
        (start, end)
    }
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

fn field_f64(row: &serde_json::Value, key: &str) -> Option<f64> {
    let v = row.get(key)?;
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn field_date(row: &serde_json::Value, key: &str) -> Option<NaiveDate> {
    row.get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| s.get(..10).or(Some(s)))
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn parse_price_rows(rows: &[serde_json::Value]) -> PriceHistory {
    let parsed: Vec<(NaiveDate, f64, f64)> = rows
        .iter()
        .filter_map(|row| {
            let date = field_date(row, "date")?;
            let close = field_f64(row, "close")?;
            let volume = field_f64(row, "Trading_Volume")
                .or_else(|| field_f64(row, "volume"))
                .unwrap_or(0.0);
            Some((date, close, volume))
        })
        .collect();
    PriceHistory::from_rows(parsed)
}

/// Net value for one investor category, tolerant of the dataset's
/// shifting column names: `{cat}_Buy`/`{cat}_Sell`, `{cat}_NetBuySell`,
/// or a pre-netted `{cat}` column. Missing everything nets to zero.
fn net_for(row: &serde_json::Value, category: &str) -> f64 {
    let buy = field_f64(row, &format!("{category}_Buy"));
    let sell = field_f64(row, &format!("{category}_Sell"));
    if buy.is_some() || sell.is_some() {
        return buy.unwrap_or(0.0) - sell.unwrap_or(0.0);
    }
    if let Some(net) = field_f64(row, &format!("{category}_NetBuySell")) {
        return net;
    }
    field_f64(row, category).unwrap_or(0.0)
}

fn parse_fund_rows(rows: &[serde_json::Value]) -> FundFlow {
    let mut days: Vec<FundFlowDay> = rows
        .iter()
        .filter_map(|row| {
            let date = field_date(row, "date")?;
            // Dealer reporting splits into self/hedge lines in some
            // dataset revisions; sum whatever variants appear.
            let dealer = net_for(row, "Dealer")
                + net_for(row, "Dealer_Self")
                + field_f64(row, "Securities_Firm").unwrap_or(0.0);
            Some(FundFlowDay {
                date,
                foreign_investor: net_for(row, "Foreign_Investor"),
                investment_trust: net_for(row, "Investment_Trust"),
                dealer,
            })
        })
        .collect();
    days.sort_by_key(|d| d.date);
    FundFlow { days }
}

// ---------------------------------------------------------------------------
// Provider impls
// ---------------------------------------------------------------------------

#[async_trait]
impl PriceProvider for FinMindClient {
    async fn fetch_price_history(&self, id: &str, years: u32) -> Option<PriceHistory> {
        let cache_file = self.price_cache.join(format!("{id}.json"));
        if let Some(cached) = read_cache::<PriceHistory>(&cache_file) {
            if !cached.is_empty() {
                return Some(cached);
            }
        }

        let (start, end) = Self::window(years);
        let rows = self
            .get_dataset("TaiwanStockPrice", id, start, end)
            .await?;
        let history = parse_price_rows(&rows);
        if history.is_empty() {
            return None;
        }

        write_cache(&cache_file, &history);
        Some(history)
    }
}

#[async_trait]
impl FundFlowProvider for FinMindClient {
    async fn fetch_fund_flow(&self, id: &str) -> Option<FundFlow> {
        if !self.fund_flow_enabled {
            return None;
        }

        let cache_file = self.fund_cache.join(format!("{id}.json"));
        if let Some(cached) = read_cache::<FundFlow>(&cache_file) {
            if cached.len() > 0 {
                return Some(cached);
            }
        }

        let (start, end) = Self::window(2);
        let rows = self
            .get_dataset("TaiwanStockInstitutionalInvestorsBuySell", id, start, end)
            .await?;
        let flow = parse_fund_rows(&rows);
        if flow.days.is_empty() {
            return None;
        }

        write_cache(&cache_file, &flow);
        Some(flow)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_price_rows_basic() {
        let rows = vec![
            json!({"date": "2026-01-02", "close": 101.0, "Trading_Volume": 1000.0}),
            json!({"date": "2026-01-01", "close": 100.0, "Trading_Volume": 900.0}),
        ];
        let h = parse_price_rows(&rows);
        assert_eq!(h.len(), 2);
        // Sorted ascending regardless of input order.
        assert_eq!(h.bars[0].close, 100.0);
        assert_eq!(h.bars[1].close, 101.0);
    }

    #[test]
    fn test_parse_price_rows_skips_malformed() {
        let rows = vec![
            json!({"date": "2026-01-01", "close": 100.0}),
            json!({"close": 50.0}),
            json!({"date": "not-a-date", "close": 50.0}),
        ];
        let h = parse_price_rows(&rows);
        assert_eq!(h.len(), 1);
        // Missing volume column defaults to zero.
        assert_eq!(h.bars[0].volume, 0.0);
    }

    #[test]
    fn test_field_date_tolerates_odd_strings() {
        let timestamped = json!({"date": "2026-01-02 00:00:00"});
        assert_eq!(
            field_date(&timestamped, "date"),
            NaiveDate::from_ymd_opt(2026, 1, 2)
        );
        // Short and non-ASCII date strings must come back None, never
        // panic on a mid-character prefix.
        assert_eq!(field_date(&json!({"date": "2026"}), "date"), None);
        assert_eq!(field_date(&json!({"date": "2026年1月2日收盤"}), "date"), None);
    }

    #[test]
    fn test_net_for_buy_sell_columns() {
        let row = json!({"Foreign_Investor_Buy": 500.0, "Foreign_Investor_Sell": 200.0});
        assert!((net_for(&row, "Foreign_Investor") - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_net_for_prenetted_column() {
        let row = json!({"Investment_Trust_NetBuySell": -120.0});
        assert!((net_for(&row, "Investment_Trust") + 120.0).abs() < 1e-9);
        let row2 = json!({"Investment_Trust": 80.0});
        assert!((net_for(&row2, "Investment_Trust") - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_net_for_missing_is_zero() {
        let row = json!({});
        assert_eq!(net_for(&row, "Dealer"), 0.0);
    }

    #[test]
    fn test_parse_fund_rows_sums_dealer_variants() {
        let rows = vec![json!({
            "date": "2026-01-05",
            "Foreign_Investor_Buy": 100.0,
            "Foreign_Investor_Sell": 40.0,
            "Dealer_Buy": 10.0,
            "Dealer_Sell": 5.0,
            "Dealer_Self": 20.0,
        })];
        let flow = parse_fund_rows(&rows);
        assert_eq!(flow.len(), 1);
        let day = &flow.days[0];
        assert!((day.foreign_investor - 60.0).abs() < 1e-9);
        assert!((day.dealer - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_roundtrip_same_day() {
        let dir = std::env::temp_dir().join(format!("sentinel_fm_{}", std::process::id()));
        let path = dir.join("2330.json");
        let flow = FundFlow {
            days: vec![FundFlowDay {
                date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                foreign_investor: 1.0,
                investment_trust: 2.0,
                dealer: 3.0,
            }],
        };
        write_cache(&path, &flow);
        let back: Option<FundFlow> = read_cache(&path);
        assert_eq!(back.map(|f| f.len()), Some(1));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_stale_cache_rejected() {
        let dir = std::env::temp_dir().join(format!("sentinel_fm_stale_{}", std::process::id()));
        let path = dir.join("x.json");
        std::fs::create_dir_all(&dir).unwrap();
        let stale = serde_json::json!({
            "date": "2020-01-01",
            "payload": {"days": []}
        });
        std::fs::write(&path, stale.to_string()).unwrap();
        let back: Option<FundFlow> = read_cache(&path);
        assert!(back.is_none());
        let _ = std::fs::remove_dir_all(dir);
    }
}
