//! Yahoo Finance fast-quote client.
//!
//! Two lookup shapes, both used only by the liquidity prefilter:
//! - v7 `quote`: batched snapshot for up to ~80 symbols per request;
//! - v8 `chart`: single-symbol latest close, with a same-day cache under
//!   `cache/lastprice/` so repeated serial probes stay cheap.
//!
//! Symbols are `{id}{suffix}` where the suffix selects the market board
//! (`.TW` primary listing, `.TWO` OTC).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::{Quote, QuoteProvider};
use crate::net::ResilientClient;

const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(6);
const LASTPRICE_DIR: &str = "cache/lastprice";

#[derive(Serialize, Deserialize)]
struct LastPriceEntry {
    date: NaiveDate,
    close: f64,
}

pub struct YahooQuoteClient {
    http: ResilientClient,
    batch_size: usize,
    lastprice_dir: PathBuf,
}

impl YahooQuoteClient {
    pub fn new(batch_size: usize, retries: u32) -> Result<Self> {
        Ok(Self {
            http: ResilientClient::new(REQUEST_TIMEOUT, retries)?,
            batch_size: batch_size.max(1),
            lastprice_dir: PathBuf::from(LASTPRICE_DIR),
        })
    }

    pub fn with_cache_dir(mut self, dir: &Path) -> Self {
        self.lastprice_dir = dir.to_path_buf();
        self
    }

    fn read_lastprice(&self, id: &str) -> Option<f64> {
        let path = self.lastprice_dir.join(format!("{id}.json"));
        let raw = std::fs::read_to_string(path).ok()?;
        let entry: LastPriceEntry = serde_json::from_str(&raw).ok()?;
        (entry.date == Local::now().date_naive()).then_some(entry.close)
    }

    fn write_lastprice(&self, id: &str, close: f64) {
        let entry = LastPriceEntry {
            date: Local::now().date_naive(),
            close,
        };
        let _ = std::fs::create_dir_all(&self.lastprice_dir);
        if let Ok(json) = serde_json::to_string(&entry) {
            let path = self.lastprice_dir.join(format!("{id}.json"));
            if let Err(e) = std::fs::write(&path, json) {
                debug!(id, error = %e, "Last-price cache write failed");
            }
        }
    }

    fn parse_quote_response(body: &serde_json::Value, out: &mut HashMap<String, Quote>) {
        let results = body
            .pointer("/quoteResponse/result")
            .and_then(|r| r.as_array());
        let Some(results) = results else { return };

        for item in results {
            let Some(symbol) = item.get("symbol").and_then(|s| s.as_str()) else {
                continue;
            };
            let id = symbol.split('.').next().unwrap_or(symbol).to_string();

            let price = item
                .get("regularMarketPrice")
                .and_then(|v| v.as_f64())
                .or_else(|| {
                    item.get("regularMarketPreviousClose").and_then(|v| v.as_f64())
                });
            let Some(price) = price else { continue };

            out.insert(
                id,
                Quote {
                    price,
                    volume: item
                        .get("regularMarketVolume")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0),
                    avg_volume_3m: item
                        .get("averageDailyVolume3Month")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0),
                },
            );
        }
    }

    fn parse_latest_close(body: &serde_json::Value) -> Option<f64> {
        let closes = body
            .pointer("/chart/result/0/indicators/quote/0/close")
            .and_then(|c| c.as_array())?;
        // Last non-null close wins.
        closes.iter().rev().find_map(|v| v.as_f64())
    }
}

#[async_trait]
impl QuoteProvider for YahooQuoteClient {
    async fn fetch_batch(&self, ids: &[String], suffix: &str) -> Result<HashMap<String, Quote>> {
        let mut out = HashMap::new();
        if ids.is_empty() {
            return Ok(out);
        }

        let mut chunk_errors = 0usize;
        let mut chunks = 0usize;

        for chunk in ids.chunks(self.batch_size) {
            chunks += 1;
            let symbols = chunk
                .iter()
                .map(|id| format!("{id}{suffix}"))
                .collect::<Vec<_>>()
                .join(",");

            match self
                .http
                .get_json(QUOTE_URL, &[("symbols", symbols)], &[])
                .await
            {
                Ok(body) => Self::parse_quote_response(&body, &mut out),
                Err(e) => {
                    debug!(suffix, error = %e, "Quote batch chunk failed");
                    chunk_errors += 1;
                }
            }
        }

        // A partially failed batch still returns what it got; only a
        // total blackout counts as the batched lookup itself raising.
        if chunk_errors == chunks {
            return Err(anyhow!("all {chunks} quote batches failed for {suffix}"));
        }
        Ok(out)
    }

    async fn fetch_latest(&self, id: &str, suffix: &str) -> Result<Option<f64>> {
        if let Some(cached) = self.read_lastprice(id) {
            return Ok(Some(cached));
        }

        let url = format!("{CHART_URL}/{id}{suffix}");
        let body = self
            .http
            .get_json(
                &url,
                &[
                    ("range", "1mo".to_string()),
                    ("interval", "1d".to_string()),
                ],
                &[],
            )
            .await
            .map_err(|e| anyhow!("chart lookup for {id}{suffix}: {e}"))?;

        let close = Self::parse_latest_close(&body);
        if let Some(close) = close {
            self.write_lastprice(id, close);
        }
        Ok(close)
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
    fn test_parse_quote_response_strips_suffix() {
        let body = json!({
            "quoteResponse": {
                "result": [
                    {"symbol": "2330.TW", "regularMarketPrice": 600.0,
                     "regularMarketVolume": 1000.0, "averageDailyVolume3Month": 900.0},
                    {"symbol": "2317.TW", "regularMarketPreviousClose": 100.0}
                ]
            }
        });
        let mut out = HashMap::new();
        YahooQuoteClient::parse_quote_response(&body, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out["2330"].price, 600.0);
        // Falls back to previous close when no live price.
        assert_eq!(out["2317"].price, 100.0);
        assert_eq!(out["2317"].volume, 0.0);
    }

    #[test]
    fn test_parse_quote_response_skips_priceless() {
        let body = json!({
            "quoteResponse": {"result": [{"symbol": "9999.TW"}]}
        });
        let mut out = HashMap::new();
        YahooQuoteClient::parse_quote_response(&body, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_parse_latest_close_skips_trailing_nulls() {
        let body = json!({
            "chart": {"result": [{"indicators": {"quote": [
                {"close": [10.0, 11.0, null, 12.5, null]}
            ]}}]}
        });
        assert_eq!(YahooQuoteClient::parse_latest_close(&body), Some(12.5));
    }

    #[test]
    fn test_parse_latest_close_empty() {
        let body = json!({"chart": {"result": []}});
        assert_eq!(YahooQuoteClient::parse_latest_close(&body), None);
    }

    #[test]
    fn test_lastprice_cache_roundtrip() {
        let dir = std::env::temp_dir().join(format!("sentinel_lp_{}", std::process::id()));
        let client = YahooQuoteClient::new(80, 0).unwrap().with_cache_dir(&dir);
        assert_eq!(client.read_lastprice("2330"), None);
        client.write_lastprice("2330", 601.5);
        assert_eq!(client.read_lastprice("2330"), Some(601.5));
        let _ = std::fs::remove_dir_all(dir);
    }
}
