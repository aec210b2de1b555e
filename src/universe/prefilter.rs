//! Liquidity prefetch filter.
//!
//! Narrows the full universe to at most `limit` candidates priced under
//! the ceiling before the expensive per-candidate pipeline runs. Three
//! tiers, each engaged only when the previous one *raised* (a tier that
//! legitimately found nothing is a final answer):
//!
//! 1. batched quote lookups (primary board, then secondary for misses);
//! 2. serial per-candidate probes, capped at `max_checks`;
//! 3. raw passthrough of the first `limit` candidates — forward
//!    progress when every price source is dark.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::data::{Quote, QuoteProvider};
use crate::types::Candidate;

/// Primary market board suffix.
const PRIMARY_SUFFIX: &str = ".TW";
/// Secondary (OTC) board suffix, probed for primary misses.
const SECONDARY_SUFFIX: &str = ".TWO";

#[derive(Debug, Clone)]
pub struct PrefilterParams {
    pub max_price: f64,
    pub limit: usize,
    pub max_checks: usize,
}

/// Screen `candidates` down to an ordered subsequence of at most
/// `limit` entries with a known price under `max_price`.
pub async fn prefilter(
    quotes: &dyn QuoteProvider,
    candidates: &[Candidate],
    params: &PrefilterParams,
) -> Vec<Candidate> {
    // Only numeric ids are quotable; order is preserved throughout.
    let cand: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| !c.id.is_empty() && c.id.chars().all(|ch| ch.is_ascii_digit()))
        .collect();
    if cand.is_empty() {
        return Vec::new();
    }
    let target = if params.limit == 0 {
        cand.len()
    } else {
        params.limit
    };

    match batched_tier(quotes, &cand, params.max_price, target).await {
        Ok(matched) => {
            info!(
                candidates = cand.len(),
                matched = matched.len(),
                "Prefilter batched tier complete"
            );
            return matched;
        }
        Err(e) => warn!(error = %e, "Batched quote tier raised; falling back to serial"),
    }

    match serial_tier(quotes, &cand, params.max_price, target, params.max_checks).await {
        Ok(matched) => {
            info!(matched = matched.len(), "Prefilter serial tier complete");
            matched
        }
        Err(e) => {
            warn!(error = %e, "Serial quote tier raised too; passing through unfiltered");
            cand.iter()
                .take(target)
                .map(|c| (*c).clone())
                .collect()
        }
    }
}

/// Tier 1: one batched lookup per board. Secondary results never
/// override primary ones. Zero matches is a legitimate outcome.
async fn batched_tier(
    quotes: &dyn QuoteProvider,
    cand: &[&Candidate],
    max_price: f64,
    target: usize,
) -> anyhow::Result<Vec<Candidate>> {
    let ids: Vec<String> = cand.iter().map(|c| c.id.clone()).collect();

    let mut price_map: HashMap<String, Quote> =
        quotes.fetch_batch(&ids, PRIMARY_SUFFIX).await?;

    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !price_map.contains_key(*id))
        .cloned()
        .collect();
    if !missing.is_empty() {
        debug!(count = missing.len(), "Probing secondary board for misses");
        let secondary = quotes.fetch_batch(&missing, SECONDARY_SUFFIX).await?;
        for (id, quote) in secondary {
            price_map.entry(id).or_insert(quote);
        }
    }

    let mut matched = Vec::new();
    for c in cand {
        if let Some(q) = price_map.get(&c.id) {
            if q.price < max_price {
                matched.push((*c).clone());
                if matched.len() >= target {
                    break;
                }
            }
        }
    }
    Ok(matched)
}

/// Tier 2: per-candidate probes in original order. A probe fails only
/// when both boards errored; the tier itself raises only when *every*
/// probe failed — otherwise the survivors are the answer.
async fn serial_tier(
    quotes: &dyn QuoteProvider,
    cand: &[&Candidate],
    max_price: f64,
    target: usize,
    max_checks: usize,
) -> anyhow::Result<Vec<Candidate>> {
    let mut matched = Vec::new();
    let mut probes = 0usize;
    let mut failed_probes = 0usize;

    for c in cand {
        if probes >= max_checks || matched.len() >= target {
            break;
        }
        probes += 1;

        let price = match quotes.fetch_latest(&c.id, PRIMARY_SUFFIX).await {
            Ok(Some(p)) => Some(p),
            Ok(None) => match quotes.fetch_latest(&c.id, SECONDARY_SUFFIX).await {
                Ok(p) => p,
                Err(_) => {
                    failed_probes += 1;
                    continue;
                }
            },
            Err(_) => match quotes.fetch_latest(&c.id, SECONDARY_SUFFIX).await {
                Ok(p) => p,
                Err(_) => {
                    failed_probes += 1;
                    continue;
                }
            },
        };

        if let Some(p) = price {
            if p < max_price {
                matched.push((*c).clone());
            }
        }
    }

    if probes > 0 && failed_probes == probes {
        anyhow::bail!("all {probes} serial quote probes failed");
    }
    Ok(matched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable quote source: per-board price tables plus kill
    /// switches for each lookup shape.
    #[derive(Default)]
    struct ScriptedQuotes {
        primary: HashMap<String, f64>,
        secondary: HashMap<String, f64>,
        batch_fails: bool,
        latest_fails: bool,
        batch_calls: AtomicUsize,
        latest_calls: AtomicUsize,
    }

    impl ScriptedQuotes {
        fn with_primary(prices: &[(&str, f64)]) -> Self {
            Self {
                primary: prices
                    .iter()
                    .map(|(id, p)| (id.to_string(), *p))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl QuoteProvider for ScriptedQuotes {
        async fn fetch_batch(
            &self,
            ids: &[String],
            suffix: &str,
        ) -> anyhow::Result<HashMap<String, Quote>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if self.batch_fails {
                return Err(anyhow!("batched lookup down"));
            }
            let table = if suffix == PRIMARY_SUFFIX {
                &self.primary
            } else {
                &self.secondary
            };
            Ok(ids
                .iter()
                .filter_map(|id| {
                    table.get(id).map(|p| {
                        (
                            id.clone(),
                            Quote {
                                price: *p,
                                volume: 0.0,
                                avg_volume_3m: 0.0,
                            },
                        )
                    })
                })
                .collect())
        }

        async fn fetch_latest(&self, id: &str, suffix: &str) -> anyhow::Result<Option<f64>> {
            self.latest_calls.fetch_add(1, Ordering::SeqCst);
            if self.latest_fails {
                return Err(anyhow!("serial lookup down"));
            }
            let table = if suffix == PRIMARY_SUFFIX {
                &self.primary
            } else {
                &self.secondary
            };
            Ok(table.get(id).copied())
        }
    }

    fn candidates(ids: &[&str]) -> Vec<Candidate> {
        ids.iter().map(|id| Candidate::new(*id, format!("n{id}"))).collect()
    }

    fn params(max_price: f64, limit: usize, max_checks: usize) -> PrefilterParams {
        PrefilterParams {
            max_price,
            limit,
            max_checks,
        }
    }

    #[tokio::test]
    async fn test_batched_preserves_order_and_limit() {
        let quotes = ScriptedQuotes::with_primary(&[
            ("1101", 40.0),
            ("2330", 2000.0), // over the ceiling
            ("2317", 100.0),
            ("2603", 150.0),
        ]);
        let cand = candidates(&["1101", "2330", "2317", "2603"]);

        let got = prefilter(&quotes, &cand, &params(1500.0, 2, 100)).await;
        let ids: Vec<&str> = got.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1101", "2317"]);
    }

    #[tokio::test]
    async fn test_secondary_fills_misses_without_override() {
        let mut quotes = ScriptedQuotes::with_primary(&[("1101", 40.0)]);
        quotes.secondary =
            [("6488".to_string(), 500.0), ("1101".to_string(), 9999.0)].into();
        let cand = candidates(&["1101", "6488"]);

        let got = prefilter(&quotes, &cand, &params(1500.0, 10, 100)).await;
        let ids: Vec<&str> = got.iter().map(|c| c.id.as_str()).collect();
        // 1101 kept via its primary price (40), not clobbered by the
        // secondary board's 9999.
        assert_eq!(ids, vec!["1101", "6488"]);
    }

    #[tokio::test]
    async fn test_batched_zero_matches_is_final() {
        let quotes = ScriptedQuotes::with_primary(&[("2330", 2000.0)]);
        let cand = candidates(&["2330"]);

        let got = prefilter(&quotes, &cand, &params(1500.0, 5, 100)).await;
        assert!(got.is_empty());
        // Serial tier never engaged.
        assert_eq!(quotes.latest_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batched_failure_falls_to_serial_with_same_result() {
        let prices = [("1101", 40.0), ("2330", 2000.0), ("2317", 100.0)];
        let mut failing = ScriptedQuotes::with_primary(&prices);
        failing.batch_fails = true;
        let healthy = ScriptedQuotes::with_primary(&prices);
        let cand = candidates(&["1101", "2330", "2317"]);
        let p = params(1500.0, 10, 100);

        let serial_result = prefilter(&failing, &cand, &p).await;
        let batched_result = prefilter(&healthy, &cand, &p).await;
        assert_eq!(serial_result, batched_result);
    }

    #[tokio::test]
    async fn test_both_tiers_raise_passes_through() {
        let mut quotes = ScriptedQuotes::default();
        quotes.batch_fails = true;
        quotes.latest_fails = true;
        let cand = candidates(&["1101", "2330", "2317", "2603"]);

        let got = prefilter(&quotes, &cand, &params(1500.0, 3, 100)).await;
        let ids: Vec<&str> = got.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1101", "2330", "2317"]);
    }

    #[tokio::test]
    async fn test_serial_respects_max_checks() {
        let mut quotes = ScriptedQuotes::with_primary(&[("9904", 30.0)]);
        quotes.batch_fails = true;
        // 9904 sits beyond the probe budget.
        let cand = candidates(&["1101", "1102", "1103", "9904"]);

        let got = prefilter(&quotes, &cand, &params(1500.0, 10, 3)).await;
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_non_numeric_ids_dropped() {
        let quotes = ScriptedQuotes::with_primary(&[("1101", 40.0)]);
        let cand = vec![Candidate::new("ETF01", "x"), Candidate::new("1101", "y")];

        let got = prefilter(&quotes, &cand, &params(1500.0, 10, 100)).await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "1101");
    }
}
