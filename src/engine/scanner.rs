//! Scan loop driver.
//!
//! Lifecycle: bootstrap the shared context (news, universe, aliases,
//! prefiltered candidate set), then cycle forever — evaluate the active
//! set in fixed-size concurrent waves, push a run summary, sleep, and
//! periodically refresh the shared context. Interrupt handling lives in
//! main; `drain` is the one-shot summary hook it calls on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{NewsConfig, PrefetchConfig, ScannerConfig};
use crate::data::linker::{build_aliases, AliasTable};
use crate::data::news::fetch_all_news;
use crate::data::{NewsSource, QuoteProvider};
use crate::engine::Pipeline;
use crate::notify::Notifier;
use crate::storage::SignalStore;
use crate::types::{Candidate, NewsItem};
use crate::universe::prefilter::{prefilter, PrefilterParams};
use crate::universe::UniverseChain;

/// Shared read-only context rebuilt on bootstrap/refresh. News and
/// aliases sit behind `Arc` so every evaluation task can own a handle.
struct ScanContext {
    news: Arc<Vec<NewsItem>>,
    aliases: Arc<AliasTable>,
    active: Vec<Candidate>,
}

pub struct Scanner {
    scanner_cfg: ScannerConfig,
    prefetch_cfg: PrefetchConfig,
    news_cfg: NewsConfig,
    universe: UniverseChain,
    quotes: Arc<dyn QuoteProvider>,
    news_sources: Vec<Box<dyn NewsSource>>,
    pipeline: Arc<Pipeline>,
    notifier: Arc<Notifier>,
    store: Option<Arc<SignalStore>>,
}

impl Scanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scanner_cfg: ScannerConfig,
        prefetch_cfg: PrefetchConfig,
        news_cfg: NewsConfig,
        universe: UniverseChain,
        quotes: Arc<dyn QuoteProvider>,
        news_sources: Vec<Box<dyn NewsSource>>,
        pipeline: Arc<Pipeline>,
        notifier: Arc<Notifier>,
        store: Option<Arc<SignalStore>>,
    ) -> Self {
        Self {
            scanner_cfg,
            prefetch_cfg,
            news_cfg,
            universe,
            quotes,
            news_sources,
            pipeline,
            notifier,
            store,
        }
    }

    /// Acquire the shared context: headlines, candidate universe, alias
    /// table, and the prefiltered active set.
    async fn bootstrap(&self, use_universe_cache: bool) -> ScanContext {
        let t0 = Instant::now();
        let news = fetch_all_news(&self.news_sources, self.news_cfg.pages).await;
        info!(
            items = news.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Market news fetched"
        );

        let universe = self.universe.get_universe(use_universe_cache).await;
        let aliases = build_aliases(&universe);

        let t1 = Instant::now();
        let params = PrefilterParams {
            max_price: self.prefetch_cfg.price_ceiling,
            limit: self.scanner_cfg.scan_limit,
            max_checks: self.prefetch_cfg.max_checks,
        };
        let active = prefilter(self.quotes.as_ref(), &universe, &params).await;
        info!(
            universe = universe.len(),
            active = active.len(),
            elapsed_ms = t1.elapsed().as_millis() as u64,
            "Active candidate set ready"
        );

        ScanContext {
            news: Arc::new(news),
            aliases: Arc::new(aliases),
            active,
        }
    }

    /// One full pass over the active set: waves of concurrent
    /// evaluations, then a summary notification.
    async fn run_pass(&self, ctx: &ScanContext) {
        let wave_size = self.scanner_cfg.wave_size.max(1);
        let pass_start = Instant::now();

        for wave in ctx.active.chunks(wave_size) {
            // Each evaluation runs as its own task: a panic in one
            // candidate surfaces as a JoinError here and never takes
            // down its siblings or the scan loop.
            let tasks: Vec<_> = wave
                .iter()
                .map(|c| {
                    let pipeline = Arc::clone(&self.pipeline);
                    let news = Arc::clone(&ctx.news);
                    let aliases = Arc::clone(&ctx.aliases);
                    let candidate = c.clone();
                    tokio::spawn(async move {
                        pipeline.evaluate(&candidate, &news, &aliases).await
                    })
                })
                .collect();
            // Wave N+1 starts only after every task in wave N finished.
            for (task, candidate) in tasks.into_iter().zip(wave) {
                if let Err(e) = task.await {
                    warn!(stock = %candidate.id, error = %e, "Evaluation task aborted");
                }
            }
        }

        info!(
            candidates = ctx.active.len(),
            elapsed_ms = pass_start.elapsed().as_millis() as u64,
            "Scan pass complete"
        );
        self.send_summary().await;
    }

    async fn send_summary(&self) {
        let Some(store) = &self.store else { return };
        match store.today_summary().await {
            Ok(summary) => self.notifier.send(&summary).await,
            Err(e) => warn!(error = %e, "Run summary query failed"),
        }
    }

    /// Best-effort final summary on shutdown.
    pub async fn drain(&self) {
        info!("Draining: final summary");
        self.send_summary().await;
    }

    /// Run forever. Termination happens only by dropping this future
    /// (the interrupt path in main).
    pub async fn run(&self) {
        let mut ctx = self.bootstrap(false).await;
        let mut iteration: u64 = 0;

        loop {
            self.run_pass(&ctx).await;

            iteration += 1;
            if self.scanner_cfg.refresh_every > 0
                && iteration % self.scanner_cfg.refresh_every == 0
            {
                info!(iteration, "Refreshing shared news and candidate set");
                ctx = self.bootstrap(true).await;
            }

            tokio::time::sleep(Duration::from_secs(self.scanner_cfg.sleep_secs)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NewsConfig, PrefetchConfig, ScannerConfig};
    use crate::data::{FundFlowProvider, PriceProvider, Quote};
    use crate::engine::{DedupCache, QuotaLedger};
    use crate::strategy::StrategyParams;
    use crate::types::{FundFlow, PriceHistory};
    use crate::universe::UniverseSource;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    struct FixedUniverse(Vec<Candidate>);

    #[async_trait]
    impl UniverseSource for FixedUniverse {
        async fn attempt(&self) -> Result<Vec<Candidate>> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct CheapQuotes;

    #[async_trait]
    impl QuoteProvider for CheapQuotes {
        async fn fetch_batch(
            &self,
            ids: &[String],
            suffix: &str,
        ) -> Result<HashMap<String, Quote>> {
            if suffix != ".TW" {
                return Ok(HashMap::new());
            }
            Ok(ids
                .iter()
                .map(|id| {
                    (
                        id.clone(),
                        Quote {
                            price: 100.0,
                            volume: 0.0,
                            avg_volume_3m: 0.0,
                        },
                    )
                })
                .collect())
        }
        async fn fetch_latest(&self, _id: &str, _suffix: &str) -> Result<Option<f64>> {
            Ok(Some(100.0))
        }
    }

    struct SpikePrices;

    #[async_trait]
    impl PriceProvider for SpikePrices {
        async fn fetch_price_history(&self, _id: &str, _years: u32) -> Option<PriceHistory> {
            let day = |n: i32| NaiveDate::from_num_days_from_ce_opt(738_000 + n).unwrap();
            let mut rows: Vec<(NaiveDate, f64, f64)> = (0..29)
                .map(|i| (day(i), 100.0 - 0.5 * i as f64, 1000.0))
                .collect();
            rows.push((day(29), 130.0, 3000.0));
            Some(PriceHistory::from_rows(rows))
        }
    }

    /// Panics for one candidate, behaves like `SpikePrices` otherwise.
    struct PoisonedPrices;

    #[async_trait]
    impl PriceProvider for PoisonedPrices {
        async fn fetch_price_history(&self, id: &str, years: u32) -> Option<PriceHistory> {
            if id == "2317" {
                panic!("price feed fixture corrupted");
            }
            SpikePrices.fetch_price_history(id, years).await
        }
    }

    struct NoFunds;

    #[async_trait]
    impl FundFlowProvider for NoFunds {
        async fn fetch_fund_flow(&self, _id: &str) -> Option<FundFlow> {
            None
        }
    }

    struct SilentNews;

    #[async_trait]
    impl crate::data::NewsSource for SilentNews {
        async fn fetch(&self, _pages: u32) -> Result<Vec<NewsItem>> {
            Ok(Vec::new())
        }
        fn name(&self) -> &'static str {
            "silent"
        }
    }

    fn test_scanner(quota: Arc<QuotaLedger>) -> Scanner {
        test_scanner_with_prices(quota, Arc::new(SpikePrices))
    }

    fn test_scanner_with_prices(
        quota: Arc<QuotaLedger>,
        prices: Arc<dyn PriceProvider>,
    ) -> Scanner {
        let notifier = Arc::new(Notifier::new(None).unwrap());
        let pipeline = Arc::new(Pipeline::new(
            prices,
            Some(Arc::new(NoFunds)),
            None,
            Arc::clone(&notifier),
            quota,
            Arc::new(DedupCache::new(Duration::from_secs(600))),
            StrategyParams::default(),
            2,
        ));
        let cache = std::env::temp_dir().join(format!(
            "sentinel_scanner_{}.json",
            uuid::Uuid::new_v4()
        ));
        let universe = UniverseChain::new(vec![Box::new(FixedUniverse(vec![
            Candidate::new("2330", "台積電"),
            Candidate::new("2317", "鴻海"),
            Candidate::new("2603", "長榮"),
        ]))])
        .with_cache_path(&cache);

        Scanner::new(
            ScannerConfig {
                scan_limit: 10,
                wave_size: 2,
                sleep_secs: 1,
                years_history: 2,
                refresh_every: 10,
            },
            PrefetchConfig {
                price_ceiling: 1500.0,
                max_checks: 300,
                quote_batch_size: 80,
            },
            NewsConfig {
                positive_threshold: 0.80,
                pages: 1,
            },
            universe,
            Arc::new(CheapQuotes),
            vec![Box::new(SilentNews)],
            pipeline,
            notifier,
            None,
        )
    }

    #[tokio::test]
    async fn test_bootstrap_builds_active_set() {
        let scanner = test_scanner(Arc::new(QuotaLedger::new(20, 200)));
        let ctx = scanner.bootstrap(false).await;
        assert_eq!(ctx.active.len(), 3);
        assert!(ctx.news.is_empty());
        assert!(ctx.aliases.contains_key("2330"));
    }

    #[tokio::test]
    async fn test_run_pass_sends_for_every_triggering_candidate() {
        let quota = Arc::new(QuotaLedger::new(20, 200));
        let scanner = test_scanner(Arc::clone(&quota));
        let ctx = scanner.bootstrap(false).await;

        scanner.run_pass(&ctx).await;
        // Every candidate trips the technical rule once.
        assert_eq!(quota.total(), 3);
        assert_eq!(quota.count_for("2330"), 1);
    }

    #[tokio::test]
    async fn test_run_pass_isolates_a_panicking_candidate() {
        let quota = Arc::new(QuotaLedger::new(20, 200));
        let scanner = test_scanner_with_prices(Arc::clone(&quota), Arc::new(PoisonedPrices));
        let ctx = scanner.bootstrap(false).await;

        // 2317 panics mid-wave; the pass must still finish and its
        // wave sibling plus the following wave must still alert.
        scanner.run_pass(&ctx).await;
        assert_eq!(quota.count_for("2330"), 1);
        assert_eq!(quota.count_for("2603"), 1);
        assert_eq!(quota.count_for("2317"), 0);
        assert_eq!(quota.total(), 2);
    }

    #[tokio::test]
    async fn test_run_pass_respects_global_cap() {
        let quota = Arc::new(QuotaLedger::new(20, 2));
        let scanner = test_scanner(Arc::clone(&quota));
        let ctx = scanner.bootstrap(false).await;

        scanner.run_pass(&ctx).await;
        assert_eq!(quota.total(), 2);
    }
}
