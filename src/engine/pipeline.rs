//! Per-candidate evaluation pipeline.
//!
//! One evaluation takes a candidate from quota pre-check through data
//! acquisition, strategy routing and (maybe) alert delivery. The only
//! shared mutable state it touches is the quota ledger and dedup cache;
//! everything else is task-local, so a wave of these can run
//! concurrently. Failures never escape the pipeline boundary.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::data::linker::{link_news, AliasTable};
use crate::data::ranker::rank_news;
use crate::data::{FundFlowProvider, PriceProvider};
use crate::engine::{DedupCache, QuotaLedger};
use crate::notify::Notifier;
use crate::storage::{SignalStore, CATEGORY_SWING};
use crate::strategy::{run_all, StrategyParams};
use crate::types::{Candidate, NewsItem, StrategyResult};

/// Bars required before indicators are trustworthy.
const MIN_HISTORY: usize = 20;

/// What one evaluation amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Per-candidate or global alert cap already reached.
    QuotaReached,
    /// No price history, or too little of it.
    InsufficientHistory,
    /// Every strategy declined.
    NoTrigger,
    /// Triggered, but an identical alert went out recently.
    Deduplicated,
    /// Alert delivered and recorded.
    Sent,
}

pub struct Pipeline {
    prices: Arc<dyn PriceProvider>,
    fund_flow: Option<Arc<dyn FundFlowProvider>>,
    store: Option<Arc<SignalStore>>,
    notifier: Arc<Notifier>,
    quota: Arc<QuotaLedger>,
    dedup: Arc<DedupCache>,
    params: StrategyParams,
    years_history: u32,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        prices: Arc<dyn PriceProvider>,
        fund_flow: Option<Arc<dyn FundFlowProvider>>,
        store: Option<Arc<SignalStore>>,
        notifier: Arc<Notifier>,
        quota: Arc<QuotaLedger>,
        dedup: Arc<DedupCache>,
        params: StrategyParams,
        years_history: u32,
    ) -> Self {
        Self {
            prices,
            fund_flow,
            store,
            notifier,
            quota,
            dedup,
            params,
            years_history,
        }
    }

    /// Evaluate one candidate against the shared news/alias context.
    pub async fn evaluate(
        &self,
        candidate: &Candidate,
        news_all: &[NewsItem],
        aliases: &AliasTable,
    ) -> EvalOutcome {
        if !self.quota.allows(&candidate.id) {
            debug!(id = %candidate.id, "Quota reached; skipping");
            return EvalOutcome::QuotaReached;
        }

        let Some(history) = self
            .prices
            .fetch_price_history(&candidate.id, self.years_history)
            .await
        else {
            return EvalOutcome::InsufficientHistory;
        };
        if history.len() < MIN_HISTORY {
            debug!(id = %candidate.id, bars = history.len(), "History too short");
            return EvalOutcome::InsufficientHistory;
        }

        let fund = match &self.fund_flow {
            Some(provider) => provider.fetch_fund_flow(&candidate.id).await,
            None => None,
        };

        let linked = link_news(news_all, &candidate.id, aliases);
        let ranked = rank_news(linked);

        let results = run_all(Some(&history), fund.as_ref(), &ranked, &self.params);
        let triggered: Vec<&StrategyResult> = results.iter().filter(|r| r.triggered).collect();
        if triggered.is_empty() {
            return EvalOutcome::NoTrigger;
        }

        let price = history.last().map(|b| b.close).unwrap_or(0.0);
        let count = self.quota.count_for(&candidate.id) + 1;
        let (names, reasons) = summarise(&triggered);
        let message = format!(
            "[{names} entry] {candidate} — signal {count}/{max}\nprice ~{price:.2}\nwhy: {reasons}",
            max = self.quota.max_per_candidate(),
        );

        if !self.dedup.try_send(&message) {
            return EvalOutcome::Deduplicated;
        }

        self.notifier.send(&message).await;
        self.quota.record(&candidate.id);
        info!(id = %candidate.id, strategies = %names, "Alert sent");

        if let Some(store) = &self.store {
            if let Err(e) = store
                .log_signal(
                    &candidate.id,
                    &candidate.name,
                    &names,
                    price,
                    count,
                    CATEGORY_SWING,
                    &reasons,
                )
                .await
            {
                // Persistence is fire-and-forget; the alert already went out.
                warn!(id = %candidate.id, error = %e, "Signal log write failed");
            }
        }

        EvalOutcome::Sent
    }
}

/// Deduplicated, order-preserving strategy names and reasons.
fn summarise(triggered: &[&StrategyResult]) -> (String, String) {
    let mut names: Vec<&str> = Vec::new();
    let mut reasons: Vec<&str> = Vec::new();
    for r in triggered {
        if !names.contains(&r.strategy) {
            names.push(r.strategy);
        }
        if !r.reason.is_empty() && !reasons.contains(&r.reason.as_str()) {
            reasons.push(&r.reason);
        }
    }
    let reasons = if reasons.is_empty() {
        "conditions met".to_string()
    } else {
        reasons.join("; ")
    };
    (names.join(" + "), reasons)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
