//! SENTINEL — Autonomous Listed-Equity Signal Scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the data collaborators into the scan engine, and runs the
//! bootstrap→scan loop with graceful shutdown: an interrupt drains one
//! final summary before exit.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sentinel::config::AppConfig;
use sentinel::data::finmind::FinMindClient;
use sentinel::data::news::{CnyesNews, UdnNews};
use sentinel::data::quotes::YahooQuoteClient;
use sentinel::data::{FundFlowProvider, NewsSource, PriceProvider};
use sentinel::engine::{DedupCache, Pipeline, QuotaLedger, Scanner};
use sentinel::net::rate_limit::RateLimiter;
use sentinel::notify::Notifier;
use sentinel::storage::SignalStore;
use sentinel::strategy::StrategyParams;
use sentinel::universe::{FinMindUniverse, TwseUniverse, UniverseChain, UniverseSource};

const BANNER: &str = r#"
 ____  _____ _   _ _____ ___ _   _ _____ _
/ ___|| ____| \ | |_   _|_ _| \ | | ____| |
\___ \|  _| |  \| | | |  | ||  \| |  _| | |
 ___) | |___| |\  | | |  | || |\  | |___| |___
|____/|_____|_| \_| |_| |___|_| \_|_____|_____|

  Autonomous Listed-Equity Signal Scanner
  v0.1.0
"#;

const SIGNAL_DB_PATH: &str = "storage/signals.db";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        scan_limit = cfg.scanner.scan_limit,
        wave_size = cfg.scanner.wave_size,
        sleep_secs = cfg.scanner.sleep_secs,
        "SENTINEL starting up"
    );

    // -- Initialise components -------------------------------------------

    let finmind_token = AppConfig::resolve_env(cfg.finmind.token_env.as_deref());
    if finmind_token.is_none() {
        warn!("No FinMind token configured; running on the unauthenticated quota");
    }
    let limiter = Arc::new(RateLimiter::new(cfg.finmind.qps));
    let finmind = Arc::new(
        FinMindClient::new(
            limiter,
            finmind_token,
            cfg.finmind.retries,
            cfg.finmind.fund_flow_enabled,
        )
        .context("Failed to build FinMind client")?,
    );

    let quotes = Arc::new(
        YahooQuoteClient::new(cfg.prefetch.quote_batch_size, cfg.finmind.retries)
            .context("Failed to build quote client")?,
    );

    let news_sources: Vec<Box<dyn NewsSource>> = vec![
        Box::new(UdnNews::new(cfg.finmind.retries)?),
        Box::new(CnyesNews::new(cfg.finmind.retries)?),
    ];

    let universe_sources: Vec<Box<dyn UniverseSource>> = vec![
        Box::new(FinMindUniverse::new(cfg.finmind.retries)?),
        Box::new(TwseUniverse::new(cfg.finmind.retries)?),
    ];
    let universe = UniverseChain::new(universe_sources);

    let webhook = AppConfig::resolve_env(cfg.alerts.discord_webhook_env.as_deref());
    if webhook.is_none() {
        info!("No Discord webhook configured; alerts go to the terminal only");
    }
    let notifier = Arc::new(Notifier::new(webhook)?);

    let store = match SignalStore::open(Path::new(SIGNAL_DB_PATH)).await {
        Ok(s) => Some(Arc::new(s)),
        Err(e) => {
            warn!(error = %e, "Signal store unavailable; running without persistence");
            None
        }
    };

    let quota = Arc::new(QuotaLedger::new(
        cfg.limits.max_signal_per_stock,
        cfg.limits.max_signal_total,
    ));
    let dedup = Arc::new(DedupCache::new(Duration::from_secs(
        cfg.limits.dedup_window_secs,
    )));

    let fund_flow: Option<Arc<dyn FundFlowProvider>> = if cfg.finmind.fund_flow_enabled {
        Some(Arc::clone(&finmind) as Arc<dyn FundFlowProvider>)
    } else {
        info!("Institutional fund-flow feed disabled by config");
        None
    };

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&finmind) as Arc<dyn PriceProvider>,
        fund_flow,
        store.clone(),
        Arc::clone(&notifier),
        quota,
        dedup,
        StrategyParams {
            volume_multiplier: 1.8,
            positive_threshold: cfg.news.positive_threshold,
        },
        cfg.scanner.years_history,
    ));

    let scanner = Scanner::new(
        cfg.scanner.clone(),
        cfg.prefetch.clone(),
        cfg.news.clone(),
        universe,
        quotes,
        news_sources,
        pipeline,
        Arc::clone(&notifier),
        store,
    );

    // -- Run until interrupted -------------------------------------------

    info!("Entering scan loop. Press Ctrl+C to stop.");
    tokio::select! {
        _ = scanner.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
            scanner.drain().await;
        }
    }

    info!("SENTINEL shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sentinel=info"));

    let json_logging = std::env::var("SENTINEL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
