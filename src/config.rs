//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API tokens, webhook URLs) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub prefetch: PrefetchConfig,
    pub limits: LimitsConfig,
    pub finmind: FinMindConfig,
    pub news: NewsConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Candidate cap produced by the liquidity prefilter.
    pub scan_limit: usize,
    /// Concurrent evaluations per wave.
    pub wave_size: usize,
    /// Sleep between full scan passes, seconds.
    pub sleep_secs: u64,
    /// Price history window, years.
    pub years_history: u32,
    /// Refresh shared news/universe every K iterations.
    pub refresh_every: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PrefetchConfig {
    /// Price ceiling for the liquidity screen.
    pub price_ceiling: f64,
    /// Max serial-tier probes before giving up.
    pub max_checks: usize,
    /// Candidates per batched quote request.
    pub quote_batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_signal_per_stock: u32,
    pub max_signal_total: u32,
    pub dedup_window_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FinMindConfig {
    /// Env var holding the API token (optional; unauthenticated works
    /// with a lower upstream quota).
    pub token_env: Option<String>,
    pub qps: f64,
    pub retries: u32,
    pub fund_flow_enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsConfig {
    /// Minimum positive-sentiment confidence for the news strategy.
    pub positive_threshold: f64,
    /// Pages to pull from each headline source per refresh.
    pub pages: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    /// Env var holding the Discord webhook URL. Unset ⇒ terminal only.
    pub discord_webhook_env: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an env-var-name option to its value, if both are present.
    pub fn resolve_env(env_name: Option<&str>) -> Option<String> {
        env_name
            .and_then(|name| std::env::var(name).ok())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_src = r#"
            [scanner]
            scan_limit = 1000
            wave_size = 10
            sleep_secs = 20
            years_history = 2
            refresh_every = 10

            [prefetch]
            price_ceiling = 1500.0
            max_checks = 300
            quote_batch_size = 80

            [limits]
            max_signal_per_stock = 20
            max_signal_total = 200
            dedup_window_secs = 1200

            [finmind]
            token_env = "FINMIND_TOKEN"
            qps = 4.0
            retries = 2
            fund_flow_enabled = true

            [news]
            positive_threshold = 0.80
            pages = 2

            [alerts]
            discord_webhook_env = "DISCORD_WEBHOOK"
        "#;
        let cfg: AppConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.scanner.scan_limit, 1000);
        assert_eq!(cfg.scanner.wave_size, 10);
        assert_eq!(cfg.prefetch.price_ceiling, 1500.0);
        assert_eq!(cfg.limits.max_signal_per_stock, 20);
        assert_eq!(cfg.limits.dedup_window_secs, 1200);
        assert!(cfg.finmind.fund_flow_enabled);
        assert!((cfg.news.positive_threshold - 0.80).abs() < 1e-12);
    }

    #[test]
    fn test_resolve_env_missing() {
        assert_eq!(
            AppConfig::resolve_env(Some("SENTINEL_TEST_UNSET_VAR_XYZ")),
            None
        );
        assert_eq!(AppConfig::resolve_env(None), None);
    }
}
