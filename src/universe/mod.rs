//! Candidate universe acquisition.
//!
//! Resolves the full list of listed securities through an ordered
//! fallback chain: same-day file cache → FinMind `TaiwanStockInfo` →
//! TWSE OpenAPI → a small built-in list. The chain always yields
//! *something* so the scan loop never starves; correctness is traded
//! for availability at the last tier.

pub mod prefilter;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::net::ResilientClient;
use crate::types::Candidate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const CACHE_FILE: &str = "cache/universe.json";

/// Last-resort universe when every source is down.
const BUILTIN_UNIVERSE: &[(&str, &str)] = &[
    ("2330", "台積電"),
    ("2317", "鴻海"),
    ("2454", "聯發科"),
    ("2303", "聯電"),
    ("2881", "富邦金"),
    ("2882", "國泰金"),
    ("2603", "長榮"),
    ("2609", "陽明"),
    ("2615", "萬海"),
    ("1303", "南亞"),
];

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// One upstream that can produce the candidate list. Sources are tried
/// in order; a source that errors or returns nothing yields to the next.
#[async_trait]
pub trait UniverseSource: Send + Sync {
    async fn attempt(&self) -> Result<Vec<Candidate>>;
    fn name(&self) -> &'static str;
}

/// Primary: FinMind `TaiwanStockInfo` (no token required).
pub struct FinMindUniverse {
    http: ResilientClient,
}

impl FinMindUniverse {
    const URL: &'static str = "https://api.finmindtrade.com/api/v4/data";

    pub fn new(retries: u32) -> Result<Self> {
        Ok(Self {
            http: ResilientClient::new(REQUEST_TIMEOUT, retries)
                .context("Failed to build FinMind universe client")?,
        })
    }

    fn parse(body: &serde_json::Value) -> Vec<Candidate> {
        let Some(rows) = body.get("data").and_then(|d| d.as_array()) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                let id = row.get("stock_id")?.as_str()?.trim();
                let name = row.get("stock_name")?.as_str()?.trim();
                let kind = row
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_lowercase();
                let listed = kind.is_empty() || kind == "twse" || kind == "tse" || kind == "上市";
                (listed && !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
                    .then(|| Candidate::new(id, name))
            })
            .collect()
    }
}

#[async_trait]
impl UniverseSource for FinMindUniverse {
    async fn attempt(&self) -> Result<Vec<Candidate>> {
        let body = self
            .http
            .get_json(
                Self::URL,
                &[("dataset", "TaiwanStockInfo".to_string())],
                &[],
            )
            .await
            .map_err(|e| anyhow::anyhow!("TaiwanStockInfo fetch: {e}"))?;
        Ok(Self::parse(&body))
    }

    fn name(&self) -> &'static str {
        "finmind"
    }
}

/// Secondary: TWSE OpenAPI listed-company registry. The resilient
/// client already covers the endpoint's occasional TLS breakage.
pub struct TwseUniverse {
    http: ResilientClient,
}

impl TwseUniverse {
    const URL: &'static str = "https://openapi.twse.com.tw/v1/opendata/t187ap03_L";

    pub fn new(retries: u32) -> Result<Self> {
        Ok(Self {
            http: ResilientClient::new(REQUEST_TIMEOUT, retries)
                .context("Failed to build TWSE universe client")?,
        })
    }

    fn parse(body: &serde_json::Value) -> Vec<Candidate> {
        let Some(rows) = body.as_array() else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| {
                let id = row.get("公司代號")?.as_str()?.trim();
                let name = row
                    .get("公司簡稱")
                    .or_else(|| row.get("公司名稱"))?
                    .as_str()?
                    .trim();
                (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
                    .then(|| Candidate::new(id, name))
            })
            .collect()
    }
}

#[async_trait]
impl UniverseSource for TwseUniverse {
    async fn attempt(&self) -> Result<Vec<Candidate>> {
        let body = self
            .http
            .get_json(Self::URL, &[], &[])
            .await
            .map_err(|e| anyhow::anyhow!("TWSE registry fetch: {e}"))?;
        Ok(Self::parse(&body))
    }

    fn name(&self) -> &'static str {
        "twse-openapi"
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Ordered source chain with a same-day file cache.
pub struct UniverseChain {
    sources: Vec<Box<dyn UniverseSource>>,
    cache_path: PathBuf,
}

impl UniverseChain {
    pub fn new(sources: Vec<Box<dyn UniverseSource>>) -> Self {
        Self {
            sources,
            cache_path: PathBuf::from(CACHE_FILE),
        }
    }

    pub fn with_cache_path(mut self, path: &Path) -> Self {
        self.cache_path = path.to_path_buf();
        self
    }

    /// Resolve the universe. With `use_cache`, a cache file last
    /// modified today is returned verbatim; otherwise sources are tried
    /// in order and the first non-empty result is cached and returned.
    /// The built-in list is the final fallback and is never cached.
    pub async fn get_universe(&self, use_cache: bool) -> Vec<Candidate> {
        if use_cache {
            if let Some(cached) = self.load_cache_today() {
                debug!(count = cached.len(), "Universe from same-day cache");
                return cached;
            }
        }

        for source in &self.sources {
            match source.attempt().await {
                Ok(candidates) if !candidates.is_empty() => {
                    info!(
                        source = source.name(),
                        count = candidates.len(),
                        "Universe acquired"
                    );
                    self.save_cache(&candidates);
                    return candidates;
                }
                Ok(_) => {
                    debug!(source = source.name(), "Universe source returned nothing");
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Universe source failed");
                }
            }
        }

        warn!("All universe sources failed; using built-in fallback list");
        BUILTIN_UNIVERSE
            .iter()
            .map(|(id, name)| Candidate::new(*id, *name))
            .collect()
    }

    /// Cache validity is keyed on the file's last-modified date, not on
    /// its content.
    fn load_cache_today(&self) -> Option<Vec<Candidate>> {
        let meta = std::fs::metadata(&self.cache_path).ok()?;
        let modified: DateTime<Local> = meta.modified().ok()?.into();
        if modified.date_naive() != Local::now().date_naive() {
            return None;
        }
        let raw = std::fs::read_to_string(&self.cache_path).ok()?;
        let candidates: Vec<Candidate> = serde_json::from_str(&raw).ok()?;
        (!candidates.is_empty()).then_some(candidates)
    }

    fn save_cache(&self, candidates: &[Candidate]) {
        if let Some(dir) = self.cache_path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match serde_json::to_string(candidates) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.cache_path, json) {
                    debug!(error = %e, "Universe cache write failed");
                }
            }
            Err(e) => debug!(error = %e, "Universe cache serialise failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
