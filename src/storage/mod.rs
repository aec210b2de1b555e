//! Durable signal log.
//!
//! Every delivered alert is appended to a local SQLite database, which
//! also feeds the per-pass run summary. Writes are fire-and-forget from
//! the pipeline's point of view: a failed insert is logged, never fatal.

use anyhow::{Context, Result};
use chrono::Local;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS signals (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ts TEXT NOT NULL,
  stock_id TEXT NOT NULL,
  stock_name TEXT NOT NULL,
  strategy_name TEXT NOT NULL,
  price REAL NOT NULL,
  trigger_count INTEGER NOT NULL,
  signal_type TEXT NOT NULL,
  reason TEXT
);
";

/// Signal categories recorded alongside each alert.
pub const CATEGORY_SWING: &str = "swing";

pub struct SignalStore {
    pool: SqlitePool,
}

impl SignalStore {
    /// Open (creating if needed) the signal database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open signal db at {}", path.display()))?;
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create signals table")?;
        info!(path = %path.display(), "Signal store ready");
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection keeps the whole
    /// database on one handle.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory signal db")?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Append one delivered alert.
    #[allow(clippy::too_many_arguments)]
    pub async fn log_signal(
        &self,
        stock_id: &str,
        stock_name: &str,
        strategy_names: &str,
        price: f64,
        trigger_count: u32,
        category: &str,
        reason: &str,
    ) -> Result<()> {
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        sqlx::query(
            "INSERT INTO signals \
             (ts, stock_id, stock_name, strategy_name, price, trigger_count, signal_type, reason) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ts)
        .bind(stock_id)
        .bind(stock_name)
        .bind(strategy_names)
        .bind(price)
        .bind(trigger_count as i64)
        .bind(category)
        .bind(reason)
        .execute(&self.pool)
        .await
        .context("Failed to insert signal")?;
        Ok(())
    }

    /// Human-readable summary of today's activity: total count plus the
    /// five most-alerted candidates.
    pub async fn today_summary(&self) -> Result<String> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM signals WHERE date(ts) = date('now','localtime')",
        )
        .fetch_one(&self.pool)
        .await?
        .get("cnt");

        let top = sqlx::query(
            "SELECT stock_id, stock_name, COUNT(*) AS cnt \
             FROM signals WHERE date(ts) = date('now','localtime') \
             GROUP BY stock_id, stock_name ORDER BY cnt DESC LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut msg = format!("Signals today: {total}");
        if !top.is_empty() {
            msg.push_str("\nMost alerted:");
            for row in top {
                let id: String = row.get("stock_id");
                let name: String = row.get("stock_name");
                let cnt: i64 = row.get("cnt");
                msg.push_str(&format!("\n{id} {name}: {cnt}"));
            }
        }
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
