//! Quota counters and duplicate suppression.
//!
//! Two independent gates composed as AND by the pipeline: the quota
//! ledger caps how many alerts each candidate (and the process as a
//! whole) may emit per run, and the dedup cache suppresses identical
//! message content inside a sliding window. Both are shared across
//! concurrent evaluations; locks are plain `std::sync::Mutex` and are
//! never held across an await.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

// ---------------------------------------------------------------------------
// Quota ledger
// ---------------------------------------------------------------------------

/// Per-candidate and global alert counters.
pub struct QuotaLedger {
    max_per_candidate: u32,
    max_total: u32,
    inner: Mutex<QuotaState>,
}

#[derive(Default)]
struct QuotaState {
    per_candidate: HashMap<String, u32>,
    total: u32,
}

impl QuotaLedger {
    pub fn new(max_per_candidate: u32, max_total: u32) -> Self {
        Self {
            max_per_candidate,
            max_total,
            inner: Mutex::new(QuotaState::default()),
        }
    }

    /// Cheap pre-check: would an alert for `id` still fit both caps?
    pub fn allows(&self, id: &str) -> bool {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.total < self.max_total
            && state.per_candidate.get(id).copied().unwrap_or(0) < self.max_per_candidate
    }

    /// Count one sent alert for `id` and return the new per-candidate
    /// count.
    pub fn record(&self, id: &str) -> u32 {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.total += 1;
        let count = state.per_candidate.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Alerts already sent for `id`.
    pub fn count_for(&self, id: &str) -> u32 {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.per_candidate.get(id).copied().unwrap_or(0)
    }

    pub fn max_per_candidate(&self) -> u32 {
        self.max_per_candidate
    }

    pub fn total(&self) -> u32 {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.total
    }
}

// ---------------------------------------------------------------------------
// Dedup cache
// ---------------------------------------------------------------------------

/// Content-hash duplicate suppression over a sliding window.
pub struct DedupCache {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Admit `message` unless an identical one went out inside the
    /// window. A suppressed duplicate does not refresh the timestamp,
    /// so a steady stream of duplicates still escapes once per window.
    pub fn try_send(&self, message: &str) -> bool {
        let hash = hex::encode(Sha256::digest(message.as_bytes()));
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = seen.get(&hash) {
            if now.duration_since(*last) < self.window {
                debug!(hash = %&hash[..12], "Duplicate message suppressed");
                return false;
            }
        }
        seen.insert(hash, now);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_per_candidate_cap() {
        let ledger = QuotaLedger::new(2, 100);
        assert!(ledger.allows("2330"));
        assert_eq!(ledger.record("2330"), 1);
        assert_eq!(ledger.record("2330"), 2);
        assert!(!ledger.allows("2330"));
        // Other candidates unaffected.
        assert!(ledger.allows("2317"));
    }

    #[test]
    fn test_quota_global_cap() {
        let ledger = QuotaLedger::new(10, 3);
        ledger.record("a");
        ledger.record("b");
        ledger.record("c");
        assert_eq!(ledger.total(), 3);
        // Even a fresh candidate is refused once the global cap is hit.
        assert!(!ledger.allows("d"));
    }

    #[test]
    fn test_dedup_suppresses_within_window() {
        let cache = DedupCache::new(Duration::from_secs(60));
        assert!(cache.try_send("signal A"));
        assert!(!cache.try_send("signal A"));
        assert!(cache.try_send("signal B"));
    }

    #[test]
    fn test_dedup_expired_window_readmits() {
        let cache = DedupCache::new(Duration::from_millis(0));
        assert!(cache.try_send("signal A"));
        // Zero window: the previous send is already stale.
        assert!(cache.try_send("signal A"));
    }

    #[test]
    fn test_dedup_suppression_does_not_refresh_timestamp() {
        let cache = DedupCache::new(Duration::from_millis(40));
        assert!(cache.try_send("signal A"));
        std::thread::sleep(Duration::from_millis(25));
        // Still inside the window: suppressed, timestamp untouched.
        assert!(!cache.try_send("signal A"));
        std::thread::sleep(Duration::from_millis(25));
        // 50ms after the original send the window has lapsed even
        // though a duplicate arrived in between.
        assert!(cache.try_send("signal A"));
    }

    #[test]
    fn test_dedup_concurrent_single_admission() {
        use std::sync::Arc;
        let cache = Arc::new(DedupCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&cache);
                std::thread::spawn(move || c.try_send("same message"))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|sent| *sent)
            .count();
        assert_eq!(admitted, 1);
    }
}
