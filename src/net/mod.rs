//! Resilient HTTP plumbing shared by all fetch collaborators.
//!
//! `ResilientClient` wraps a single GET-for-JSON call with bounded
//! retry/backoff on transient statuses, a one-shot certificate-check
//! fallback for broken TLS middleboxes, and terminal mapping of the
//! upstream "quota exhausted" status. Failures come back as values,
//! never as panics or workflow-aborting errors.

pub mod rate_limit;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::FetchError;

/// Backoff base for transient-status retries; doubles per attempt.
const BACKOFF_BASE_MS: u64 = 400;

/// Statuses worth retrying: rate-limit and transient server errors.
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Shift cap keeping the doubling finite for absurd retry configs.
const BACKOFF_MAX_SHIFT: u32 = 6;

fn is_transient(status: StatusCode) -> bool {
    TRANSIENT_STATUSES.contains(&status.as_u16())
}

/// Backoff before retry attempt `n` (1-based): base doubled per
/// attempt, capped at base << 6 (25.6 s).
fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS << (attempt - 1).min(BACKOFF_MAX_SHIFT))
}

/// Walk an error's source chain looking for a TLS/certificate failure.
/// reqwest does not expose a dedicated predicate for these, so we match
/// on the error text the TLS backends produce.
fn is_tls_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        let msg = e.to_string().to_lowercase();
        if msg.contains("certificate") || msg.contains("ssl") || msg.contains("tls") {
            return true;
        }
        source = e.source();
    }
    false
}

/// HTTP client with retry, backoff, and an insecure-transport fallback.
pub struct ResilientClient {
    verified: Client,
    /// Certificate verification disabled; used for exactly one retry after
    /// a TLS failure on the verified client.
    insecure: Client,
    retries: u32,
}

impl ResilientClient {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self> {
        let verified = Client::builder()
            .timeout(timeout)
            .user_agent("SENTINEL/0.1.0")
            .build()
            .context("Failed to build HTTP client")?;
        let insecure = Client::builder()
            .timeout(timeout)
            .user_agent("SENTINEL/0.1.0")
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to build insecure-fallback HTTP client")?;
        Ok(Self {
            verified,
            insecure,
            retries,
        })
    }

    /// GET a JSON document with the full resilience policy.
    ///
    /// Returns the parsed body on success, `FetchError::QuotaExhausted`
    /// on HTTP 402, and `FetchError::Failed` for anything the policy
    /// could not recover from. Callers map both error arms to "absent".
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> std::result::Result<serde_json::Value, FetchError> {
        let mut last_failure = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let backoff = backoff_for(attempt);
                debug!(url, attempt, ?backoff, "Retrying after backoff");
                tokio::time::sleep(backoff).await;
            }

            match self.send(&self.verified, url, query, headers).await {
                Ok(resp) => match self.classify(resp).await? {
                    Classified::Body(v) => return Ok(v),
                    Classified::Transient(status) => {
                        last_failure = format!("HTTP {status}");
                        continue;
                    }
                    Classified::Fatal(status) => {
                        return Err(FetchError::Failed(format!("HTTP {status}")));
                    }
                },
                Err(e) if is_tls_error(&e) => {
                    // One shot with verification off, then give up on this
                    // transport path entirely.
                    warn!(url, error = %e, "TLS failure; retrying once without verification");
                    return match self.send(&self.insecure, url, query, headers).await {
                        Ok(resp) => match self.classify(resp).await? {
                            Classified::Body(v) => Ok(v),
                            Classified::Transient(status) | Classified::Fatal(status) => {
                                Err(FetchError::Failed(format!("HTTP {status} (insecure retry)")))
                            }
                        },
                        Err(e) => Err(FetchError::Failed(e.to_string())),
                    };
                }
                Err(e) => {
                    last_failure = e.to_string();
                    continue;
                }
            }
        }

        Err(FetchError::Failed(last_failure))
    }

    async fn send(
        &self,
        client: &Client,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut req = client.get(url).query(query);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        req.send().await
    }

    async fn classify(
        &self,
        resp: reqwest::Response,
    ) -> std::result::Result<Classified, FetchError> {
        let status = resp.status();

        if status == StatusCode::PAYMENT_REQUIRED {
            return Err(FetchError::QuotaExhausted);
        }
        if is_transient(status) {
            return Ok(Classified::Transient(status.as_u16()));
        }
        if !status.is_success() {
            return Ok(Classified::Fatal(status.as_u16()));
        }

        resp.json::<serde_json::Value>()
            .await
            .map(Classified::Body)
            .map_err(|e| FetchError::Failed(format!("body decode: {e}")))
    }
}

enum Classified {
    Body(serde_json::Value),
    Transient(u16),
    Fatal(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_status_set() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient(StatusCode::NOT_FOUND));
        assert!(!is_transient(StatusCode::OK));
        assert!(!is_transient(StatusCode::PAYMENT_REQUIRED));
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff_for(1), Duration::from_millis(400));
        assert_eq!(backoff_for(2), Duration::from_millis(800));
        assert_eq!(backoff_for(3), Duration::from_millis(1600));
        // Huge attempt counts clamp instead of overflowing the shift.
        assert_eq!(backoff_for(7), Duration::from_millis(25_600));
        assert_eq!(backoff_for(100), backoff_for(7));
    }

    #[test]
    fn test_client_builds() {
        let client = ResilientClient::new(Duration::from_secs(5), 2);
        assert!(client.is_ok());
    }
}
