//! Alert delivery.
//!
//! Every alert goes to the terminal; if a Discord webhook is
//! configured, it also goes there. Delivery is strictly best-effort:
//! a dead webhook logs a warning and the scan keeps running.

use std::time::Duration;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Notifier {
    webhook: Option<String>,
    http: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self { webhook, http })
    }

    /// Print the message and push it to the webhook if one is set.
    /// Never fails the caller.
    pub async fn send(&self, message: &str) {
        if message.is_empty() {
            return;
        }
        println!("{message}");

        let Some(webhook) = &self.webhook else {
            debug!("No webhook configured; terminal only");
            return;
        };
        let payload = serde_json::json!({ "content": message });
        match self.http.post(webhook).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(status = %resp.status(), "Webhook delivery rejected"),
            Err(e) => warn!(error = %e, "Webhook delivery failed"),
        }
    }

    pub fn has_webhook(&self) -> bool {
        self.webhook.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_webhook_is_noop() {
        let n = Notifier::new(None).unwrap();
        assert!(!n.has_webhook());
        // Must complete without error and without network traffic.
        n.send("hello").await;
        n.send("").await;
    }
}
