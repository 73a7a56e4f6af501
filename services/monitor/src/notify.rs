//! Outbound notification gateways
//!
//! Handlers registered with the alert router. Delivery failure is a
//! typed error the router logs; it never blocks alert recording.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use types::alert::AlertEvent;

use crate::alerts::AlertHandler;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway error: {0}")]
    Gateway(String),
}

/// Payload shape expected by webhook receivers.
fn webhook_payload(alert: &AlertEvent) -> serde_json::Value {
    json!({
        "type": alert.kind.label(),
        "symbol": alert.symbol.as_str(),
        "message": alert.message,
    })
}

/// POSTs each alert to a configured webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertHandler for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &AlertEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&webhook_payload(alert))
            .send()
            .await?;
        response.error_for_status()?;
        Ok(())
    }
}

/// Writes each alert to the structured log. Always succeeds; useful as
/// the baseline handler when no gateway is configured.
pub struct LogNotifier;

#[async_trait]
impl AlertHandler for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &AlertEvent) -> Result<(), NotifyError> {
        info!(
            symbol = %alert.symbol,
            kind = alert.kind.label(),
            message = %alert.message,
            "ALERT"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::alert::{AlertEvidence, AlertKind};
    use types::ids::Symbol;

    fn make_alert() -> AlertEvent {
        AlertEvent::new(
            Symbol::new("BTC/USDT"),
            AlertKind::Drift,
            "Model drift detected: 7.00%",
            AlertEvidence {
                observed: 0.07,
                threshold: 0.05,
            },
        )
    }

    #[test]
    fn test_webhook_payload_shape() {
        let payload = webhook_payload(&make_alert());

        assert_eq!(payload["type"], "DRIFT");
        assert_eq!(payload["symbol"], "BTC/USDT");
        assert_eq!(payload["message"], "Model drift detected: 7.00%");
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        assert!(notifier.deliver(&make_alert()).await.is_ok());
    }
}
