//! Downstream run notifications
//!
//! At the end of an export the scheduler hands its summary to an optional
//! [`Notifier`]. Delivery failures are the caller's to log; they never
//! affect the run's outcome.

use crate::downloader::ExportSummary;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Webhook request deadline
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Most failures listed in one message
const MAX_LISTED_FAILURES: usize = 10;

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Request could not be sent
    #[error("network error: {0}")]
    NetworkError(String),

    /// Endpoint answered with a non-success status
    #[error("webhook rejected message: HTTP {0}")]
    Rejected(u16),
}

/// Receiver of run summaries
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a summary; `title` names the run (e.g. symbols and range)
    async fn notify(&self, title: &str, summary: &ExportSummary) -> Result<(), NotifyError>;
}

/// Chat-style webhook body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    /// Plain-text line
    pub content: String,
    /// Rich embeds
    pub embeds: Vec<WebhookEmbed>,
}

/// One embed block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEmbed {
    /// Embed title
    pub title: String,
    /// Embed description
    pub description: String,
    /// Name/value fields
    pub fields: Vec<WebhookField>,
}

/// One embed field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookField {
    /// Field label
    pub name: String,
    /// Field value
    pub value: String,
    /// Render side by side
    pub inline: bool,
}

impl WebhookField {
    fn inline(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            inline: true,
        }
    }
}

impl WebhookMessage {
    /// Render a run summary
    pub fn from_summary(title: &str, summary: &ExportSummary) -> Self {
        let status = if summary.cancelled {
            "cancelled"
        } else if summary.failed > 0 {
            "finished with failures"
        } else {
            "finished"
        };

        let mut fields = vec![
            WebhookField::inline("Done", summary.done),
            WebhookField::inline("Failed", summary.failed),
            WebhookField::inline("Skipped", summary.skipped),
        ];
        if summary.pruned > 0 {
            fields.push(WebhookField::inline("Pruned", summary.pruned));
        }

        if !summary.failures.is_empty() {
            let mut listed: Vec<String> = summary
                .failures
                .iter()
                .take(MAX_LISTED_FAILURES)
                .map(|f| format!("{}: {}", f.key, f.reason))
                .collect();
            let hidden = summary.failures.len().saturating_sub(MAX_LISTED_FAILURES);
            if hidden > 0 {
                listed.push(format!("... and {hidden} more"));
            }
            fields.push(WebhookField {
                name: "Failures".to_string(),
                value: listed.join("\n"),
                inline: false,
            });
        }

        Self {
            content: format!(
                "Export {status}: {} done, {} failed, {} skipped",
                summary.done, summary.failed, summary.skipped
            ),
            embeds: vec![WebhookEmbed {
                title: format!("Coinalyze export • {title}"),
                description: status.to_string(),
                fields,
            }],
        }
    }
}

/// Posts summaries as JSON to a webhook URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a notifier for `url`
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::NetworkError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, title: &str, summary: &ExportSummary) -> Result<(), NotifyError> {
        let message = WebhookMessage::from_summary(title, summary);
        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        debug!(status = status.as_u16(), "Webhook notification delivered");
        Ok(())
    }
}
