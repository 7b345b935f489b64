// src/notify.rs
//
// Completion hook for import jobs. The pipeline guarantees one invocation
// per job reaching a terminal state; whether the message actually lands
// anywhere is the notifier's problem, not the pipeline's.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::models::{ImportKind, ImportStatus};

#[derive(Debug, Clone)]
pub struct ImportEvent {
    pub job_id: Uuid,
    pub kind: ImportKind,
    pub status: ImportStatus,
    pub succeeded: u32,
    pub failed: u32,
    pub duration: Duration,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook rejected the payload with status {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait ImportNotifier: Send + Sync {
    async fn notify(&self, event: &ImportEvent) -> Result<(), NotifyError>;
}

/// Posts a colored attachment to a Slack incoming webhook.
pub struct SlackNotifier {
    client: Client,
    webhook_url: Url,
}

impl SlackNotifier {
    pub fn new(webhook_url: Url) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl ImportNotifier for SlackNotifier {
    async fn notify(&self, event: &ImportEvent) -> Result<(), NotifyError> {
        let color = match event.status {
            ImportStatus::Completed => "#2196F3",
            _ => "#F44336",
        };

        let payload = serde_json::json!({
            "attachments": [{
                "color": color,
                "title": format!("Import {}: {}", event.job_id, event.status.as_str()),
                "fields": [
                    {
                        "title": "Kind",
                        "value": event.kind.as_str(),
                        "short": true
                    },
                    {
                        "title": "Rows",
                        "value": format!("{} succeeded / {} failed", event.succeeded, event.failed),
                        "short": true
                    },
                    {
                        "title": "Duration",
                        "value": format!("{:.2}s", event.duration.as_secs_f64()),
                        "short": true
                    }
                ],
                "footer": "worklens import pipeline",
                "ts": chrono::Utc::now().timestamp()
            }]
        });

        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Fallback notifier when no webhook is configured; writes the event to the
/// application log instead.
pub struct LogNotifier;

#[async_trait]
impl ImportNotifier for LogNotifier {
    async fn notify(&self, event: &ImportEvent) -> Result<(), NotifyError> {
        info!(
            job_id = %event.job_id,
            kind = event.kind.as_str(),
            status = event.status.as_str(),
            succeeded = event.succeeded,
            failed = event.failed,
            duration_secs = event.duration.as_secs_f64(),
            "import job notification"
        );
        Ok(())
    }
}
