//! Notifier implementations.
//!
//! Delivery failures are returned to the caller, which logs and ignores them.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use shipwright_core::{CoreError, CoreResult, Notification, Notifier};

/// Environment variable holding a webhook URL for job notifications.
pub const NOTIFY_URL_ENV: &str = "SHIPWRIGHT_NOTIFY_URL";

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> CoreResult<()> {
        info!(
            user_id = %notification.user_id,
            job_id = %notification.job_id,
            kind = ?notification.kind,
            url = notification.url.as_deref().unwrap_or(""),
            "Job notification"
        );
        Ok(())
    }
}

/// Posts notifications as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    url: String,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Notification(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: &Notification) -> CoreResult<()> {
        debug!("POST {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| CoreError::Notification(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CoreError::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
