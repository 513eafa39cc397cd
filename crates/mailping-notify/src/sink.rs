use crate::{Notification, NotifyError};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification and returns whatever diagnostic text the
    /// endpoint replied with.
    async fn send(&self, notification: &Notification) -> Result<String, NotifyError>;
}

/// Posts notifications as a url-encoded form.
#[derive(Debug, Clone)]
pub struct HttpSink {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl NotificationSink for HttpSink {
    async fn send(&self, notification: &Notification) -> Result<String, NotifyError> {
        tracing::debug!(endpoint = %self.endpoint, ?notification, "posting notification");

        let response = self
            .http
            .post(self.endpoint.clone())
            .form(&notification.form_pairs())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }

        Ok(response.text().await?)
    }
}
