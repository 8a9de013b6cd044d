//! HTTP fallback used in external mode, when events are POSTed to the orchestrator instead
//! of the message bus.

use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::infrastructure::publisher::PublishError;
use crate::infrastructure::publisher::Publisher;

/// Fallback client config.
#[derive(Debug, Clone)]
pub struct ExternalListenerConfig {
    /// orchestrator webhook url
    pub url: String,
    /// bearer token sent with every request
    pub token: String,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// retries after the first attempt
    pub max_retries: u32,
    /// initial retry delay
    pub retry_delay: Duration,
    /// max retry delay
    pub max_retry_delay: Duration,
}

impl ExternalListenerConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(30),
            max_retries: 4,
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(8),
        }
    }

    pub fn with_retry_config(
        mut self,
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = base_delay;
        self.max_retry_delay = max_delay;
        self
    }
}

#[derive(Debug, Serialize)]
struct ListenerMessage<'a> {
    topic: &'a str,
    payload: Value,
}

/// Publishes by POSTing `{topic, payload}` to the orchestrator. TLS verification is off.
pub struct ExternalListenerClient {
    config: ExternalListenerConfig,
    client: reqwest::Client,
}

impl ExternalListenerClient {
    /// # Errors
    ///
    /// - [`PublishError::ConnectFailed`] if the HTTP client cannot be built
    pub fn new(config: ExternalListenerConfig) -> Result<Self, Report<PublishError>> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.request_timeout)
            .build()
            .change_context_lazy(|| PublishError::ConnectFailed {
                url: config.url.clone(),
            })?;
        Ok(Self { config, client })
    }

    async fn post_once(&self, body: &ListenerMessage<'_>) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.config.url)
            .bearer_auth(&self.config.token)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Publisher for ExternalListenerClient {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Report<PublishError>> {
        let body = ListenerMessage {
            topic,
            payload: serde_json::from_str(payload)
                .unwrap_or_else(|_| Value::String(payload.to_string())),
        };

        let mut delay = self.config.retry_delay;
        let mut attempt = 0;
        loop {
            match self.post_once(&body).await {
                Ok(()) => {
                    debug!(topic, attempt, "Event delivered to external listener");
                    return Ok(());
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        topic,
                        attempt, "External listener request failed, retrying after {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
                Err(e) => {
                    return Err(Report::new(e).change_context(PublishError::PublishFailed {
                        topic: topic.to_string(),
                    }));
                }
            }
        }
    }
}
