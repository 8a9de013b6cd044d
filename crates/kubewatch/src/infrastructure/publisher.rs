//! Outbound message-bus port.

use core::error::Error;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;
use tracing::warn;

#[derive(Debug, derive_more::Display)]
pub enum PublishError {
    #[display("Failed to connect to message bus at {url}")]
    ConnectFailed { url: String },
    #[display("Failed to publish on topic {topic}")]
    PublishFailed { topic: String },
    #[display("Publish on topic {topic} timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },
    #[display("Failed to serialize payload for topic {topic}")]
    Serialization { topic: String },
}

impl Error for PublishError {}

/// Publishes `(topic, payload)` pairs. Shared by every handler, so implementations must
/// accept concurrent calls.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Report<PublishError>>;

    /// `false` for the nil-object used when no bus is configured.
    fn is_available(&self) -> bool {
        true
    }
}

/// Stand-in used when no message bus is configured. Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

#[async_trait::async_trait]
impl Publisher for NullPublisher {
    async fn publish(&self, topic: &str, _payload: &str) -> Result<(), Report<PublishError>> {
        warn!(topic, "No message bus configured, dropping event");
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// NATS JetStream publisher. Every publish waits for the stream acknowledgement.
pub struct NatsPublisher {
    jetstream: async_nats::jetstream::Context,
    timeout: Duration,
}

impl NatsPublisher {
    /// Connects to the NATS server at `url`.
    ///
    /// # Errors
    ///
    /// - [`PublishError::ConnectFailed`] if the server cannot be reached
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, Report<PublishError>> {
        let client = async_nats::connect(url)
            .await
            .change_context(PublishError::ConnectFailed {
                url: url.to_string(),
            })?;
        tracing::info!(url, "Connected to NATS");
        Ok(Self {
            jetstream: async_nats::jetstream::new(client),
            timeout,
        })
    }

    async fn publish_acked(&self, topic: &str, payload: &str) -> Result<(), Report<PublishError>> {
        let failed = || PublishError::PublishFailed {
            topic: topic.to_string(),
        };
        self.jetstream
            .publish(topic.to_string(), payload.to_string().into())
            .await
            .change_context_lazy(failed)?
            .await
            .change_context_lazy(failed)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Report<PublishError>> {
        tokio::time::timeout(self.timeout, self.publish_acked(topic, payload))
            .await
            .map_err(|_| {
                Report::new(PublishError::Timeout {
                    topic: topic.to_string(),
                    timeout: self.timeout,
                })
            })??;
        debug!(topic, "Published event");
        Ok(())
    }
}

/// The publishers handed to handlers.
///
/// Workflow handlers use `workflow`, which is the external HTTP fallback when the bus is
/// absent and external mode is on. Every other handler uses `bus` and drops silently when
/// it is absent.
#[derive(Clone)]
pub struct Publishers {
    pub bus: Arc<dyn Publisher>,
    pub workflow: Arc<dyn Publisher>,
}

impl Publishers {
    pub fn new(bus: Arc<dyn Publisher>, external: Option<Arc<dyn Publisher>>) -> Self {
        let workflow = match external {
            Some(external) if !bus.is_available() => external,
            _ => bus.clone(),
        };
        Self { bus, workflow }
    }

    pub fn single(publisher: Arc<dyn Publisher>) -> Self {
        Self::new(publisher, None)
    }
}

/// Serializes `payload` and publishes it, logging instead of returning failures.
///
/// Publish failures never back-pressure an informer; a later resync re-observes the
/// steady state.
pub async fn publish_json<T: serde::Serialize + ?Sized>(
    publisher: &dyn Publisher,
    topic: &str,
    payload: &T,
) {
    let body = match serde_json::to_string(payload) {
        Ok(body) => body,
        Err(e) => {
            let report = Report::new(e).change_context(PublishError::Serialization {
                topic: topic.to_string(),
            });
            warn!(topic, "Dropping event: {report:?}");
            return;
        }
    };
    if let Err(e) = publisher.publish(topic, &body).await {
        warn!(topic, "Failed to publish event: {e:?}");
    }
}
