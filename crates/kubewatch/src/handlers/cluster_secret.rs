//! Cluster-modify secret handler.
//!
//! Decodes control signals and forwards them to the control loop over an unbounded
//! channel. The handler never touches the supervisors and never waits on the loop, so the
//! initial list can be delivered and the cache marked synced before the loop drains it.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::watcher;
use kube::Api;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::control::ControlSignal;
use crate::domain::control::CLUSTER_MODIFY_SECRET_TYPE;
use crate::infrastructure::informer::InformerFactory;
use crate::infrastructure::informer::ResourceEventHandler;
use crate::infrastructure::metrics::DEFAULT_CLUSTER_SECRET_INFORMER;

pub struct ClusterSecretHandler {
    signals: mpsc::UnboundedSender<ControlSignal>,
}

impl ClusterSecretHandler {
    pub fn new(signals: mpsc::UnboundedSender<ControlSignal>) -> Self {
        Self { signals }
    }

    fn forward(&self, secret: &Secret) {
        let signal = match ControlSignal::from_secret(secret) {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                debug!(secret = %secret.name_any(), "Ignoring secret of another type");
                return;
            }
            Err(e) => {
                warn!(secret = %secret.name_any(), "Malformed cluster-modify secret: {e:?}");
                return;
            }
        };
        info!(
            secret = %secret.name_any(),
            cluster_id = signal.cluster_id,
            action = ?signal.action,
            "Cluster modify request"
        );
        if self.signals.send(signal).is_err() {
            warn!(cluster_id = signal.cluster_id, "Control loop is gone, dropping signal");
        }
    }
}

#[async_trait::async_trait]
impl ResourceEventHandler<Secret> for ClusterSecretHandler {
    async fn on_add(&self, secret: &Secret) {
        self.forward(secret);
    }

    async fn on_update(&self, old: &Secret, new: &Secret) {
        if old.resource_version() == new.resource_version() {
            return;
        }
        self.forward(new);
    }

    /// Deleting the request secret does not undo the request.
    async fn on_delete(&self, _secret: &Secret) {}
}

/// Field selector matching only cluster-modify secrets.
pub fn field_selector() -> String {
    format!("type={CLUSTER_MODIFY_SECRET_TYPE}")
}

pub fn build_informer(
    factory: &mut InformerFactory,
    api: Api<Secret>,
    signals: mpsc::UnboundedSender<ControlSignal>,
) {
    factory.add_informer(
        DEFAULT_CLUSTER_SECRET_INFORMER,
        api,
        watcher::Config::default().fields(&field_selector()),
        Arc::new(ClusterSecretHandler::new(signals)),
    );
}
