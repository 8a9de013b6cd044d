use std::time::Duration;

use error_stack::Report;
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use kube::Client;
use tokio::sync::mpsc;
use tracing::error;
use tracing::info;

use super::SupervisorError;
use crate::domain::cluster::ClusterLabels;
use crate::domain::control::ControlSignal;
use crate::handlers::cluster_secret;
use crate::infrastructure::informer::InformerFactory;
use crate::infrastructure::metrics;
use crate::infrastructure::metrics::DEFAULT_CLUSTER_SECRET_INFORMER;

/// Watches cluster-modify secrets on the host cluster.
///
/// Decoded signals go to the control loop through the channel handed to [`Self::start`];
/// the watcher never calls the supervisor itself.
pub struct ControlPlaneWatcher {
    factory: InformerFactory,
}

impl ControlPlaneWatcher {
    /// Starts the secret informer across all namespaces and blocks until its cache synced.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::ControlPlaneSync`] if the initial list did not complete in
    ///   `sync_timeout`; the caller treats this as fatal
    pub async fn start(
        client: Client,
        labels: ClusterLabels,
        signals: mpsc::UnboundedSender<ControlSignal>,
        sync_timeout: Duration,
    ) -> Result<Self, Report<SupervisorError>> {
        let mut factory = InformerFactory::new(labels.clone());
        cluster_secret::build_informer(&mut factory, Api::<Secret>::all(client), signals);
        Self::start_with(factory, labels, sync_timeout).await
    }

    /// Starts an already populated factory and waits on its cache-sync barrier.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::ControlPlaneSync`] if the barrier is not passed in time
    pub async fn start_with(
        mut factory: InformerFactory,
        labels: ClusterLabels,
        sync_timeout: Duration,
    ) -> Result<Self, Report<SupervisorError>> {
        factory.start();
        let synced = factory.wait_for_cache_sync(sync_timeout).await;
        if let Err(e) = synced {
            metrics::record_unregistered_informer(&labels, DEFAULT_CLUSTER_SECRET_INFORMER);
            error!(cluster = %labels, "Control-plane secret watcher failed to sync");
            factory.shutdown(sync_timeout).await;
            return Err(e.change_context(SupervisorError::ControlPlaneSync));
        }
        info!(cluster = %labels, "Control-plane secret watcher synced");
        Ok(Self { factory })
    }

    pub async fn shutdown(self, timeout: Duration) {
        self.factory.shutdown(timeout).await;
    }
}
