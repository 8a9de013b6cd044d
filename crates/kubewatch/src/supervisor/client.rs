use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use error_stack::Report;
use tracing::debug;
use tracing::info;

use super::InformerLauncher;
use super::SupervisorError;
use crate::domain::client_type::ClientType;
use crate::domain::cluster::ClusterRecord;
use crate::infrastructure::informer::InformerFactory;
use crate::util::keyed_lock::KeyedAsyncLock;

/// Result of a successful [`InformerClient::start_for_cluster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The cluster does not serve the resources this client needs.
    Skipped,
}

/// Supervises the informers of one client type across clusters.
///
/// At most one informer factory exists per cluster id. Starts and stops for the same
/// cluster are serialized; different clusters proceed concurrently.
pub struct InformerClient {
    client: ClientType,
    launcher: Arc<dyn InformerLauncher>,
    handles: Mutex<HashMap<i64, InformerFactory>>,
    locks: KeyedAsyncLock<i64>,
    shutdown_timeout: Duration,
}

impl InformerClient {
    pub fn new(
        client: ClientType,
        launcher: Arc<dyn InformerLauncher>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            client,
            launcher,
            handles: Mutex::new(HashMap::new()),
            locks: KeyedAsyncLock::new(),
            shutdown_timeout,
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<i64, InformerFactory>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts the informer for `record` unless one is already running.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::AlreadyExists`] if an informer is running for this cluster;
    ///   the caller must stop it first to replace it
    /// - [`SupervisorError::StartFailed`] if the launcher could not connect
    pub async fn start_for_cluster(
        &self,
        record: &ClusterRecord,
    ) -> Result<StartOutcome, Report<SupervisorError>> {
        let _guard = self.locks.lock(&record.id).await;
        if self.handles().contains_key(&record.id) {
            return Err(Report::new(SupervisorError::AlreadyExists {
                client: self.client,
                cluster_id: record.id,
            }));
        }

        let Some(factory) = self.launcher.launch(self.client, record).await? else {
            return Ok(StartOutcome::Skipped);
        };
        self.handles().insert(record.id, factory);
        info!(client = %self.client, cluster_id = record.id, "Informer registered");
        Ok(StartOutcome::Started)
    }

    /// Stops the informer for `cluster_id`. Stopping an unknown cluster is a no-op.
    pub async fn stop_for_cluster(&self, cluster_id: i64) {
        let _guard = self.locks.lock(&cluster_id).await;
        let Some(factory) = self.handles().remove(&cluster_id) else {
            debug!(client = %self.client, cluster_id, "No informer to stop");
            return;
        };
        factory.shutdown(self.shutdown_timeout).await;
        info!(client = %self.client, cluster_id, "Informer stopped");
    }

    pub async fn stop_all(&self) {
        for cluster_id in self.running_clusters() {
            self.stop_for_cluster(cluster_id).await;
        }
    }

    /// Cluster ids with a running informer, in ascending order.
    pub fn running_clusters(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.handles().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_running(&self, cluster_id: i64) -> bool {
        self.handles().contains_key(&cluster_id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use error_stack::Report;

    use crate::domain::client_type::ClientType;
    use crate::domain::cluster::ClusterRecord;
    use crate::infrastructure::informer::InformerFactory;
    use crate::supervisor::InformerLauncher;
    use crate::supervisor::SupervisorError;

    /// Hands back empty, started factories. Clusters listed in `unserved` are skipped and
    /// clusters in `failing` fail to start.
    #[derive(Default)]
    pub(crate) struct FakeLauncher {
        pub(crate) unserved: Vec<i64>,
        pub(crate) failing: Vec<i64>,
        pub(crate) delay: Option<Duration>,
        pub(crate) launches: AtomicUsize,
    }

    impl FakeLauncher {
        pub(crate) fn launches(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }

        pub(crate) fn shared(self) -> Arc<Self> {
            Arc::new(self)
        }
    }

    #[async_trait::async_trait]
    impl InformerLauncher for FakeLauncher {
        async fn launch(
            &self,
            client: ClientType,
            record: &ClusterRecord,
        ) -> Result<Option<InformerFactory>, Report<SupervisorError>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(&record.id) {
                return Err(Report::new(SupervisorError::StartFailed {
                    client,
                    cluster_id: record.id,
                }));
            }
            if self.unserved.contains(&record.id) {
                return Ok(None);
            }
            let mut factory = InformerFactory::new(record.labels());
            factory.start();
            Ok(Some(factory))
        }
    }
}
