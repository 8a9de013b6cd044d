use anyhow::Result;
use tokio::sync::mpsc;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::WatchArgs;
use crate::domain::cluster::ClusterRecord;
use crate::domain::cluster::DEFAULT_CLUSTER_NAME;
use crate::domain::control::ControlSignal;
use crate::supervisor::ControlPlaneWatcher;

/// Application core structure with explicit dependencies
pub struct Application {
    services: ApplicationServices,
    args: WatchArgs,
}

impl Application {
    pub fn new(services: ApplicationServices, args: WatchArgs) -> Self {
        Self { services, args }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    pub fn args(&self) -> &WatchArgs {
        &self.args
    }

    /// Starts the control plane and the informers, then runs until shutdown.
    ///
    /// Every exit after the control plane is up goes through [`Self::shutdown`].
    pub async fn run(&self) -> Result<()> {
        let signals = self.start_control_plane().await?;
        let mut tasks = Tasks::new();

        if let Err(e) = self.services.supervisor.start_all().await {
            self.shutdown(tasks).await;
            return Err(anyhow::anyhow!("Failed to start informers: {e:?}"));
        }

        tracing::info!("Starting all application tasks...");
        if let Err(e) = tasks.spawn_all_tasks(self, signals) {
            tracing::error!("Failed to spawn application tasks: {}", e);
            self.shutdown(tasks).await;
            return Err(e);
        }

        let result = tasks.wait_for_completion().await;
        if let Err(e) = &result {
            tracing::error!("Error during task execution: {}", e);
        }

        self.shutdown(tasks).await;
        tracing::info!("Application run completed");
        result
    }

    /// Stops every informer and the control-plane watcher, then the remaining tasks
    /// within the shutdown timeout.
    async fn shutdown(&self, mut tasks: Tasks) {
        tracing::info!("Shutting down application...");
        self.services.supervisor.stop_all().await;
        tasks.shutdown(self.args.shutdown_timeout()).await;
        tracing::info!("Application shutdown completed");
    }

    /// Starts the cluster-modify secret watcher on the host cluster and blocks on its
    /// cache sync. External mode has no inventory to follow and skips it.
    ///
    /// A sync failure is fatal.
    async fn start_control_plane(
        &self,
    ) -> Result<Option<mpsc::UnboundedReceiver<ControlSignal>>> {
        if self.args.external_rest_listener {
            tracing::info!("External mode, control-plane watcher disabled");
            return Ok(None);
        }

        let host = self
            .services
            .inventory
            .find_by_name(DEFAULT_CLUSTER_NAME)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to query cluster inventory: {e:?}"))?
            .unwrap_or_else(ClusterRecord::default_cluster);
        let client = self
            .services
            .kube_clients
            .client_for(&host)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to host cluster: {e:?}"))?;

        // Signals listed before sync queue up here until the control loop is spawned.
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher =
            ControlPlaneWatcher::start(client, host.labels(), tx, self.args.cache_sync_timeout())
                .await
                .map_err(|e| anyhow::anyhow!("Control-plane watcher failed: {e:?}"))?;
        self.services.supervisor.attach_control_plane(watcher).await;
        Ok(Some(rx))
    }
}
