use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ControlPlaneWatcher;
use super::InformerClient;
use super::InformerLauncher;
use super::StartOutcome;
use super::SupervisorError;
use crate::config::WatchSettings;
use crate::domain::client_type::ClientType;
use crate::domain::cluster::ClusterRepository;
use crate::domain::control::ControlAction;
use crate::domain::control::ControlSignal;

/// What a reload did per client type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub started: Vec<ClientType>,
    pub already_running: Vec<ClientType>,
    pub skipped: Vec<ClientType>,
    pub failed: Vec<ClientType>,
}

/// Fans cluster-level operations out over every client type.
pub struct ClusterSupervisor {
    inventory: Arc<dyn ClusterRepository>,
    settings: WatchSettings,
    clients: BTreeMap<ClientType, InformerClient>,
    control: Mutex<Option<ControlPlaneWatcher>>,
    shutdown_timeout: Duration,
}

impl ClusterSupervisor {
    pub fn new(
        inventory: Arc<dyn ClusterRepository>,
        settings: WatchSettings,
        launcher: Arc<dyn InformerLauncher>,
        shutdown_timeout: Duration,
    ) -> Self {
        let clients = ClientType::ALL
            .into_iter()
            .map(|client| {
                (
                    client,
                    InformerClient::new(client, Arc::clone(&launcher), shutdown_timeout),
                )
            })
            .collect();
        Self {
            inventory,
            settings,
            clients,
            control: Mutex::new(None),
            shutdown_timeout,
        }
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    /// Client types with a running informer for `cluster_id`.
    pub fn running_clients(&self, cluster_id: i64) -> Vec<ClientType> {
        self.clients
            .iter()
            .filter(|(_, client)| client.is_running(cluster_id))
            .map(|(client_type, _)| *client_type)
            .collect()
    }

    /// Starts every applicable client for the active record `cluster_id`.
    ///
    /// Returns `Ok(None)` when the record is unknown or not watchable. Per-client failures
    /// are collected in the summary and never stop the other clients.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::Inventory`] if the inventory cannot be queried
    #[tracing::instrument(skip(self))]
    pub async fn reload_cluster(
        &self,
        cluster_id: i64,
    ) -> Result<Option<ReloadSummary>, Report<SupervisorError>> {
        let record = self
            .inventory
            .find_active_by_id(cluster_id)
            .await
            .change_context(SupervisorError::Inventory)?;
        let Some(record) = record else {
            info!("Cluster not found or inactive, nothing to start");
            return Ok(None);
        };

        let mut summary = ReloadSummary::default();
        for client_type in self.settings.applicable_clients(&record) {
            let Some(client) = self.clients.get(&client_type) else {
                continue;
            };
            match client.start_for_cluster(&record).await {
                Ok(StartOutcome::Started) => summary.started.push(client_type),
                Ok(StartOutcome::Skipped) => summary.skipped.push(client_type),
                Err(e) => match e.current_context() {
                    SupervisorError::AlreadyExists { .. } => {
                        debug!(client = %client_type, "Informer already running");
                        summary.already_running.push(client_type);
                    }
                    _ => {
                        warn!(client = %client_type, "Failed to start informer: {e:?}");
                        summary.failed.push(client_type);
                    }
                },
            }
        }
        info!(
            cluster_name = %record.name,
            started = summary.started.len(),
            already_running = summary.already_running.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Cluster reloaded"
        );
        Ok(Some(summary))
    }

    /// Stops every client for `cluster_id` and starts the ones the current config and
    /// inventory imply.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::Inventory`] if the inventory cannot be queried
    #[tracing::instrument(skip(self))]
    pub async fn sync_cluster(
        &self,
        cluster_id: i64,
    ) -> Result<Option<ReloadSummary>, Report<SupervisorError>> {
        self.stop_cluster(cluster_id).await;
        self.reload_cluster(cluster_id).await
    }

    /// Stops every client for the inactive record `cluster_id`.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::Inventory`] if the inventory cannot be queried
    #[tracing::instrument(skip(self))]
    pub async fn delete_cluster(&self, cluster_id: i64) -> Result<(), Report<SupervisorError>> {
        let record = self
            .inventory
            .find_inactive_by_id(cluster_id)
            .await
            .change_context(SupervisorError::Inventory)?;
        match record {
            Some(record) => {
                self.stop_cluster(record.id).await;
                info!(cluster_name = %record.name, "Cluster informers stopped");
            }
            None => info!("No inactive cluster with this id, nothing to stop"),
        }
        Ok(())
    }

    /// Reloads every active cluster. Failures of one cluster are logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::Inventory`] if the active clusters cannot be listed
    #[tracing::instrument(skip(self))]
    pub async fn start_all(&self) -> Result<(), Report<SupervisorError>> {
        let records = self
            .inventory
            .list_active()
            .await
            .change_context(SupervisorError::Inventory)?;
        info!(clusters = records.len(), "Starting informers for active clusters");
        for record in records {
            if let Err(e) = self.reload_cluster(record.id).await {
                warn!(cluster_id = record.id, "Failed to reload cluster: {e:?}");
            }
        }
        Ok(())
    }

    /// Stops every client on every cluster, then the control-plane watcher.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self) {
        for client in self.clients.values() {
            client.stop_all().await;
        }
        if let Some(control) = self.control.lock().await.take() {
            control.shutdown(self.shutdown_timeout).await;
        }
        info!("All informers stopped");
    }

    /// Hands the control-plane watcher to the supervisor so [`Self::stop_all`] stops it.
    pub async fn attach_control_plane(&self, watcher: ControlPlaneWatcher) {
        if let Some(previous) = self.control.lock().await.replace(watcher) {
            previous.shutdown(self.shutdown_timeout).await;
        }
    }

    /// Applies one control signal. Errors are logged, never returned.
    pub async fn handle_signal(&self, signal: ControlSignal) {
        let cluster_id = signal.cluster_id;
        let result = match signal.action {
            ControlAction::Add => self.reload_cluster(cluster_id).await.map(|_| ()),
            ControlAction::Update => self.sync_cluster(cluster_id).await.map(|_| ()),
            ControlAction::Delete => self.delete_cluster(cluster_id).await,
        };
        if let Err(e) = result {
            warn!(cluster_id, action = ?signal.action, "Control signal failed: {e:?}");
        }
    }

    /// Drains control signals until the channel closes or `token` fires.
    pub async fn run_control_loop(
        self: Arc<Self>,
        mut signals: mpsc::UnboundedReceiver<ControlSignal>,
        token: CancellationToken,
    ) {
        info!("Control loop started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => break,
                },
            }
        }
        info!("Control loop stopped");
    }

    async fn stop_cluster(&self, cluster_id: i64) {
        for (client_type, client) in &self.clients {
            debug!(client = %client_type, cluster_id, "Stopping informer");
            client.stop_for_cluster(cluster_id).await;
        }
    }
}
