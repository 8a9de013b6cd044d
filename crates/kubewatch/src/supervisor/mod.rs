//! Informer supervision.
//!
//! - [`InformerClient`]: one per client type, tracks a stop handle per cluster id
//! - [`ClusterSupervisor`]: fans a cluster out over every applicable client
//! - [`ControlPlaneWatcher`]: turns cluster-modify secrets into supervisor calls
//! - [`InformerLauncher`]: builds and starts the informer factory for one client on one
//!   cluster

use core::error::Error;

use crate::domain::client_type::ClientType;

pub mod client;
pub mod cluster;
pub mod control;
pub mod launcher;

pub use client::InformerClient;
pub use client::StartOutcome;
pub use cluster::ClusterSupervisor;
pub use cluster::ReloadSummary;
pub use control::ControlPlaneWatcher;
pub use launcher::InformerLauncher;
pub use launcher::KubeInformerLauncher;

#[derive(Debug, derive_more::Display)]
pub enum SupervisorError {
    #[display("Informer {client} is already running for cluster {cluster_id}")]
    AlreadyExists { client: ClientType, cluster_id: i64 },
    #[display("Failed to start informer {client} for cluster {cluster_id}")]
    StartFailed { client: ClientType, cluster_id: i64 },
    #[display("Cluster inventory is unavailable")]
    Inventory,
    #[display("Control-plane secret watcher failed to sync")]
    ControlPlaneSync,
}

impl Error for SupervisorError {}
