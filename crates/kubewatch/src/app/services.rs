use std::sync::Arc;

use crate::domain::cluster::ClusterRepository;
use crate::infrastructure::kube_client::KubeClientFactory;
use crate::infrastructure::publisher::Publishers;
use crate::supervisor::ClusterSupervisor;

/// Application dependencies - simple struct with Arc-wrapped services
pub struct ApplicationServices {
    pub supervisor: Arc<ClusterSupervisor>,
    pub inventory: Arc<dyn ClusterRepository>,
    pub kube_clients: KubeClientFactory,
    pub publishers: Publishers,
}
