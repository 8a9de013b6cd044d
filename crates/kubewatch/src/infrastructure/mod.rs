//! Adapters between the cluster-watch domain and the outside world: Kubernetes, the
//! message bus, the orchestrator webhook and the cluster inventory.

pub mod external_listener;
pub mod informer;
pub mod inventory;
pub mod k8s;
pub mod kube_client;
pub mod metrics;
pub mod publisher;
