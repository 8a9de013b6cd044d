//! Per-resource event handlers.
//!
//! Each handler owns its own change detection and payload shape, and registers itself on
//! an [`InformerFactory`] through a `build_informer` function. Handlers capture only the
//! cluster labels, a publisher and, for pods, the live lookup. They never reach back into
//! the supervisors.

use std::sync::Arc;

use kube::core::NamespaceResourceScope;
use kube::Api;
use kube::Client;
use kube::Resource;

use crate::config::NamespaceScope;
use crate::domain::cluster::ClusterLabels;
use crate::infrastructure::publisher::Publisher;

pub mod argocd;
pub mod cluster_secret;
pub mod system_executor;
pub mod velero;
pub mod workflow;

/// What a handler is allowed to capture.
#[derive(Clone)]
pub struct HandlerContext {
    pub labels: ClusterLabels,
    pub publisher: Arc<dyn Publisher>,
}

impl HandlerContext {
    pub fn new(labels: ClusterLabels, publisher: Arc<dyn Publisher>) -> Self {
        Self { labels, publisher }
    }

    pub fn cluster_id(&self) -> i64 {
        self.labels.cluster_id
    }
}

/// `Api` over one namespace, or over all of them.
pub(crate) fn scoped_api<K>(client: Client, namespace: &NamespaceScope) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace.as_namespace() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}
