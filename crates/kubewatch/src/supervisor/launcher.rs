use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::info;
use tracing::warn;

use super::SupervisorError;
use crate::config::WatchSettings;
use crate::domain::client_type::ClientType;
use crate::domain::cluster::ClusterRecord;
use crate::domain::workflow::WorkflowKind;
use crate::handlers::argocd;
use crate::handlers::system_executor;
use crate::handlers::system_executor::StageFilter;
use crate::handlers::velero;
use crate::handlers::workflow;
use crate::handlers::HandlerContext;
use crate::infrastructure::informer::InformerFactory;
use crate::infrastructure::k8s::probe;
use crate::infrastructure::k8s::KubePodLookup;
use crate::infrastructure::kube_client::KubeClientFactory;
use crate::infrastructure::metrics;
use crate::infrastructure::publisher::Publishers;

/// Builds and starts the informer factory for one client type on one cluster.
#[async_trait::async_trait]
pub trait InformerLauncher: Send + Sync {
    /// Returns `Ok(None)` when the cluster does not serve the resources the client needs.
    ///
    /// # Errors
    ///
    /// - [`SupervisorError::StartFailed`] if the cluster cannot be connected to
    async fn launch(
        &self,
        client: ClientType,
        record: &ClusterRecord,
    ) -> Result<Option<InformerFactory>, Report<SupervisorError>>;
}

/// Launches informers against real clusters.
pub struct KubeInformerLauncher {
    clients: KubeClientFactory,
    settings: WatchSettings,
    publishers: Publishers,
}

impl KubeInformerLauncher {
    pub fn new(clients: KubeClientFactory, settings: WatchSettings, publishers: Publishers) -> Self {
        Self {
            clients,
            settings,
            publishers,
        }
    }

    fn context(&self, client: ClientType, record: &ClusterRecord) -> HandlerContext {
        let publisher = match client {
            ClientType::ArgoWfCi | ClientType::ArgoWfCd | ClientType::SystemExec => {
                Arc::clone(&self.publishers.workflow)
            }
            _ => Arc::clone(&self.publishers.bus),
        };
        HandlerContext::new(record.labels(), publisher)
    }
}

#[async_trait::async_trait]
impl InformerLauncher for KubeInformerLauncher {
    #[tracing::instrument(skip(self, record), fields(cluster_id = record.id, cluster_name = %record.name))]
    async fn launch(
        &self,
        client: ClientType,
        record: &ClusterRecord,
    ) -> Result<Option<InformerFactory>, Report<SupervisorError>> {
        let labels = record.labels();
        if !record.error_in_connecting.is_empty() {
            metrics::record_unreachable_cluster(&labels);
            warn!(
                error = %record.error_in_connecting,
                "Cluster reported a connection error, starting informer anyway"
            );
        }

        let kube = self
            .clients
            .client_for(record)
            .await
            .inspect_err(|_| metrics::record_unregistered_informer(&labels, client.informer_name()))
            .change_context(SupervisorError::StartFailed {
                client,
                cluster_id: record.id,
            })?;

        if let Some(required) = client.required_resource() {
            match probe::serves_resource(&kube, required).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(
                        api_version = required.api_version,
                        plural = required.plural,
                        "Resource not served by cluster, skipping informer"
                    );
                    return Ok(None);
                }
                Err(e) => {
                    metrics::record_unreachable_cluster(&labels);
                    warn!("Capability check failed, starting informer anyway: {e:?}");
                }
            }
        }

        let namespace = self.settings.namespace(client);
        let ctx = self.context(client, record);
        let mut factory = InformerFactory::new(labels);
        match client {
            ClientType::ArgoCd => argocd::build_informer(&mut factory, kube, &namespace, ctx),
            ClientType::ArgoWfCi => {
                workflow::build_informer(&mut factory, WorkflowKind::Ci, kube, &namespace, ctx)
            }
            ClientType::ArgoWfCd => {
                workflow::build_informer(&mut factory, WorkflowKind::Cd, kube, &namespace, ctx)
            }
            ClientType::SystemExec => {
                let lookup = Arc::new(KubePodLookup::new(kube.clone()));
                let stages = StageFilter {
                    ci: self.settings.ci_enabled,
                    cd: self.settings.cd_enabled,
                };
                system_executor::build_informer(&mut factory, kube, &namespace, ctx, lookup, stages)
            }
            velero_client => {
                velero::build_informer_for(&mut factory, velero_client, kube, &namespace, ctx)
            }
        }
        factory.start();
        info!(namespace = ?namespace.as_namespace(), "Informer started");
        Ok(Some(factory))
    }
}
