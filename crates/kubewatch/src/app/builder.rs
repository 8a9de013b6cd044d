use std::sync::Arc;

use anyhow::Result;

use crate::app::Application;
use crate::app::ApplicationServices;
use crate::config::WatchArgs;
use crate::domain::cluster::ClusterRepository;
use crate::infrastructure::external_listener::ExternalListenerClient;
use crate::infrastructure::external_listener::ExternalListenerConfig;
use crate::infrastructure::inventory::FileClusterRepository;
use crate::infrastructure::inventory::StaticClusterRepository;
use crate::infrastructure::kube_client::KubeClientFactory;
use crate::infrastructure::publisher::NatsPublisher;
use crate::infrastructure::publisher::NullPublisher;
use crate::infrastructure::publisher::Publisher;
use crate::infrastructure::publisher::Publishers;
use crate::supervisor::ClusterSupervisor;
use crate::supervisor::KubeInformerLauncher;

/// Application builder
pub struct ApplicationBuilder {
    args: WatchArgs,
}

impl ApplicationBuilder {
    pub fn new(args: WatchArgs) -> Self {
        Self { args }
    }

    /// Build complete application
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let publishers = self.create_publishers().await?;
        let inventory = self.create_inventory();
        let kube_clients =
            KubeClientFactory::new(self.args.kubeconfig.clone(), self.args.transport_policy());

        let settings = self.args.settings();
        let launcher = Arc::new(KubeInformerLauncher::new(
            kube_clients.clone(),
            settings.clone(),
            publishers.clone(),
        ));
        let supervisor = Arc::new(ClusterSupervisor::new(
            inventory.clone(),
            settings,
            launcher,
            self.args.shutdown_timeout(),
        ));

        let services = ApplicationServices {
            supervisor,
            inventory,
            kube_clients,
            publishers,
        };
        Ok(Application::new(services, self.args))
    }

    /// Message bus if configured, plus the HTTP fallback in external mode.
    async fn create_publishers(&self) -> Result<Publishers> {
        let bus: Arc<dyn Publisher> = match &self.args.nats_server_host {
            Some(url) => Arc::new(
                NatsPublisher::connect(url, self.args.publish_timeout())
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to message bus: {e:?}"))?,
            ),
            None => {
                tracing::warn!("NATS_SERVER_HOST not set, message bus publishing is disabled");
                Arc::new(NullPublisher)
            }
        };

        let external = if self.args.external_rest_listener {
            let config = ExternalListenerConfig::new(
                self.args.external_listener_url.clone(),
                self.args.external_orchestrator_token.clone(),
            );
            let client = ExternalListenerClient::new(config)
                .map_err(|e| anyhow::anyhow!("Failed to create external listener client: {e:?}"))?;
            let client: Arc<dyn Publisher> = Arc::new(client);
            Some(client)
        } else {
            None
        };

        Ok(Publishers::new(bus, external))
    }

    /// External mode watches only the default cluster; otherwise the inventory file, if any.
    fn create_inventory(&self) -> Arc<dyn ClusterRepository> {
        match (&self.args.cluster_inventory_path, self.args.external_rest_listener) {
            (Some(path), false) => {
                tracing::info!(path = %path.display(), "Using file-backed cluster inventory");
                Arc::new(FileClusterRepository::new(path.clone()))
            }
            _ => Arc::new(StaticClusterRepository::default_only()),
        }
    }
}
