use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;

use crate::domain::client_type::ClientType;
use crate::domain::cluster::ClusterRecord;
use crate::infrastructure::kube_client::TransportPolicy;

/// Which clusters an informer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ClusterScope {
    /// Every active cluster in the inventory, watching all namespaces.
    #[value(name = "ALL_CLUSTER")]
    AllCluster,
    /// Only the reserved default cluster, watching the configured namespace.
    #[default]
    #[value(name = "IN_CLUSTER")]
    InCluster,
}

/// Namespace an informer is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    All,
    Namespace(String),
}

impl NamespaceScope {
    fn from_optional(namespace: Option<&str>) -> Self {
        match namespace.map(str::trim) {
            Some(ns) if !ns.is_empty() => NamespaceScope::Namespace(ns.to_string()),
            _ => NamespaceScope::All,
        }
    }

    pub fn as_namespace(&self) -> Option<&str> {
        match self {
            NamespaceScope::All => None,
            NamespaceScope::Namespace(ns) => Some(ns),
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct WatchArgs {
    #[arg(
        long,
        env = "CLUSTER_ARGO_CD_TYPE",
        value_enum,
        default_value_t = ClusterScope::InCluster,
        help = "Clusters the ArgoCD application informer runs on"
    )]
    pub argocd_cluster_type: ClusterScope,

    #[arg(
        long,
        env = "CLUSTER_CI_ARGO_WF_TYPE",
        value_enum,
        default_value_t = ClusterScope::InCluster,
        help = "Clusters the CI workflow informer runs on"
    )]
    pub ci_workflow_cluster_type: ClusterScope,

    #[arg(
        long,
        env = "CLUSTER_CD_ARGO_WF_TYPE",
        value_enum,
        default_value_t = ClusterScope::InCluster,
        help = "Clusters the CD workflow informer runs on"
    )]
    pub cd_workflow_cluster_type: ClusterScope,

    #[arg(
        long,
        env = "CLUSTER_TYPE",
        value_enum,
        default_value_t = ClusterScope::InCluster,
        help = "Clusters the system executor and Velero informers run on"
    )]
    pub cluster_type: ClusterScope,

    #[arg(long, env = "ACD_INFORMER", default_value_t = true, action = clap::ArgAction::Set)]
    pub acd_informer: bool,

    #[arg(long, env = "CI_INFORMER", default_value_t = true, action = clap::ArgAction::Set)]
    pub ci_informer: bool,

    #[arg(long, env = "CD_INFORMER", default_value_t = true, action = clap::ArgAction::Set)]
    pub cd_informer: bool,

    #[arg(long, env = "VELERO_INFORMER", default_value_t = false, action = clap::ArgAction::Set)]
    pub velero_informer: bool,

    #[arg(
        long,
        env = "SYSTEM_EXECUTOR_INFORMER",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub system_executor_informer: bool,

    #[arg(long, env = "ACD_NAMESPACE", default_value = "devtroncd")]
    pub acd_namespace: String,

    #[arg(long, env = "DEFAULT_NAMESPACE", default_value = "devtron-ci")]
    pub ci_namespace: String,

    #[arg(long, env = "CD_DEFAULT_NAMESPACE", default_value = "devtron-cd")]
    pub cd_namespace: String,

    #[arg(long, env = "VELERO_NAMESPACE", default_value = "velero")]
    pub velero_namespace: String,

    #[arg(
        long,
        env = "CD_EXTERNAL_REST_LISTENER",
        default_value_t = false,
        action = clap::ArgAction::Set,
        help = "POST events to the orchestrator instead of the message bus"
    )]
    pub external_rest_listener: bool,

    #[arg(long, env = "CD_EXTERNAL_ORCHESTRATOR_TOKEN", default_value = "")]
    pub external_orchestrator_token: String,

    #[arg(
        long,
        env = "CD_EXTERNAL_LISTENER_URL",
        default_value = "http://devtroncd-orchestrator-service-prod.devtroncd:80/webhook/msg/nats"
    )]
    pub external_listener_url: String,

    #[arg(long, env = "CD_EXTERNAL_NAMESPACE")]
    pub external_namespace: Option<String>,

    #[arg(long, env = "NATS_SERVER_HOST", help = "Message bus url, e.g. nats://nats:4222")]
    pub nats_server_host: Option<String>,

    #[arg(long, env = "NATS_PUBLISH_TIMEOUT_SECS", default_value = "10")]
    pub nats_publish_timeout_secs: u64,

    #[arg(
        long,
        env = "CLUSTER_INVENTORY_PATH",
        value_hint = clap::ValueHint::FilePath,
        help = "YAML cluster inventory; without it only the default cluster is watched"
    )]
    pub cluster_inventory_path: Option<PathBuf>,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "ADMIN_LISTEN_ADDR",
        default_value = "0.0.0.0:8080",
        help = "Admin HTTP server listen address"
    )]
    pub admin_listen_addr: SocketAddr,

    #[arg(
        long,
        env = "SLEEP_TIMEOUT",
        default_value = "5",
        help = "Graceful shutdown deadline in seconds"
    )]
    pub sleep_timeout: u64,

    #[arg(long, env = "CACHE_SYNC_TIMEOUT_SECS", default_value = "60")]
    pub cache_sync_timeout_secs: u64,

    #[arg(long, env = "KUBE_CONNECT_TIMEOUT_SECS", default_value = "30")]
    pub kube_connect_timeout_secs: u64,

    #[arg(long, env = "KUBE_READ_TIMEOUT_SECS", default_value = "300")]
    pub kube_read_timeout_secs: u64,
}

impl WatchArgs {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.sleep_timeout)
    }

    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.nats_publish_timeout_secs)
    }

    pub fn transport_policy(&self) -> TransportPolicy {
        TransportPolicy {
            connect_timeout: Duration::from_secs(self.kube_connect_timeout_secs),
            read_timeout: Duration::from_secs(self.kube_read_timeout_secs),
        }
    }

    pub fn settings(&self) -> WatchSettings {
        WatchSettings {
            argocd_scope: self.argocd_cluster_type,
            ci_workflow_scope: self.ci_workflow_cluster_type,
            cd_workflow_scope: self.cd_workflow_cluster_type,
            cluster_scope: self.cluster_type,
            acd_enabled: self.acd_informer,
            ci_enabled: self.ci_informer,
            cd_enabled: self.cd_informer,
            velero_enabled: self.velero_informer,
            system_executor_enabled: self.system_executor_informer,
            acd_namespace: self.acd_namespace.clone(),
            ci_namespace: self.ci_namespace.clone(),
            cd_namespace: self.cd_namespace.clone(),
            velero_namespace: self.velero_namespace.clone(),
            external_namespace: self
                .external_rest_listener
                .then(|| self.external_namespace.clone().unwrap_or_default()),
        }
    }
}

/// Feature flags, scopes and namespaces that decide which informers a cluster gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub argocd_scope: ClusterScope,
    pub ci_workflow_scope: ClusterScope,
    pub cd_workflow_scope: ClusterScope,
    pub cluster_scope: ClusterScope,
    pub acd_enabled: bool,
    pub ci_enabled: bool,
    pub cd_enabled: bool,
    pub velero_enabled: bool,
    pub system_executor_enabled: bool,
    pub acd_namespace: String,
    pub ci_namespace: String,
    pub cd_namespace: String,
    pub velero_namespace: String,
    /// `Some` in external mode. An empty namespace means all namespaces.
    pub external_namespace: Option<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            argocd_scope: ClusterScope::InCluster,
            ci_workflow_scope: ClusterScope::InCluster,
            cd_workflow_scope: ClusterScope::InCluster,
            cluster_scope: ClusterScope::InCluster,
            acd_enabled: true,
            ci_enabled: true,
            cd_enabled: true,
            velero_enabled: false,
            system_executor_enabled: true,
            acd_namespace: "devtroncd".to_string(),
            ci_namespace: "devtron-ci".to_string(),
            cd_namespace: "devtron-cd".to_string(),
            velero_namespace: "velero".to_string(),
            external_namespace: None,
        }
    }
}

impl WatchSettings {
    /// Settings with every informer disabled; tests and callers switch on what they need.
    pub fn disabled() -> Self {
        Self {
            acd_enabled: false,
            ci_enabled: false,
            cd_enabled: false,
            velero_enabled: false,
            system_executor_enabled: false,
            ..Self::default()
        }
    }

    pub fn is_external(&self) -> bool {
        self.external_namespace.is_some()
    }

    pub fn enabled(&self, client: ClientType) -> bool {
        match client {
            ClientType::ArgoCd => self.acd_enabled,
            ClientType::ArgoWfCi => self.ci_enabled,
            ClientType::ArgoWfCd => self.cd_enabled,
            ClientType::SystemExec => {
                self.system_executor_enabled && (self.ci_enabled || self.cd_enabled)
            }
            _ => self.velero_enabled,
        }
    }

    pub fn scope(&self, client: ClientType) -> ClusterScope {
        match client {
            ClientType::ArgoCd => self.argocd_scope,
            ClientType::ArgoWfCi => self.ci_workflow_scope,
            ClientType::ArgoWfCd => self.cd_workflow_scope,
            _ => self.cluster_scope,
        }
    }

    /// Whether `client` is started on `record`.
    pub fn applies_to(&self, client: ClientType, record: &ClusterRecord) -> bool {
        self.enabled(client)
            && (self.scope(client) == ClusterScope::AllCluster || record.is_default())
    }

    /// Client types started on `record`, in [`ClientType::ALL`] order.
    pub fn applicable_clients(&self, record: &ClusterRecord) -> Vec<ClientType> {
        ClientType::ALL
            .into_iter()
            .filter(|client| self.applies_to(*client, record))
            .collect()
    }

    pub fn namespace(&self, client: ClientType) -> NamespaceScope {
        let workflow_client = matches!(
            client,
            ClientType::ArgoWfCi | ClientType::ArgoWfCd | ClientType::SystemExec
        );
        if let (true, Some(external)) = (workflow_client, &self.external_namespace) {
            return NamespaceScope::from_optional(Some(external));
        }
        if self.scope(client) == ClusterScope::AllCluster {
            return NamespaceScope::All;
        }
        match client {
            ClientType::ArgoCd => NamespaceScope::from_optional(Some(&self.acd_namespace)),
            ClientType::ArgoWfCi => NamespaceScope::from_optional(Some(&self.ci_namespace)),
            ClientType::ArgoWfCd => NamespaceScope::from_optional(Some(&self.cd_namespace)),
            // Executor pods of both kinds are selected by label across namespaces.
            ClientType::SystemExec => NamespaceScope::All,
            _ => NamespaceScope::from_optional(Some(&self.velero_namespace)),
        }
    }
}
