use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;
use serde_json::json;
use tracing::warn;

use crate::domain::cluster::ClusterLabels;
use crate::domain::cluster::ClusterRecord;
use crate::infrastructure::k8s::KubernetesError;
use crate::infrastructure::metrics;

/// Process-wide transport settings applied to every cluster config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPolicy {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(300),
        }
    }
}

impl TransportPolicy {
    pub fn customize(&self, config: &mut Config) {
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);
    }
}

/// Builds REST configs and clients for cluster records.
#[derive(Debug, Clone, Default)]
pub struct KubeClientFactory {
    kubeconfig: Option<PathBuf>,
    transport: TransportPolicy,
}

impl KubeClientFactory {
    /// `kubeconfig` overrides the ambient config used for the default cluster.
    pub fn new(kubeconfig: Option<PathBuf>, transport: TransportPolicy) -> Self {
        Self {
            kubeconfig,
            transport,
        }
    }

    /// REST config for `record`.
    ///
    /// The reserved default cluster uses the ambient config (the kubeconfig override, or
    /// in-cluster / `~/.kube/config` inference). Every other record is connected with its
    /// server URL, bearer token and, unless TLS verification is skipped, its TLS material.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::ConnectionFailed`] if the config cannot be loaded or built
    pub async fn rest_config(
        &self,
        record: &ClusterRecord,
    ) -> Result<Config, Report<KubernetesError>> {
        let mut config = if record.is_default() {
            self.ambient_config().await?
        } else {
            let kubeconfig = record_kubeconfig(record)?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .change_context(KubernetesError::ConnectionFailed {
                    message: format!("Failed to build config for cluster {}", record.name),
                })?
        };
        self.transport.customize(&mut config);
        Ok(config)
    }

    /// Typed client from a config. Failures count as an unreachable cluster.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::ConnectionFailed`] if the client cannot be created
    pub fn client(
        &self,
        config: Config,
        labels: &ClusterLabels,
    ) -> Result<Client, Report<KubernetesError>> {
        Client::try_from(config).map_err(|e| {
            metrics::record_unreachable_cluster(labels);
            warn!(cluster = %labels, "Failed to create Kubernetes client: {e}");
            Report::new(e).change_context(KubernetesError::ConnectionFailed {
                message: format!("Failed to create Kubernetes client for {labels}"),
            })
        })
    }

    /// Config and client for `record` in one step.
    pub async fn client_for(
        &self,
        record: &ClusterRecord,
    ) -> Result<Client, Report<KubernetesError>> {
        let labels = record.labels();
        let config = self.rest_config(record).await.inspect_err(|_| {
            metrics::record_unreachable_cluster(&labels);
        })?;
        self.client(config, &labels)
    }

    async fn ambient_config(&self) -> Result<Config, Report<KubernetesError>> {
        match &self.kubeconfig {
            Some(kubeconfig_path) => {
                let kubeconfig = Kubeconfig::read_from(kubeconfig_path).change_context(
                    KubernetesError::ConnectionFailed {
                        message: format!(
                            "Failed to read kubeconfig file: {}",
                            kubeconfig_path.display()
                        ),
                    },
                )?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .change_context(KubernetesError::ConnectionFailed {
                        message: format!(
                            "Failed to create config from kubeconfig: {}",
                            kubeconfig_path.display()
                        ),
                    })
            }
            None => Config::infer()
                .await
                .change_context(KubernetesError::ConnectionFailed {
                    message: "Failed to infer in-cluster or local config".to_string(),
                }),
        }
    }
}

/// Kubeconfig with a single context describing `record`.
fn record_kubeconfig(record: &ClusterRecord) -> Result<Kubeconfig, Report<KubernetesError>> {
    let mut cluster = json!({ "server": record.server_url });
    let mut user = json!({ "token": record.bearer_token });

    if record.insecure_skip_tls_verify {
        cluster["insecure-skip-tls-verify"] = json!(true);
    } else if let Some(tls) = &record.tls {
        if let Some(ca) = non_empty(&tls.ca_data) {
            cluster["certificate-authority-data"] = json!(STANDARD.encode(ca));
        }
        if let Some(cert) = non_empty(&tls.cert_data) {
            user["client-certificate-data"] = json!(STANDARD.encode(cert));
        }
        if let Some(key) = non_empty(&tls.key_data) {
            user["client-key-data"] = json!(STANDARD.encode(key));
        }
    }

    let name = record.name.as_str();
    let kubeconfig = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": name, "cluster": cluster }],
        "users": [{ "name": name, "user": user }],
        "contexts": [{ "name": name, "context": { "cluster": name, "user": name } }],
        "current-context": name,
    });

    serde_json::from_value(kubeconfig).change_context(KubernetesError::ConnectionFailed {
        message: format!("Invalid connection settings for cluster {}", record.name),
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::cluster::TlsMaterial;

    fn remote(insecure: bool) -> ClusterRecord {
        ClusterRecord {
            id: 7,
            name: "prod".to_string(),
            server_url: "https://10.0.0.7:6443".to_string(),
            bearer_token: "token-7".to_string(),
            tls: Some(TlsMaterial {
                ca_data: Some("ca-pem".to_string()),
                cert_data: Some("cert-pem".to_string()),
                key_data: None,
            }),
            insecure_skip_tls_verify: insecure,
            ..ClusterRecord::default_cluster()
        }
    }

    #[test]
    fn kubeconfig_carries_tls_material_when_verifying() {
        let kubeconfig = record_kubeconfig(&remote(false)).expect("valid");

        let cluster = kubeconfig.clusters[0].cluster.as_ref().expect("cluster");
        assert_eq!(cluster.server.as_deref(), Some("https://10.0.0.7:6443"));
        assert_eq!(
            cluster.certificate_authority_data.as_deref(),
            Some(STANDARD.encode("ca-pem").as_str())
        );
        assert_eq!(cluster.insecure_skip_tls_verify, None);

        let user = kubeconfig.auth_infos[0].auth_info.as_ref().expect("user");
        assert_eq!(
            user.client_certificate_data.as_deref(),
            Some(STANDARD.encode("cert-pem").as_str())
        );
        assert_eq!(kubeconfig.current_context.as_deref(), Some("prod"));
    }

    #[test]
    fn kubeconfig_skips_tls_material_when_insecure() {
        let kubeconfig = record_kubeconfig(&remote(true)).expect("valid");

        let cluster = kubeconfig.clusters[0].cluster.as_ref().expect("cluster");
        assert_eq!(cluster.insecure_skip_tls_verify, Some(true));
        assert_eq!(cluster.certificate_authority_data, None);
        let user = kubeconfig.auth_infos[0].auth_info.as_ref().expect("user");
        assert_eq!(user.client_certificate_data, None);
    }

    #[test(tokio::test)]
    async fn remote_config_applies_transport_policy() {
        let policy = TransportPolicy {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(9),
        };
        let factory = KubeClientFactory::new(None, policy);

        let config = factory.rest_config(&remote(true)).await.expect("config");

        assert_eq!(config.cluster_url.to_string(), "https://10.0.0.7:6443/");
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(9)));
        assert!(config.accept_invalid_certs);
    }
}
