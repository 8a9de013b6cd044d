//! Cluster records and the read-only inventory port.

use core::error::Error;
use std::fmt;

use error_stack::Report;
use serde::Deserialize;
use serde::Serialize;

/// Name of the record describing the host cluster. It connects with the ambient
/// configuration instead of explicit credentials.
pub const DEFAULT_CLUSTER_NAME: &str = "default_cluster";

/// Id given to the synthesized default record when no inventory is configured.
pub const DEFAULT_CLUSTER_ID: i64 = 1;

/// PEM encoded TLS material of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsMaterial {
    #[serde(default)]
    pub ca_data: Option<String>,
    #[serde(default)]
    pub cert_data: Option<String>,
    #[serde(default)]
    pub key_data: Option<String>,
}

/// Identity and connection facts for a managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default)]
    pub tls: Option<TlsMaterial>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(default)]
    pub is_virtual: Option<bool>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Last connection error seen by the inventory owner, empty when healthy.
    #[serde(default)]
    pub error_in_connecting: String,
}

fn default_active() -> bool {
    true
}

impl ClusterRecord {
    /// The record synthesized for the host cluster when no inventory is configured.
    pub fn default_cluster() -> Self {
        Self {
            id: DEFAULT_CLUSTER_ID,
            name: DEFAULT_CLUSTER_NAME.to_string(),
            server_url: "https://kubernetes.default.svc".to_string(),
            bearer_token: String::new(),
            tls: None,
            insecure_skip_tls_verify: false,
            is_virtual: Some(false),
            active: true,
            error_in_connecting: String::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_CLUSTER_NAME
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual.unwrap_or(false)
    }

    /// Active, non-virtual records are the only ones informers are started for.
    pub fn is_watchable(&self) -> bool {
        self.active && !self.is_virtual()
    }

    pub fn labels(&self) -> ClusterLabels {
        ClusterLabels {
            cluster_name: self.name.clone(),
            cluster_id: self.id,
        }
    }
}

/// `(clusterName, clusterId)` pair attached to every per-cluster log line and metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterLabels {
    pub cluster_name: String,
    pub cluster_id: i64,
}

impl ClusterLabels {
    pub fn new(cluster_name: impl Into<String>, cluster_id: i64) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            cluster_id,
        }
    }
}

impl fmt::Display for ClusterLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.cluster_name, self.cluster_id)
    }
}

/// Errors raised by cluster inventory implementations.
#[derive(Debug, derive_more::Display)]
pub enum InventoryError {
    #[display("Failed to read cluster inventory {path}")]
    ReadFailed { path: String },
    #[display("Failed to parse cluster inventory {path}")]
    ParseFailed { path: String },
}

impl Error for InventoryError {}

/// Narrow read-only view over the cluster inventory.
///
/// Every query applies the watch filter (`active` and not virtual) except
/// [`ClusterRepository::find_inactive_by_id`], which is used on delete signals after the
/// owner already marked the record inactive. `Ok(None)` is a soft miss, never fatal.
#[async_trait::async_trait]
pub trait ClusterRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<ClusterRecord>, Report<InventoryError>>;

    async fn find_active_by_id(
        &self,
        id: i64,
    ) -> Result<Option<ClusterRecord>, Report<InventoryError>>;

    async fn find_inactive_by_id(
        &self,
        id: i64,
    ) -> Result<Option<ClusterRecord>, Report<InventoryError>>;

    async fn find_by_name(&self, name: &str)
        -> Result<Option<ClusterRecord>, Report<InventoryError>>;
}

/// Query helpers shared by the repository implementations.
pub(crate) mod query {
    use super::ClusterRecord;

    pub(crate) fn active(records: &[ClusterRecord]) -> Vec<ClusterRecord> {
        records
            .iter()
            .filter(|record| record.is_watchable())
            .cloned()
            .collect()
    }

    pub(crate) fn active_by_id(records: &[ClusterRecord], id: i64) -> Option<ClusterRecord> {
        records
            .iter()
            .find(|record| record.id == id && record.is_watchable())
            .cloned()
    }

    pub(crate) fn inactive_by_id(records: &[ClusterRecord], id: i64) -> Option<ClusterRecord> {
        records
            .iter()
            .find(|record| record.id == id && !record.active)
            .cloned()
    }

    pub(crate) fn by_name(records: &[ClusterRecord], name: &str) -> Option<ClusterRecord> {
        records
            .iter()
            .find(|record| record.name == name && record.is_watchable())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn record(id: i64, name: &str, active: bool, is_virtual: Option<bool>) -> ClusterRecord {
        ClusterRecord {
            id,
            name: name.to_string(),
            active,
            is_virtual,
            ..ClusterRecord::default_cluster()
        }
    }

    #[test]
    fn default_cluster_is_recognized_by_name() {
        let default = ClusterRecord::default_cluster();
        assert!(default.is_default());
        assert!(default.is_watchable());
        assert!(!record(2, "prod", true, None).is_default());
    }

    #[test]
    fn virtual_and_inactive_records_are_not_watchable() {
        assert!(record(2, "a", true, None).is_watchable());
        assert!(record(2, "a", true, Some(false)).is_watchable());
        assert!(!record(2, "a", true, Some(true)).is_watchable());
        assert!(!record(2, "a", false, None).is_watchable());
    }

    #[test]
    fn queries_apply_watch_filter() {
        let records = vec![
            record(1, "default_cluster", true, Some(false)),
            record(2, "virtual", true, Some(true)),
            record(3, "gone", false, None),
            record(4, "prod", true, None),
        ];

        let active: Vec<i64> = query::active(&records).iter().map(|r| r.id).collect();
        assert_eq!(active, vec![1, 4]);

        assert!(query::active_by_id(&records, 2).is_none());
        assert!(query::active_by_id(&records, 3).is_none());
        assert_eq!(query::active_by_id(&records, 4).map(|r| r.id), Some(4));

        assert_eq!(query::inactive_by_id(&records, 3).map(|r| r.id), Some(3));
        assert!(query::inactive_by_id(&records, 4).is_none());

        assert!(query::by_name(&records, "virtual").is_none());
        assert_eq!(query::by_name(&records, "prod").map(|r| r.id), Some(4));
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let record: ClusterRecord = serde_yaml::from_str(
            r#"
id: 7
name: prod
serverUrl: https://10.0.0.1:6443
bearerToken: abc
"#,
        )
        .expect("valid record");

        assert_eq!(record.id, 7);
        assert!(record.active);
        assert!(!record.insecure_skip_tls_verify);
        assert!(record.error_in_connecting.is_empty());
        assert_eq!(record.labels(), ClusterLabels::new("prod", 7));
        assert_eq!(record.labels().to_string(), "prod(7)");
    }
}
