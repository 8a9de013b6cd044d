//! Cluster inventory backends.

use std::path::PathBuf;
use std::sync::RwLock;

use error_stack::Report;
use error_stack::ResultExt;

use crate::domain::cluster::query;
use crate::domain::cluster::ClusterRecord;
use crate::domain::cluster::ClusterRepository;
use crate::domain::cluster::InventoryError;

/// Inventory stored as a YAML list of cluster records.
///
/// The file is re-read on every query so that edits made by the inventory owner are seen
/// by the next control signal.
#[derive(Debug, Clone)]
pub struct FileClusterRepository {
    path: PathBuf,
}

impl FileClusterRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<ClusterRecord>, Report<InventoryError>> {
        let path = self.path.display().to_string();
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .change_context_lazy(|| InventoryError::ReadFailed { path: path.clone() })?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_yaml::from_str(&raw).change_context(InventoryError::ParseFailed { path })
    }
}

#[async_trait::async_trait]
impl ClusterRepository for FileClusterRepository {
    async fn list_active(&self) -> Result<Vec<ClusterRecord>, Report<InventoryError>> {
        Ok(query::active(&self.load().await?))
    }

    async fn find_active_by_id(
        &self,
        id: i64,
    ) -> Result<Option<ClusterRecord>, Report<InventoryError>> {
        Ok(query::active_by_id(&self.load().await?, id))
    }

    async fn find_inactive_by_id(
        &self,
        id: i64,
    ) -> Result<Option<ClusterRecord>, Report<InventoryError>> {
        Ok(query::inactive_by_id(&self.load().await?, id))
    }

    async fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ClusterRecord>, Report<InventoryError>> {
        Ok(query::by_name(&self.load().await?, name))
    }
}

/// In-memory inventory. Serves the synthesized default record when no inventory is
/// configured.
#[derive(Debug, Default)]
pub struct StaticClusterRepository {
    records: RwLock<Vec<ClusterRecord>>,
}

impl StaticClusterRepository {
    pub fn new(records: Vec<ClusterRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn default_only() -> Self {
        Self::new(vec![ClusterRecord::default_cluster()])
    }

    /// Inserts or replaces the record with the same id.
    pub fn upsert(&self, record: ClusterRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    fn snapshot(&self) -> Vec<ClusterRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl ClusterRepository for StaticClusterRepository {
    async fn list_active(&self) -> Result<Vec<ClusterRecord>, Report<InventoryError>> {
        Ok(query::active(&self.snapshot()))
    }

    async fn find_active_by_id(
        &self,
        id: i64,
    ) -> Result<Option<ClusterRecord>, Report<InventoryError>> {
        Ok(query::active_by_id(&self.snapshot(), id))
    }

    async fn find_inactive_by_id(
        &self,
        id: i64,
    ) -> Result<Option<ClusterRecord>, Report<InventoryError>> {
        Ok(query::inactive_by_id(&self.snapshot(), id))
    }

    async fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ClusterRecord>, Report<InventoryError>> {
        Ok(query::by_name(&self.snapshot(), name))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use similar_asserts::assert_eq;
    use tempfile::NamedTempFile;
    use test_log::test;

    use super::*;

    const INVENTORY: &str = r#"
- id: 1
  name: default_cluster
- id: 7
  name: prod
  serverUrl: https://10.0.0.7:6443
  bearerToken: token
  tls:
    caData: "-----BEGIN CERTIFICATE-----"
- id: 8
  name: retired
  serverUrl: https://10.0.0.8:6443
  active: false
- id: 9
  name: vcluster
  isVirtual: true
"#;

    fn inventory_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write inventory");
        file
    }

    #[test(tokio::test)]
    async fn file_repository_applies_watch_filter() {
        let file = inventory_file(INVENTORY);
        let repo = FileClusterRepository::new(file.path());

        let active: Vec<i64> = repo
            .list_active()
            .await
            .expect("readable")
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(active, vec![1, 7]);

        let prod = repo.find_active_by_id(7).await.expect("readable").expect("found");
        assert_eq!(prod.server_url, "https://10.0.0.7:6443");
        assert!(repo.find_active_by_id(8).await.expect("readable").is_none());
        assert_eq!(
            repo.find_inactive_by_id(8).await.expect("readable").map(|r| r.name),
            Some("retired".to_string())
        );
        assert!(repo.find_by_name("vcluster").await.expect("readable").is_none());
    }

    #[test(tokio::test)]
    async fn file_repository_sees_edits_without_restart() {
        let mut file = inventory_file("- id: 7\n  name: prod\n");
        let repo = FileClusterRepository::new(file.path());
        assert!(repo.find_active_by_id(7).await.expect("readable").is_some());

        file.as_file_mut().set_len(0).expect("truncate");
        std::fs::write(file.path(), "- id: 7\n  name: prod\n  active: false\n").expect("rewrite");

        assert!(repo.find_active_by_id(7).await.expect("readable").is_none());
        assert!(repo.find_inactive_by_id(7).await.expect("readable").is_some());
    }

    #[test(tokio::test)]
    async fn file_repository_reports_missing_and_malformed_files() {
        let missing = FileClusterRepository::new("/nonexistent/kubewatch/clusters.yaml");
        let err = missing.list_active().await.expect_err("missing file");
        assert!(matches!(err.current_context(), InventoryError::ReadFailed { .. }));

        let file = inventory_file("not: [a, list");
        let malformed = FileClusterRepository::new(file.path());
        let err = malformed.list_active().await.expect_err("malformed file");
        assert!(matches!(err.current_context(), InventoryError::ParseFailed { .. }));
    }

    #[test(tokio::test)]
    async fn static_repository_upserts() {
        let repo = StaticClusterRepository::default_only();
        assert_eq!(repo.list_active().await.expect("infallible").len(), 1);

        repo.upsert(ClusterRecord {
            id: 7,
            name: "prod".to_string(),
            ..ClusterRecord::default_cluster()
        });
        repo.upsert(ClusterRecord {
            id: 7,
            name: "prod".to_string(),
            active: false,
            ..ClusterRecord::default_cluster()
        });

        assert!(repo.find_active_by_id(7).await.expect("infallible").is_none());
        assert!(repo.find_inactive_by_id(7).await.expect("infallible").is_some());
    }
}
