//! Custom resources watched by kubewatch.
//!
//! Only the fields used for change detection are typed. Everything else is kept in the
//! `extra` maps so the objects can be forwarded unchanged.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::NamespaceResourceScope;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

macro_rules! namespaced_resource {
    ($ty:ty, $group:literal, $version:literal, $kind:literal, $plural:literal) => {
        impl kube::Resource for $ty {
            type DynamicType = ();
            type Scope = NamespaceResourceScope;

            fn group(_dt: &()) -> std::borrow::Cow<'_, str> {
                $group.into()
            }

            fn version(_dt: &()) -> std::borrow::Cow<'_, str> {
                $version.into()
            }

            fn kind(_dt: &()) -> std::borrow::Cow<'_, str> {
                $kind.into()
            }

            fn plural(_dt: &()) -> std::borrow::Cow<'_, str> {
                $plural.into()
            }

            fn meta(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

/// ArgoCD `Application`, forwarded as-is on the application topics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    /// `apiVersion`, `kind`, `spec`, `operation` and anything else the API returns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

namespaced_resource!(Application, "argoproj.io", "v1alpha1", "Application", "applications");

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_state: Option<OperationState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<RevisionHistory>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_result: Option<SyncOperationResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionHistory {
    pub id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Application {
    pub fn sync_revision(&self) -> Option<&str> {
        self.status.as_ref()?.sync.as_ref()?.revision.as_deref()
    }

    pub fn operation_revision(&self) -> Option<&str> {
        self.sync_result()?.revision.as_deref()
    }

    pub fn health_status(&self) -> Option<&str> {
        self.status.as_ref()?.health.as_ref()?.status.as_deref()
    }

    pub fn operation_phase(&self) -> Option<&str> {
        self.status.as_ref()?.operation_state.as_ref()?.phase.as_deref()
    }

    pub fn synced_resource_count(&self) -> usize {
        self.sync_result().map_or(0, |r| r.resources.len())
    }

    pub fn history(&self) -> &[RevisionHistory] {
        self.status.as_ref().map_or(&[], |s| s.history.as_slice())
    }

    fn sync_result(&self) -> Option<&SyncOperationResult> {
        self.status.as_ref()?.operation_state.as_ref()?.sync_result.as_ref()
    }
}

/// Velero `Backup`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: BackupStatus,
}

namespaced_resource!(Backup, "velero.io", "v1", "Backup", "backups");

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<BackupProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgress {
    #[serde(default)]
    pub total_items: i64,
    #[serde(default)]
    pub items_backed_up: i64,
}

/// Velero `Restore`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Restore {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RestoreSpec,
    #[serde(default)]
    pub status: RestoreStatus,
}

namespaced_resource!(Restore, "velero.io", "v1", "Restore", "restores");

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<RestoreProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreProgress {
    #[serde(default)]
    pub total_items: i64,
    #[serde(default)]
    pub items_restored: i64,
}

/// Velero `BackupStorageLocation`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageLocation {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: BackupStorageLocationSpec,
    #[serde(default)]
    pub status: BackupStorageLocationStatus,
}

namespaced_resource!(
    BackupStorageLocation,
    "velero.io",
    "v1",
    "BackupStorageLocation",
    "backupstoragelocations"
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageLocationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageLocationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validation_time: Option<String>,
}

/// Velero `VolumeSnapshotLocation`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotLocation {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VolumeSnapshotLocationSpec,
}

namespaced_resource!(
    VolumeSnapshotLocation,
    "velero.io",
    "v1",
    "VolumeSnapshotLocation",
    "volumesnapshotlocations"
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotLocationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Velero `Schedule`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ScheduleSpec,
    #[serde(default)]
    pub status: ScheduleStatus,
}

namespaced_resource!(Schedule, "velero.io", "v1", "Schedule", "schedules");

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use kube::Resource;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn application_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "app", "namespace": "devtroncd"},
            "spec": {"project": "default"},
            "status": {
                "sync": {"status": "Synced", "revision": "abc"},
                "health": {"status": "Healthy"},
                "operationState": {
                    "phase": "Succeeded",
                    "syncResult": {"revision": "abc", "resources": [{"kind": "Deployment"}]}
                },
                "history": [{"id": 3, "revision": "abc"}],
                "reconciledAt": "2024-05-01T12:00:00Z"
            }
        });

        let app: Application = serde_json::from_value(raw.clone()).expect("valid application");

        assert_eq!(app.sync_revision(), Some("abc"));
        assert_eq!(app.operation_revision(), Some("abc"));
        assert_eq!(app.health_status(), Some("Healthy"));
        assert_eq!(app.operation_phase(), Some("Succeeded"));
        assert_eq!(app.synced_resource_count(), 1);
        assert_eq!(app.history().last().map(|h| h.id), Some(3));
        assert_eq!(serde_json::to_value(&app).expect("serializable"), raw);
    }

    #[test]
    fn resource_coordinates() {
        assert_eq!(Application::plural(&()), "applications");
        assert_eq!(Application::api_version(&()), "argoproj.io/v1alpha1");
        assert_eq!(BackupStorageLocation::plural(&()), "backupstoragelocations");
        assert_eq!(Schedule::api_version(&()), "velero.io/v1");
    }
}
