//! Shared API type definitions
//!
//! This crate contains the outbound event payloads published by kubewatch, together
//! with the message-bus topic names they are published on. Consumers of the bus can
//! depend on this crate alone to decode what kubewatch emits.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Message-bus topics.
pub mod topics {
    pub const APPLICATION_STATUS_UPDATE: &str = "APPLICATION_STATUS_UPDATE";
    pub const APPLICATION_STATUS_DELETE: &str = "APPLICATION_STATUS_DELETE";
    /// Workflow status of CI stages.
    pub const WORKFLOW_STATUS_UPDATE: &str = "WORKFLOW_STATUS_UPDATE";
    /// Workflow status of CD stages.
    pub const CD_WORKFLOW_STATUS_UPDATE: &str = "CD_WORKFLOW_STATUS_UPDATE";
    pub const STORAGE_MODULE: &str = "STORAGE_MODULE";
}

/// Phase of a single workflow node, mirroring the Argo node phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodePhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Error,
}

impl NodePhase {
    /// Whether the node reached a terminal phase.
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            NodePhase::Succeeded | NodePhase::Failed | NodePhase::Error
        )
    }

    /// Phase reported for the whole workflow when this node is its only node.
    ///
    /// A pending pod already belongs to a running workflow.
    pub fn workflow_phase(self) -> NodePhase {
        match self {
            NodePhase::Pending => NodePhase::Running,
            other => other,
        }
    }
}

impl std::fmt::Display for NodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Outputs recorded for a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutputs {
    /// Exit code of the main container, as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<String>,
}

/// One node of a [`WorkflowStatusEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusEntry {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub template_name: String,
    /// Name of the owning Job, or the pod name when the pod has no Job owner.
    pub boundary_id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub phase: NodePhase,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "podIP", default, skip_serializing_if = "Option::is_none")]
    pub pod_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_node_name: Option<String>,
    /// Progress in `N/M` form.
    pub progress: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<NodeOutputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Argo-style workflow status derived from a single executor pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusEvent {
    pub phase: NodePhase,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Keyed by pod name.
    pub nodes: BTreeMap<String, NodeStatusEntry>,
}

/// ArgoCD application change, published on the application status topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationChangeEvent<A> {
    pub application: A,
    pub status_time: DateTime<Utc>,
    pub cluster_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VeleroEventType {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VeleroResourceKind {
    BackupStorageLocation,
    VolumeSnapshotLocation,
    Backup,
    Restore,
    Schedule,
}

impl std::fmt::Display for VeleroResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Change of a Velero resource, published on [`topics::STORAGE_MODULE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VeleroChangeEvent {
    pub event_type: VeleroEventType,
    pub resource_kind: VeleroResourceKind,
    pub cluster_id: i64,
    pub resource_name: String,
    /// Kind-specific status projection; absent on deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
