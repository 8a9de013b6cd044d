use std::collections::BTreeMap;

use api_types::topics;
use api_types::NodeOutputs;
use api_types::NodePhase;
use api_types::NodeStatusEntry;
use api_types::WorkflowStatusEvent;
use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;
use tracing::warn;

use super::reducer::derive_node_status;
use super::reducer::DerivedNodeStatus;
use super::reducer::PodEventKind;
use crate::infrastructure::k8s::KubernetesError;

pub const WORKFLOW_TYPE_LABEL: &str = "workflowType";
pub const WORKFLOW_TEMPLATE_LABEL: &str = "workflowTemplate";
pub const POD_DELETED_MESSAGE: &str = "pod deleted";

/// Messages a node carries when its pod may simply have been scaled down or collected.
const RECHECK_MESSAGES: [&str; 2] = ["Error (exit code 143)", "PodGC: node no longer exists"];

const NODE_TYPE_POD: &str = "Pod";

/// Live pod lookup used to tell a deleted pod apart from a failed one.
#[async_trait::async_trait]
pub trait PodLookup: Send + Sync {
    /// Fetches the pod, `Ok(None)` when it no longer exists.
    async fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Pod>, Report<KubernetesError>>;
}

/// Workflow stage a system-executor pod belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    Ci,
    Cd,
}

impl WorkflowKind {
    pub fn of(pod: &Pod) -> Option<Self> {
        let label = pod
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(WORKFLOW_TYPE_LABEL))?;
        match label.as_str() {
            "ci" => Some(WorkflowKind::Ci),
            "cd" => Some(WorkflowKind::Cd),
            _ => None,
        }
    }

    pub fn topic(self) -> &'static str {
        match self {
            WorkflowKind::Ci => topics::WORKFLOW_STATUS_UPDATE,
            WorkflowKind::Cd => topics::CD_WORKFLOW_STATUS_UPDATE,
        }
    }
}

/// A status event ready to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodEmission {
    pub kind: WorkflowKind,
    pub event: WorkflowStatusEvent,
}

impl PodEmission {
    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }
}

/// Whether a delete event has to be confirmed against the live object before emitting.
pub fn needs_delete_recheck(status: &DerivedNodeStatus) -> bool {
    matches!(status.phase, NodePhase::Failed | NodePhase::Error)
        && RECHECK_MESSAGES.contains(&status.message.as_str())
}

/// Turns one pod event into at most one workflow status emission.
///
/// `lookup` is consulted only on delete events whose derived status looks like a
/// termination signal; the lookup result decides whether the pod was removed on purpose.
pub async fn reduce_pod_event(
    pod: &Pod,
    kind: PodEventKind,
    now: DateTime<Utc>,
    lookup: &dyn PodLookup,
) -> Option<PodEmission> {
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    let Some(workflow_kind) = WorkflowKind::of(pod) else {
        warn!(pod = name, "Pod has no known workflowType label, dropping event");
        return None;
    };

    let status = derive_node_status(pod, kind, now);
    settle_status(pod, workflow_kind, kind, status, lookup).await
}

/// Applies the emission rules to an already derived status.
pub async fn settle_status(
    pod: &Pod,
    workflow_kind: WorkflowKind,
    kind: PodEventKind,
    mut status: DerivedNodeStatus,
    lookup: &dyn PodLookup,
) -> Option<PodEmission> {
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    match kind {
        PodEventKind::Update => {
            if status.phase == NodePhase::Failed && status.message.is_empty() {
                debug!(pod = name, "Failed without a reason yet, waiting for a later update");
                return None;
            }
        }
        PodEventKind::Delete => {
            if needs_delete_recheck(&status) {
                if !confirm_deleted(pod, lookup).await {
                    return None;
                }
                status.message = POD_DELETED_MESSAGE.to_string();
            }
        }
    }

    Some(PodEmission {
        kind: workflow_kind,
        event: build_status_event(pod, &status),
    })
}

async fn confirm_deleted(pod: &Pod, lookup: &dyn PodLookup) -> bool {
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    match lookup.get_pod(namespace, name).await {
        Ok(None) => true,
        Ok(Some(live)) => {
            let deleting = live.metadata.deletion_timestamp.is_some();
            if !deleting {
                debug!(pod = name, namespace, "Pod still exists, dropping delete event");
            }
            deleting
        }
        Err(e) => {
            warn!(pod = name, namespace, "Pod lookup failed, dropping delete event: {e:?}");
            false
        }
    }
}

/// Builds the single-node workflow status for a pod.
pub fn build_status_event(pod: &Pod, status: &DerivedNodeStatus) -> WorkflowStatusEvent {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let template_name = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(WORKFLOW_TEMPLATE_LABEL))
        .cloned()
        .unwrap_or_else(|| name.clone());
    let boundary_id = pod
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|owner| owner.kind == "Job")
        .map(|owner| owner.name.clone())
        .unwrap_or_else(|| name.clone());

    let node = NodeStatusEntry {
        id: name.clone(),
        name: name.clone(),
        display_name: name.clone(),
        template_name,
        boundary_id,
        node_type: NODE_TYPE_POD.to_string(),
        phase: status.phase,
        message: status.message.clone(),
        pod_ip: status.pod_ip.clone(),
        host_node_name: status.host_node_name.clone(),
        progress: status.progress.to_string(),
        outputs: status.exit_code.map(|code| NodeOutputs {
            exit_code: Some(code.to_string()),
        }),
        finished_at: status.finished_at,
    };

    let phase = status.phase.workflow_phase();
    WorkflowStatusEvent {
        phase,
        message: status.message.clone(),
        finished_at: if phase.is_completed() {
            status.finished_at
        } else {
            None
        },
        nodes: BTreeMap::from([(name, node)]),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use error_stack::Report;
    use k8s_openapi::api::core::v1::Pod;

    use super::PodLookup;
    use crate::infrastructure::k8s::KubernetesError;

    /// Returns a fixed answer and records every lookup.
    pub(crate) struct ScriptedLookup {
        pub(crate) answer: Option<Pod>,
        pub(crate) fail: bool,
        pub(crate) calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedLookup {
        pub(crate) fn returning(answer: Option<Pod>) -> Self {
            Self {
                answer,
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                answer: None,
                fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().expect("lock").len()
        }
    }

    #[async_trait::async_trait]
    impl PodLookup for ScriptedLookup {
        async fn get_pod(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<Pod>, Report<KubernetesError>> {
            self.calls
                .lock()
                .expect("lock")
                .push((namespace.to_string(), name.to_string()));
            if self.fail {
                return Err(Report::new(KubernetesError::PodLookupFailed {
                    pod_name: name.to_string(),
                    namespace: namespace.to_string(),
                }));
            }
            Ok(self.answer.clone())
        }
    }
}
