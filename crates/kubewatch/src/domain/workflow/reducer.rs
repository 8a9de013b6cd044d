//! Pod snapshot to node status classification.
//!
//! Everything here is pure: the caller supplies the pod, the event kind and the clock.

use std::fmt;
use std::str::FromStr;

use api_types::NodePhase;
use chrono::DateTime;
use chrono::Utc;
use k8s_openapi::api::core::v1::ContainerStatus;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodStatus;

pub const MAIN_CONTAINER: &str = "main";
pub const WAIT_CONTAINER: &str = "wait";
pub const PROGRESS_ANNOTATION: &str = "workflows.argoproj.io/progress";

const SIGKILL_EXIT_CODE: i32 = 137;
const SIGTERM_EXIT_CODE: i32 = 143;

/// Which informer callback produced the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodEventKind {
    Update,
    Delete,
}

/// `N/M` progress of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: i64,
    pub total: i64,
}

impl Default for Progress {
    fn default() -> Self {
        Self { done: 0, total: 1 }
    }
}

impl Progress {
    fn is_valid(self) -> bool {
        self.done >= 0 && self.total > 0 && self.done <= self.total
    }
}

impl FromStr for Progress {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (done, total) = value.split_once('/').ok_or(())?;
        let progress = Progress {
            done: done.trim().parse().map_err(|_| ())?,
            total: total.trim().parse().map_err(|_| ())?,
        };
        progress.is_valid().then_some(progress).ok_or(())
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.done, self.total)
    }
}

/// Status of the single node a system-executor pod stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedNodeStatus {
    pub phase: NodePhase,
    pub message: String,
    pub pod_ip: Option<String>,
    pub host_node_name: Option<String>,
    pub progress: Progress,
    pub exit_code: Option<i32>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Classifies a pod snapshot into a node status.
pub fn derive_node_status(pod: &Pod, kind: PodEventKind, now: DateTime<Utc>) -> DerivedNodeStatus {
    let default_status = PodStatus::default();
    let status = pod.status.as_ref().unwrap_or(&default_status);
    let phase = status.phase.as_deref().unwrap_or_default();

    let (node_phase, message) = match phase {
        "Pending" => (NodePhase::Pending, pending_message(status)),
        "Running" => (NodePhase::Running, String::new()),
        "Succeeded" => (NodePhase::Succeeded, String::new()),
        "Failed" => infer_failed_reason(pod, kind),
        other => (
            NodePhase::Error,
            format!(
                "Unexpected pod phase for {}: {other}",
                pod.metadata.name.as_deref().unwrap_or_default()
            ),
        ),
    };

    let completed = node_phase.is_completed();
    let pod_ip = if !completed && is_daemoned(status) {
        status.pod_ip.clone()
    } else {
        None
    };

    DerivedNodeStatus {
        phase: node_phase,
        message,
        pod_ip,
        host_node_name: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
        progress: progress(pod),
        exit_code: main_exit_code(status),
        finished_at: completed.then(|| finished_at(status, now)),
    }
}

fn pending_message(status: &PodStatus) -> String {
    let waiting = containers(status)
        .find_map(|c| c.state.as_ref().and_then(|s| s.waiting.as_ref()));
    if let Some(waiting) = waiting {
        let reason = waiting.reason.as_deref().unwrap_or_default();
        return match waiting.message.as_deref() {
            Some(message) if !message.is_empty() => format!("{reason}: {message}"),
            _ => reason.to_string(),
        };
    }

    status
        .conditions
        .iter()
        .flatten()
        .find(|c| c.reason.as_deref() == Some("Unschedulable"))
        .map(|c| format!("Unschedulable: {}", c.message.as_deref().unwrap_or_default()))
        .unwrap_or_default()
}

/// Failure classification ordering: init containers first, then main, wait, sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ContainerRole {
    Init,
    Main,
    Wait,
    Sidecar,
}

/// Decides the phase and message of a pod in the `Failed` phase.
pub fn infer_failed_reason(pod: &Pod, kind: PodEventKind) -> (NodePhase, String) {
    let default_status = PodStatus::default();
    let status = pod.status.as_ref().unwrap_or(&default_status);

    if let Some(message) = status.message.as_deref().filter(|m| !m.is_empty()) {
        return (NodePhase::Failed, message.to_string());
    }

    let mut ordered: Vec<(ContainerRole, &ContainerStatus)> = status
        .init_container_statuses
        .iter()
        .flatten()
        .map(|c| (ContainerRole::Init, c))
        .chain(status.container_statuses.iter().flatten().map(|c| {
            let role = match c.name.as_str() {
                MAIN_CONTAINER => ContainerRole::Main,
                WAIT_CONTAINER => ContainerRole::Wait,
                _ => ContainerRole::Sidecar,
            };
            (role, c)
        }))
        .collect();
    ordered.sort_by_key(|(role, _)| *role);

    // The kubelet may report Failed while main is still running when the pod is torn down.
    let main_running = ordered.iter().any(|(role, c)| {
        *role == ContainerRole::Main && c.state.as_ref().is_some_and(|s| s.running.is_some())
    });
    if kind == PodEventKind::Delete && main_running {
        let message = status
            .conditions
            .iter()
            .flatten()
            .find_map(|c| c.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| "failed".to_string());
        return (NodePhase::Failed, message);
    }

    for (role, container) in ordered {
        let Some(state) = container.state.as_ref() else {
            continue;
        };
        let Some(terminated) = state.terminated.as_ref() else {
            if let Some(waiting) = state.waiting.as_ref() {
                return (
                    NodePhase::Error,
                    format!(
                        "Pod failed before {} container starts due to {}: {}",
                        container.name,
                        waiting.reason.as_deref().unwrap_or_default(),
                        waiting.message.as_deref().unwrap_or_default()
                    ),
                );
            }
            continue;
        };

        if terminated.exit_code == 0 {
            continue;
        }

        let reason = terminated
            .reason
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or("Error");
        let mut message = format!("{reason} (exit code {})", terminated.exit_code);
        if let Some(detail) = terminated.message.as_deref().filter(|m| !m.is_empty()) {
            message.push_str(": ");
            message.push_str(detail);
        }

        match role {
            ContainerRole::Init | ContainerRole::Wait => return (NodePhase::Error, message),
            ContainerRole::Main => return (NodePhase::Failed, message),
            ContainerRole::Sidecar => {
                if matches!(terminated.exit_code, SIGKILL_EXIT_CODE | SIGTERM_EXIT_CODE) {
                    continue;
                }
                return (NodePhase::Failed, message);
            }
        }
    }

    (NodePhase::Succeeded, String::new())
}

fn containers(status: &PodStatus) -> impl Iterator<Item = &ContainerStatus> {
    status
        .init_container_statuses
        .iter()
        .flatten()
        .chain(status.container_statuses.iter().flatten())
}

/// A pod serving traffic (Ready) is treated as a daemon whose address is reported.
fn is_daemoned(status: &PodStatus) -> bool {
    status
        .conditions
        .iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

fn progress(pod: &Pod) -> Progress {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(PROGRESS_ANNOTATION))
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

fn main_exit_code(status: &PodStatus) -> Option<i32> {
    status
        .container_statuses
        .iter()
        .flatten()
        .find(|c| c.name == MAIN_CONTAINER)
        .and_then(|c| c.state.as_ref())
        .and_then(|s| s.terminated.as_ref())
        .map(|t| t.exit_code)
}

fn finished_at(status: &PodStatus, now: DateTime<Utc>) -> DateTime<Utc> {
    let any_running = containers(status).any(|c| c.state.as_ref().is_some_and(|s| s.running.is_some()));
    if any_running {
        return now;
    }
    containers(status)
        .filter_map(|c| c.state.as_ref())
        .filter_map(|s| s.terminated.as_ref())
        .filter_map(|t| t.finished_at.as_ref())
        .map(|t| t.0)
        .max()
        .unwrap_or(now)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use chrono::DateTime;
    use chrono::Utc;
    use k8s_openapi::api::core::v1::ContainerState;
    use k8s_openapi::api::core::v1::ContainerStateRunning;
    use k8s_openapi::api::core::v1::ContainerStateTerminated;
    use k8s_openapi::api::core::v1::ContainerStateWaiting;
    use k8s_openapi::api::core::v1::ContainerStatus;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::api::core::v1::PodCondition;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    pub(crate) fn executor_pod(name: &str, workflow_type: &str, phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("devtron-cd".to_string()),
                resource_version: Some("1".to_string()),
                labels: Some(BTreeMap::from([(
                    "workflowType".to_string(),
                    workflow_type.to_string(),
                )])),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    pub(crate) fn terminated(name: &str, exit_code: i32, reason: &str, message: &str) -> ContainerStatus {
        terminated_at(name, exit_code, reason, message, None)
    }

    pub(crate) fn terminated_at(
        name: &str,
        exit_code: i32,
        reason: &str,
        message: &str,
        finished_at: Option<DateTime<Utc>>,
    ) -> ContainerStatus {
        container(
            name,
            ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    reason: (!reason.is_empty()).then(|| reason.to_string()),
                    message: (!message.is_empty()).then(|| message.to_string()),
                    finished_at: finished_at.map(Time),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
    }

    pub(crate) fn running(name: &str) -> ContainerStatus {
        container(
            name,
            ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            },
        )
    }

    pub(crate) fn waiting(name: &str, reason: &str, message: &str) -> ContainerStatus {
        container(
            name,
            ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    message: (!message.is_empty()).then(|| message.to_string()),
                }),
                ..Default::default()
            },
        )
    }

    pub(crate) fn condition(type_: &str, status: &str, reason: &str, message: &str) -> PodCondition {
        PodCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: (!reason.is_empty()).then(|| reason.to_string()),
            message: (!message.is_empty()).then(|| message.to_string()),
            ..Default::default()
        }
    }

    fn container(name: &str, state: ContainerState) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            state: Some(state),
            ..Default::default()
        }
    }

    pub(crate) fn status_mut(pod: &mut Pod) -> &mut PodStatus {
        pod.status.get_or_insert_with(PodStatus::default)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::PodSpec;
    use similar_asserts::assert_eq;

    use super::test_support::*;
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid time")
    }

    #[test]
    fn init_failure_wins_over_ignored_sidecar_kill() {
        let mut pod = executor_pod("wf-1", "ci", "Failed");
        let status = status_mut(&mut pod);
        status.init_container_statuses = Some(vec![terminated("init", 1, "Error", "")]);
        status.container_statuses = Some(vec![
            terminated("main", 0, "Completed", ""),
            terminated("istio-proxy", 137, "Error", ""),
        ]);

        let derived = derive_node_status(&pod, PodEventKind::Update, now());

        assert_eq!(derived.phase, NodePhase::Error);
        assert_eq!(derived.message, "Error (exit code 1)");
    }

    #[test]
    fn sidecar_kill_alone_coalesces_to_success() {
        let mut pod = executor_pod("wf-1", "ci", "Failed");
        status_mut(&mut pod).container_statuses = Some(vec![
            terminated("main", 0, "Completed", ""),
            terminated("sidecar", 143, "Error", ""),
        ]);

        let derived = derive_node_status(&pod, PodEventKind::Update, now());

        assert_eq!(derived.phase, NodePhase::Succeeded);
        assert_eq!(derived.message, "");
    }

    #[test]
    fn other_sidecar_failure_fails_the_node() {
        let mut pod = executor_pod("wf-1", "ci", "Failed");
        status_mut(&mut pod).container_statuses = Some(vec![
            terminated("main", 0, "Completed", ""),
            terminated("sidecar", 1, "", "bad config"),
        ]);

        let derived = derive_node_status(&pod, PodEventKind::Update, now());

        assert_eq!(derived.phase, NodePhase::Failed);
        assert_eq!(derived.message, "Error (exit code 1): bad config");
    }

    #[test]
    fn main_failure_carries_reason_and_message() {
        let mut pod = executor_pod("wf-1", "cd", "Failed");
        status_mut(&mut pod).container_statuses = Some(vec![
            terminated("wait", 0, "Completed", ""),
            terminated("main", 2, "Error", "boom"),
        ]);

        let derived = derive_node_status(&pod, PodEventKind::Update, now());

        assert_eq!(derived.phase, NodePhase::Failed);
        assert_eq!(derived.message, "Error (exit code 2): boom");
        assert_eq!(derived.exit_code, Some(2));
    }

    #[test]
    fn wait_failure_is_an_error() {
        let mut pod = executor_pod("wf-1", "cd", "Failed");
        status_mut(&mut pod).container_statuses = Some(vec![
            terminated("main", 0, "Completed", ""),
            terminated("wait", 1, "Error", ""),
        ]);

        assert_eq!(
            infer_failed_reason(&pod, PodEventKind::Update),
            (NodePhase::Error, "Error (exit code 1)".to_string())
        );
    }

    #[test]
    fn pod_message_takes_precedence() {
        let mut pod = executor_pod("wf-1", "cd", "Failed");
        let status = status_mut(&mut pod);
        status.message = Some("Pod was evicted".to_string());
        status.container_statuses = Some(vec![terminated("main", 2, "Error", "boom")]);

        assert_eq!(
            infer_failed_reason(&pod, PodEventKind::Update),
            (NodePhase::Failed, "Pod was evicted".to_string())
        );
    }

    #[test]
    fn waiting_container_reports_failure_before_start() {
        let mut pod = executor_pod("wf-1", "cd", "Failed");
        status_mut(&mut pod).container_statuses =
            Some(vec![waiting("main", "ImagePullBackOff", "image not found")]);

        assert_eq!(
            infer_failed_reason(&pod, PodEventKind::Update),
            (
                NodePhase::Error,
                "Pod failed before main container starts due to ImagePullBackOff: image not found"
                    .to_string()
            )
        );
    }

    #[test]
    fn running_main_on_delete_uses_condition_message() {
        let mut pod = executor_pod("wf-1", "cd", "Failed");
        let status = status_mut(&mut pod);
        status.container_statuses = Some(vec![running("main")]);
        status.conditions = Some(vec![condition("DisruptionTarget", "True", "", "node drained")]);

        assert_eq!(
            infer_failed_reason(&pod, PodEventKind::Delete),
            (NodePhase::Failed, "node drained".to_string())
        );

        status_mut(&mut pod).conditions = None;
        assert_eq!(
            infer_failed_reason(&pod, PodEventKind::Delete),
            (NodePhase::Failed, "failed".to_string())
        );
    }

    #[test]
    fn pending_reports_waiting_reason_or_unschedulable() {
        let mut pod = executor_pod("wf-1", "ci", "Pending");
        status_mut(&mut pod).container_statuses =
            Some(vec![waiting("main", "ContainerCreating", "")]);
        let derived = derive_node_status(&pod, PodEventKind::Update, now());
        assert_eq!(derived.phase, NodePhase::Pending);
        assert_eq!(derived.message, "ContainerCreating");
        assert_eq!(derived.finished_at, None);

        let mut pod = executor_pod("wf-2", "ci", "Pending");
        status_mut(&mut pod).conditions = Some(vec![condition(
            "PodScheduled",
            "False",
            "Unschedulable",
            "0/3 nodes are available",
        )]);
        let derived = derive_node_status(&pod, PodEventKind::Update, now());
        assert_eq!(derived.message, "Unschedulable: 0/3 nodes are available");
    }

    #[test]
    fn unknown_phase_is_an_error() {
        let pod = executor_pod("wf-1", "ci", "Unknown");
        let derived = derive_node_status(&pod, PodEventKind::Update, now());
        assert_eq!(derived.phase, NodePhase::Error);
        assert_eq!(derived.message, "Unexpected pod phase for wf-1: Unknown");
    }

    #[test]
    fn running_ready_pod_reports_address_and_node() {
        let mut pod = executor_pod("wf-1", "ci", "Running");
        pod.spec = Some(PodSpec {
            node_name: Some("node-a".to_string()),
            ..Default::default()
        });
        let status = status_mut(&mut pod);
        status.pod_ip = Some("10.0.0.5".to_string());
        status.conditions = Some(vec![condition("Ready", "True", "", "")]);

        let derived = derive_node_status(&pod, PodEventKind::Update, now());

        assert_eq!(derived.pod_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(derived.host_node_name.as_deref(), Some("node-a"));
        assert_eq!(derived.finished_at, None);
    }

    #[test]
    fn progress_annotation_defaults_when_missing_or_malformed() {
        let mut pod = executor_pod("wf-1", "ci", "Running");
        assert_eq!(derive_node_status(&pod, PodEventKind::Update, now()).progress.to_string(), "0/1");

        for (raw, expected) in [("2/5", "2/5"), ("6/5", "0/1"), ("x/1", "0/1"), ("1/0", "0/1")] {
            pod.metadata.annotations = Some(BTreeMap::from([(
                PROGRESS_ANNOTATION.to_string(),
                raw.to_string(),
            )]));
            assert_eq!(
                derive_node_status(&pod, PodEventKind::Update, now()).progress.to_string(),
                expected,
                "{raw}"
            );
        }
    }

    #[test]
    fn finished_at_is_latest_termination() {
        let earlier = now() - chrono::Duration::minutes(5);
        let later = now() - chrono::Duration::minutes(1);
        let mut pod = executor_pod("wf-1", "ci", "Succeeded");
        status_mut(&mut pod).container_statuses = Some(vec![
            terminated_at("main", 0, "Completed", "", Some(earlier)),
            terminated_at("wait", 0, "Completed", "", Some(later)),
        ]);

        let derived = derive_node_status(&pod, PodEventKind::Update, now());

        assert_eq!(derived.finished_at, Some(later));
        assert_eq!(derived.exit_code, Some(0));
    }
}
