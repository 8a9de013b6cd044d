//! Update pre-filter for system-executor pods.
//!
//! Resyncs and metadata-only updates (labels, resource version, managed fields) must not
//! reach the reducer; only the status facts it consults are compared.

use k8s_openapi::api::core::v1::ContainerStatus;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodCondition;
use k8s_openapi::api::core::v1::PodStatus;

#[derive(Debug, PartialEq, Eq)]
enum StateSnapshot<'a> {
    Unknown,
    Waiting {
        reason: Option<&'a str>,
        message: Option<&'a str>,
    },
    Running,
    Terminated {
        exit_code: i32,
        reason: Option<&'a str>,
        message: Option<&'a str>,
    },
}

#[derive(Debug, PartialEq, Eq)]
struct ContainerSnapshot<'a> {
    name: &'a str,
    ready: bool,
    state: StateSnapshot<'a>,
}

impl<'a> From<&'a ContainerStatus> for ContainerSnapshot<'a> {
    fn from(status: &'a ContainerStatus) -> Self {
        let state = match status.state.as_ref() {
            Some(s) => match (&s.terminated, &s.running, &s.waiting) {
                (Some(t), _, _) => StateSnapshot::Terminated {
                    exit_code: t.exit_code,
                    reason: t.reason.as_deref(),
                    message: t.message.as_deref(),
                },
                (None, Some(_), _) => StateSnapshot::Running,
                (None, None, Some(w)) => StateSnapshot::Waiting {
                    reason: w.reason.as_deref(),
                    message: w.message.as_deref(),
                },
                (None, None, None) => StateSnapshot::Unknown,
            },
            None => StateSnapshot::Unknown,
        };
        Self {
            name: &status.name,
            ready: status.ready,
            state,
        }
    }
}

fn containers(status: &PodStatus) -> Vec<ContainerSnapshot<'_>> {
    status
        .init_container_statuses
        .iter()
        .flatten()
        .chain(status.container_statuses.iter().flatten())
        .map(ContainerSnapshot::from)
        .collect()
}

fn conditions(status: &PodStatus) -> Vec<(&str, Option<&str>, Option<&str>)> {
    status
        .conditions
        .iter()
        .flatten()
        .map(|c: &PodCondition| (c.type_.as_str(), c.reason.as_deref(), c.message.as_deref()))
        .collect()
}

/// Whether an update between two pod snapshots carries a status change the reducer cares
/// about. Missing snapshots never pass.
pub fn pod_status_changed(old: Option<&Pod>, new: Option<&Pod>) -> bool {
    let (Some(old), Some(new)) = (old, new) else {
        return false;
    };
    let default_status = PodStatus::default();
    let from = old.status.as_ref().unwrap_or(&default_status);
    let to = new.status.as_ref().unwrap_or(&default_status);

    from.phase != to.phase
        || from.message != to.message
        || from.pod_ip != to.pod_ip
        || containers(from) != containers(to)
        || conditions(from) != conditions(to)
}
