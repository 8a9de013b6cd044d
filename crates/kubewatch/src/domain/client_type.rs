//! The closed set of resource clients started per cluster.

use std::fmt;

/// One kind of informer the supervisor can start on a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClientType {
    ArgoCd,
    ArgoWfCi,
    ArgoWfCd,
    SystemExec,
    VeleroBsl,
    VeleroVsl,
    VeleroBackup,
    VeleroRestore,
    VeleroSchedule,
}

/// A custom resource that must be served by a cluster before the matching informer can
/// start there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredResource {
    pub api_version: &'static str,
    pub plural: &'static str,
}

const ARGO_API_VERSION: &str = "argoproj.io/v1alpha1";
const VELERO_API_VERSION: &str = "velero.io/v1";

impl ClientType {
    pub const ALL: [ClientType; 9] = [
        ClientType::ArgoCd,
        ClientType::ArgoWfCi,
        ClientType::ArgoWfCd,
        ClientType::SystemExec,
        ClientType::VeleroBsl,
        ClientType::VeleroVsl,
        ClientType::VeleroBackup,
        ClientType::VeleroRestore,
        ClientType::VeleroSchedule,
    ];

    /// Value of the `informerName` metric label.
    pub fn informer_name(self) -> &'static str {
        match self {
            ClientType::ArgoCd => "ArgoCD",
            ClientType::ArgoWfCi => "CI_STAGE_ARGO_WORKFLOW",
            ClientType::ArgoWfCd => "CD_STAGE_ARGO_WORKFLOW",
            ClientType::SystemExec => "SystemExecutor",
            ClientType::VeleroBsl => "VeleroBSL",
            ClientType::VeleroVsl => "VeleroVSL",
            ClientType::VeleroBackup => "VeleroBackup",
            ClientType::VeleroRestore => "VeleroRestore",
            ClientType::VeleroSchedule => "VeleroSchedule",
        }
    }

    pub fn required_resource(self) -> Option<RequiredResource> {
        let (api_version, plural) = match self {
            ClientType::ArgoCd => (ARGO_API_VERSION, "applications"),
            ClientType::ArgoWfCi | ClientType::ArgoWfCd => (ARGO_API_VERSION, "workflows"),
            ClientType::SystemExec => return None,
            ClientType::VeleroBsl => (VELERO_API_VERSION, "backupstoragelocations"),
            ClientType::VeleroVsl => (VELERO_API_VERSION, "volumesnapshotlocations"),
            ClientType::VeleroBackup => (VELERO_API_VERSION, "backups"),
            ClientType::VeleroRestore => (VELERO_API_VERSION, "restores"),
            ClientType::VeleroSchedule => (VELERO_API_VERSION, "schedules"),
        };
        Some(RequiredResource {
            api_version,
            plural,
        })
    }

    pub fn is_velero(self) -> bool {
        matches!(
            self,
            ClientType::VeleroBsl
                | ClientType::VeleroVsl
                | ClientType::VeleroBackup
                | ClientType::VeleroRestore
                | ClientType::VeleroSchedule
        )
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.informer_name())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn informer_names_are_unique() {
        let names: HashSet<&str> = ClientType::ALL.iter().map(|c| c.informer_name()).collect();
        assert_eq!(names.len(), ClientType::ALL.len());
    }

    #[test]
    fn only_system_executor_needs_no_crd() {
        for client in ClientType::ALL {
            assert_eq!(
                client.required_resource().is_none(),
                client == ClientType::SystemExec,
                "{client}"
            );
        }
    }

    #[test]
    fn workflow_clients_share_the_argo_workflow_crd() {
        assert_eq!(
            ClientType::ArgoWfCi.required_resource(),
            ClientType::ArgoWfCd.required_resource()
        );
        assert_eq!(
            ClientType::ArgoCd.required_resource().map(|r| r.plural),
            Some("applications")
        );
    }
}
