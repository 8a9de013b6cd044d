//! Kubernetes integration module.
//!
//! The main components are:
//! - [`crds`]: typed views of the ArgoCD and Velero custom resources
//! - [`KubePodLookup`]: live pod GET used by the workflow reducer
//! - [`probe`]: API discovery check run before an informer is started

pub mod crds;
pub mod pod_lookup;
pub mod probe;
pub mod types;

pub use pod_lookup::KubePodLookup;
pub use types::KubernetesError;
