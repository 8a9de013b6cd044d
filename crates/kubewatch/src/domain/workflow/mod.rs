//! Workflow status derived from system-executor pods.
//!
//! [`reducer`] classifies a single pod snapshot, [`filter`] decides whether an update is
//! worth classifying at all, and [`status`] turns the classification into an outbound
//! [`api_types::WorkflowStatusEvent`], including the live lookup on suspicious deletes.

pub mod filter;
pub mod reducer;
pub mod status;

pub use filter::pod_status_changed;
pub use reducer::derive_node_status;
pub use reducer::infer_failed_reason;
pub use reducer::DerivedNodeStatus;
pub use reducer::PodEventKind;
pub use reducer::Progress;
pub use status::reduce_pod_event;
pub use status::PodEmission;
pub use status::PodLookup;
pub use status::WorkflowKind;
