//! Process-wide helpers shared by the kubewatch binaries.

pub mod logging;
pub mod version;
