//! Cluster-watch domain: what is watched, on which clusters, and how pod state is
//! reduced into workflow status.

pub mod client_type;
pub mod cluster;
pub mod control;
pub mod workflow;
