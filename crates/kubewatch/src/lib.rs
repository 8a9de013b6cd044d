pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod infrastructure;
pub mod supervisor;
mod util;

// Re-export main modules
pub use domain::client_type;
pub use domain::cluster;
pub use domain::control;
pub use domain::workflow;
pub use infrastructure::external_listener;
pub use infrastructure::informer;
pub use infrastructure::inventory;
pub use infrastructure::k8s;
pub use infrastructure::kube_client;
pub use infrastructure::metrics;
pub use infrastructure::publisher;
