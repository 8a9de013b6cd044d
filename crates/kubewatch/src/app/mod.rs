//! Application module
//!
//! Wiring and lifecycle of the watcher process: the builder assembles the services, the
//! core starts the control plane and the informers, and the task manager runs the
//! long-lived tasks until a shutdown signal arrives.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use core::Application;
pub use services::ApplicationServices;
