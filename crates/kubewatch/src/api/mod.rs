//! Admin HTTP surface
//!
//! # API Endpoints
//!
//! - `GET /metrics` - Prometheus text exposition of the process counters
//! - `GET /health` - liveness probe, always `{"status": "ok"}`
//! - `GET /version` - build version, image tag, git sha and dirty flag

pub mod errors;
pub mod handlers;
pub mod server;

pub use errors::ApiError;
pub use server::AdminServer;
