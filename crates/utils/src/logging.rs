//! provides logging helpers

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Directives appended to the env filter so that client-library chatter stays quiet
/// unless explicitly requested through `RUST_LOG`.
const QUIET_DIRECTIVES: [&str; 3] = ["hyper=warn", "rustls=warn", "tower=warn"];

fn env_filter() -> filter::EnvFilter {
    let mut env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    for directive in QUIET_DIRECTIVES {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }
    env_filter
}

/// initiate the global tracing subscriber
pub fn init() {
    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    registry().with(fmt_layer).init();
}
