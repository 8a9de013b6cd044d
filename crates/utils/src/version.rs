use std::sync::LazyLock;

/// Image tag the binary was built for, `latest` when unset.
pub const IMAGE_VERSION: &str = env!("IMAGE_VERSION");

/// Commit the binary was built from.
pub const GIT_SHA: Option<&str> = option_env!("VERGEN_GIT_SHA");

/// Whether the work tree had uncommitted changes at build time.
pub fn is_dirty_build() -> bool {
    is_dirty(option_env!("VERGEN_GIT_DIRTY"))
}

/// Defines the application version.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{}-{}{}",
        IMAGE_VERSION,
        GIT_SHA.unwrap_or("unknown"),
        if is_dirty_build() { "-dirty" } else { "" }
    )
});

fn is_dirty(flag: Option<&str>) -> bool {
    flag.is_some_and(|value| value == "true")
}
