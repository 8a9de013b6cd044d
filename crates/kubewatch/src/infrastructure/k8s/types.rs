use core::error::Error;

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to watch {resource}: {message}")]
    WatchFailed { resource: String, message: String },
    #[display("Informer caches did not sync: {message}")]
    CacheSyncFailed { message: String },
    #[display("Failed to discover resources of {api_version}")]
    DiscoveryFailed { api_version: String },
    #[display("Failed to look up pod {pod_name} in namespace {namespace}")]
    PodLookupFailed { pod_name: String, namespace: String },
}

impl Error for KubernetesError {}
