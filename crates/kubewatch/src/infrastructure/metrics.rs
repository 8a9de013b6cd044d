//! Prometheus counters for cluster reachability and informer registration.

use once_cell::sync::Lazy;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

use crate::domain::cluster::ClusterLabels;

/// Informer name reported when the control-plane secret watcher cannot start.
pub const DEFAULT_CLUSTER_SECRET_INFORMER: &str = "DefaultClusterSecret";

static UNREACHABLE_CLUSTER_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kubewatch_unreachable_cluster_count",
            "Number of times a cluster could not be reached",
        ),
        &["clusterName", "clusterId"],
    )
    .expect("valid metric definition")
});

static UNREGISTERED_INFORMER_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kubewatch_unregistered_informer_count",
            "Number of informers that failed to start",
        ),
        &["clusterName", "clusterId", "informerName"],
    )
    .expect("valid metric definition")
});

/// Process registry scraped by `/metrics`.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    registry
        .register(Box::new(UNREACHABLE_CLUSTER_COUNT.clone()))
        .expect("metric registered once");
    registry
        .register(Box::new(UNREGISTERED_INFORMER_COUNT.clone()))
        .expect("metric registered once");
    registry
});

pub fn record_unreachable_cluster(labels: &ClusterLabels) {
    let cluster_id = labels.cluster_id.to_string();
    UNREACHABLE_CLUSTER_COUNT
        .with_label_values(&[labels.cluster_name.as_str(), cluster_id.as_str()])
        .inc();
}

pub fn record_unregistered_informer(labels: &ClusterLabels, informer_name: &str) {
    let cluster_id = labels.cluster_id.to_string();
    UNREGISTERED_INFORMER_COUNT
        .with_label_values(&[labels.cluster_name.as_str(), cluster_id.as_str(), informer_name])
        .inc();
}

pub fn unreachable_cluster_count(labels: &ClusterLabels) -> u64 {
    let cluster_id = labels.cluster_id.to_string();
    UNREACHABLE_CLUSTER_COUNT
        .with_label_values(&[labels.cluster_name.as_str(), cluster_id.as_str()])
        .get()
}

pub fn unregistered_informer_count(labels: &ClusterLabels, informer_name: &str) -> u64 {
    let cluster_id = labels.cluster_id.to_string();
    UNREGISTERED_INFORMER_COUNT
        .with_label_values(&[labels.cluster_name.as_str(), cluster_id.as_str(), informer_name])
        .get()
}

/// Renders the registry in the text exposition format.
pub fn encode() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn counters_are_labelled_per_cluster() {
        let labels = ClusterLabels::new("metrics-test", 4242);
        let before = unreachable_cluster_count(&labels);

        record_unreachable_cluster(&labels);
        record_unregistered_informer(&labels, "ArgoCD");

        assert_eq!(unreachable_cluster_count(&labels), before + 1);
        assert_eq!(unregistered_informer_count(&labels, "ArgoCD"), 1);

        let text = encode().expect("encodable");
        assert!(text.contains("kubewatch_unreachable_cluster_count"));
        assert!(text.contains(r#"clusterId="4242""#));
        assert!(text.contains(r#"informerName="ArgoCD""#));
    }
}
