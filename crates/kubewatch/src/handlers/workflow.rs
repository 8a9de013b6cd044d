//! Argo `Workflow` handler for the CI and CD stages.
//!
//! Workflows are watched through a dynamic client; only the `status` subtree is read.

use std::sync::Arc;

use kube::api::ApiResource;
use kube::api::DynamicObject;
use kube::api::GroupVersionKind;
use kube::runtime::watcher;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use serde_json::Value;
use tracing::debug;

use super::HandlerContext;
use crate::config::NamespaceScope;
use crate::domain::client_type::ClientType;
use crate::domain::workflow::WorkflowKind;
use crate::infrastructure::informer::InformerFactory;
use crate::infrastructure::informer::ResourceEventHandler;
use crate::infrastructure::publisher::publish_json;

pub fn workflow_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("argoproj.io", "v1alpha1", "Workflow"),
        "workflows",
    )
}

fn status_of(obj: &DynamicObject) -> Option<&Value> {
    obj.data.get("status").filter(|status| !status.is_null())
}

pub struct WorkflowHandler {
    kind: WorkflowKind,
    ctx: HandlerContext,
}

impl WorkflowHandler {
    pub fn new(kind: WorkflowKind, ctx: HandlerContext) -> Self {
        Self { kind, ctx }
    }
}

#[async_trait::async_trait]
impl ResourceEventHandler<DynamicObject> for WorkflowHandler {
    async fn on_add(&self, _obj: &DynamicObject) {}

    async fn on_update(&self, old: &DynamicObject, new: &DynamicObject) {
        let Some(status) = status_of(new) else {
            return;
        };
        if status_of(old) == Some(status) {
            debug!(workflow = %new.name_any(), "Workflow status unchanged");
            return;
        }
        publish_json(self.ctx.publisher.as_ref(), self.kind.topic(), status).await;
    }

    async fn on_delete(&self, _obj: &DynamicObject) {}
}

pub fn build_informer(
    factory: &mut InformerFactory,
    kind: WorkflowKind,
    client: Client,
    namespace: &NamespaceScope,
    ctx: HandlerContext,
) {
    let resource = workflow_resource();
    let api: Api<DynamicObject> = match namespace.as_namespace() {
        Some(ns) => Api::namespaced_with(client, ns, &resource),
        None => Api::all_with(client, &resource),
    };
    let name = match kind {
        WorkflowKind::Ci => ClientType::ArgoWfCi.informer_name(),
        WorkflowKind::Cd => ClientType::ArgoWfCd.informer_name(),
    };
    factory.add_informer(
        name,
        api,
        watcher::Config::default(),
        Arc::new(WorkflowHandler::new(kind, ctx)),
    );
}

#[cfg(test)]
mod tests {
    use api_types::topics;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::cluster::ClusterLabels;
    use crate::infrastructure::publisher::test_support::RecordingPublisher;

    fn workflow(status: Value) -> DynamicObject {
        let mut obj = DynamicObject::new("build-42", &workflow_resource()).within("devtron-ci");
        obj.data = serde_json::json!({ "status": status });
        obj
    }

    fn handler(kind: WorkflowKind) -> (WorkflowHandler, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let ctx = HandlerContext::new(ClusterLabels::new("default_cluster", 1), publisher.clone());
        (WorkflowHandler::new(kind, ctx), publisher)
    }

    #[test(tokio::test)]
    async fn changed_status_is_published_on_stage_topic() {
        let (handler, publisher) = handler(WorkflowKind::Ci);
        let old = workflow(serde_json::json!({"phase": "Running"}));
        let new = workflow(serde_json::json!({"phase": "Succeeded", "progress": "1/1"}));

        handler.on_update(&old, &new).await;

        assert_eq!(
            publisher.payloads(topics::WORKFLOW_STATUS_UPDATE),
            vec![serde_json::json!({"phase": "Succeeded", "progress": "1/1"})]
        );
    }

    #[test(tokio::test)]
    async fn unchanged_missing_status_and_add_delete_are_silent() {
        let (handler, publisher) = handler(WorkflowKind::Cd);
        let running = workflow(serde_json::json!({"phase": "Running"}));

        handler.on_add(&running).await;
        handler.on_update(&running, &running).await;
        handler.on_update(&running, &workflow(Value::Null)).await;
        handler.on_delete(&running).await;

        assert!(publisher.messages().is_empty());
    }

    #[test]
    fn gvr_points_at_argo_workflows() {
        let resource = workflow_resource();
        assert_eq!(resource.api_version, "argoproj.io/v1alpha1");
        assert_eq!(resource.plural, "workflows");
    }
}
