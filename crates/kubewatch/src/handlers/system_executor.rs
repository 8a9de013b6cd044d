//! System-executor pod handler: turns executor pod lifecycle into workflow status events.

use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher;
use kube::Client;
use kube::ResourceExt;
use tracing::debug;

use super::scoped_api;
use super::HandlerContext;
use crate::config::NamespaceScope;
use crate::domain::client_type::ClientType;
use crate::domain::workflow::pod_status_changed;
use crate::domain::workflow::reduce_pod_event;
use crate::domain::workflow::status::WORKFLOW_TYPE_LABEL;
use crate::domain::workflow::PodEventKind;
use crate::domain::workflow::PodLookup;
use crate::domain::workflow::WorkflowKind;
use crate::infrastructure::informer::InformerFactory;
use crate::infrastructure::informer::ResourceEventHandler;
use crate::infrastructure::publisher::publish_json;

/// Workflow stages whose pods are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFilter {
    pub ci: bool,
    pub cd: bool,
}

impl StageFilter {
    fn allows(self, pod: &Pod) -> bool {
        match WorkflowKind::of(pod) {
            Some(WorkflowKind::Ci) => self.ci,
            Some(WorkflowKind::Cd) => self.cd,
            // Unknown labels are dropped with a warning by the reducer.
            None => true,
        }
    }
}

pub struct SystemExecutorHandler {
    ctx: HandlerContext,
    lookup: Arc<dyn PodLookup>,
    stages: StageFilter,
}

impl SystemExecutorHandler {
    pub fn new(ctx: HandlerContext, lookup: Arc<dyn PodLookup>, stages: StageFilter) -> Self {
        Self {
            ctx,
            lookup,
            stages,
        }
    }

    async fn handle(&self, pod: &Pod, kind: PodEventKind) {
        if !self.stages.allows(pod) {
            return;
        }
        let Some(emission) = reduce_pod_event(pod, kind, Utc::now(), self.lookup.as_ref()).await
        else {
            return;
        };
        debug!(
            pod = %pod.name_any(),
            cluster = %self.ctx.labels,
            phase = %emission.event.phase,
            "Publishing workflow status"
        );
        publish_json(self.ctx.publisher.as_ref(), emission.topic(), &emission.event).await;
    }
}

#[async_trait::async_trait]
impl ResourceEventHandler<Pod> for SystemExecutorHandler {
    /// Creation carries no status worth reporting; the first status change follows as an
    /// update.
    async fn on_add(&self, _pod: &Pod) {}

    async fn on_update(&self, old: &Pod, new: &Pod) {
        if !pod_status_changed(Some(old), Some(new)) {
            return;
        }
        self.handle(new, PodEventKind::Update).await;
    }

    async fn on_delete(&self, pod: &Pod) {
        self.handle(pod, PodEventKind::Delete).await;
    }
}

pub fn build_informer(
    factory: &mut InformerFactory,
    client: Client,
    namespace: &NamespaceScope,
    ctx: HandlerContext,
    lookup: Arc<dyn PodLookup>,
    stages: StageFilter,
) {
    factory.add_informer(
        ClientType::SystemExec.informer_name(),
        scoped_api::<Pod>(client, namespace),
        watcher::Config::default().labels(WORKFLOW_TYPE_LABEL),
        Arc::new(SystemExecutorHandler::new(ctx, lookup, stages)),
    );
}

#[cfg(test)]
mod tests {
    use api_types::topics;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::cluster::ClusterLabels;
    use crate::domain::workflow::reducer::test_support::*;
    use crate::domain::workflow::status::test_support::ScriptedLookup;
    use crate::infrastructure::publisher::test_support::RecordingPublisher;

    const ALL_STAGES: StageFilter = StageFilter { ci: true, cd: true };

    fn handler(
        lookup: ScriptedLookup,
        stages: StageFilter,
    ) -> (SystemExecutorHandler, Arc<RecordingPublisher>, Arc<ScriptedLookup>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let lookup = Arc::new(lookup);
        let ctx = HandlerContext::new(ClusterLabels::new("default_cluster", 1), publisher.clone());
        (
            SystemExecutorHandler::new(ctx, lookup.clone(), stages),
            publisher,
            lookup,
        )
    }

    fn failed_cd_pod() -> Pod {
        let mut pod = executor_pod("cd-deploy-1", "cd", "Failed");
        status_mut(&mut pod).container_statuses = Some(vec![terminated("main", 2, "Error", "boom")]);
        pod
    }

    #[test(tokio::test)]
    async fn resource_version_only_update_is_suppressed() {
        let (handler, publisher, _) = handler(ScriptedLookup::returning(None), ALL_STAGES);
        let old = failed_cd_pod();
        let mut new = old.clone();
        new.metadata.resource_version = Some("2".to_string());

        handler.on_update(&old, &new).await;

        assert!(publisher.messages().is_empty());
    }

    #[test(tokio::test)]
    async fn failure_is_published_on_cd_topic() {
        let (handler, publisher, _) = handler(ScriptedLookup::returning(None), ALL_STAGES);
        let mut old = executor_pod("cd-deploy-1", "cd", "Running");
        status_mut(&mut old).container_statuses = Some(vec![running("main")]);

        handler.on_update(&old, &failed_cd_pod()).await;

        let payloads = publisher.payloads(topics::CD_WORKFLOW_STATUS_UPDATE);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["phase"], "Failed");
        assert_eq!(payloads[0]["message"], "Error (exit code 2): boom");
        assert!(payloads[0]["nodes"]["cd-deploy-1"].is_object());
    }

    #[test(tokio::test)]
    async fn disabled_stage_is_ignored() {
        let (handler, publisher, _) = handler(
            ScriptedLookup::returning(None),
            StageFilter { ci: true, cd: false },
        );
        let old = executor_pod("cd-deploy-1", "cd", "Running");

        handler.on_update(&old, &failed_cd_pod()).await;
        handler.on_delete(&failed_cd_pod()).await;

        assert!(publisher.messages().is_empty());
    }

    #[test(tokio::test)]
    async fn delete_of_scaled_down_pod_reports_pod_deleted() {
        let (handler, publisher, lookup) = handler(ScriptedLookup::returning(None), ALL_STAGES);
        let mut pod = executor_pod("cd-deploy-1", "cd", "Failed");
        status_mut(&mut pod).message = Some("Error (exit code 143)".to_string());

        handler.on_delete(&pod).await;

        let payloads = publisher.payloads(topics::CD_WORKFLOW_STATUS_UPDATE);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["message"], "pod deleted");
        assert_eq!(payloads[0]["phase"], "Failed");
        assert_eq!(lookup.call_count(), 1);
    }

    #[test(tokio::test)]
    async fn add_is_silent() {
        let (handler, publisher, _) = handler(ScriptedLookup::returning(None), ALL_STAGES);
        handler.on_add(&failed_cd_pod()).await;
        assert!(publisher.messages().is_empty());
    }
}
