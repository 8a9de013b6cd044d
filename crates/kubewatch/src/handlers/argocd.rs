//! ArgoCD `Application` handler.

use std::sync::Arc;

use api_types::topics;
use api_types::ApplicationChangeEvent;
use chrono::Utc;
use kube::runtime::watcher;
use kube::Client;
use kube::ResourceExt;
use tracing::debug;

use super::scoped_api;
use super::HandlerContext;
use crate::config::NamespaceScope;
use crate::domain::client_type::ClientType;
use crate::infrastructure::informer::InformerFactory;
use crate::infrastructure::informer::ResourceEventHandler;
use crate::infrastructure::k8s::crds::Application;
use crate::infrastructure::publisher::publish_json;

/// Whether any field a deployment consumer tracks changed between two observations.
pub fn application_changed(old: &Application, new: &Application) -> bool {
    old.sync_revision() != new.sync_revision()
        || old.operation_revision() != new.operation_revision()
        || old.health_status() != new.health_status()
        || old.operation_phase() != new.operation_phase()
        || old.synced_resource_count() != new.synced_resource_count()
}

/// Whether a new history entry appeared. An in-place rewrite of the last entry with a
/// greater id counts too.
pub fn new_deployment(old: &Application, new: &Application) -> bool {
    let (old_history, new_history) = (old.history(), new.history());
    if new_history.len() != old_history.len() {
        return new_history.len() > old_history.len();
    }
    match (old_history.last(), new_history.last()) {
        (Some(old_last), Some(new_last)) => new_last.id > old_last.id,
        _ => false,
    }
}

pub struct ApplicationHandler {
    ctx: HandlerContext,
}

impl ApplicationHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    async fn emit(&self, topic: &str, app: &Application) {
        let event = ApplicationChangeEvent {
            application: app,
            status_time: Utc::now(),
            cluster_id: self.ctx.cluster_id(),
        };
        publish_json(self.ctx.publisher.as_ref(), topic, &event).await;
    }
}

#[async_trait::async_trait]
impl ResourceEventHandler<Application> for ApplicationHandler {
    async fn on_add(&self, app: &Application) {
        self.emit(topics::APPLICATION_STATUS_UPDATE, app).await;
    }

    async fn on_update(&self, old: &Application, new: &Application) {
        if !application_changed(old, new) && !new_deployment(old, new) {
            debug!(application = %new.name_any(), "Application unchanged");
            return;
        }
        self.emit(topics::APPLICATION_STATUS_UPDATE, new).await;
    }

    async fn on_delete(&self, app: &Application) {
        self.emit(topics::APPLICATION_STATUS_DELETE, app).await;
    }
}

pub fn build_informer(
    factory: &mut InformerFactory,
    client: Client,
    namespace: &NamespaceScope,
    ctx: HandlerContext,
) {
    factory.add_informer(
        ClientType::ArgoCd.informer_name(),
        scoped_api::<Application>(client, namespace),
        watcher::Config::default(),
        Arc::new(ApplicationHandler::new(ctx)),
    );
}
