//! Velero handlers: one generic handler over the five watched Velero kinds.

use std::fmt::Debug;
use std::sync::Arc;

use api_types::topics;
use api_types::VeleroChangeEvent;
use api_types::VeleroEventType;
use api_types::VeleroResourceKind;
use kube::core::NamespaceResourceScope;
use kube::runtime::watcher;
use kube::Client;
use kube::Resource;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use serde_json::Value;
use tracing::debug;

use super::scoped_api;
use super::HandlerContext;
use crate::config::NamespaceScope;
use crate::domain::client_type::ClientType;
use crate::infrastructure::informer::InformerFactory;
use crate::infrastructure::informer::ResourceEventHandler;
use crate::infrastructure::k8s::crds::Backup;
use crate::infrastructure::k8s::crds::BackupStorageLocation;
use crate::infrastructure::k8s::crds::Restore;
use crate::infrastructure::k8s::crds::Schedule;
use crate::infrastructure::k8s::crds::VolumeSnapshotLocation;
use crate::infrastructure::publisher::publish_json;

/// Per-kind projection and change detection.
pub trait VeleroResource:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    const KIND: VeleroResourceKind;
    const CLIENT: ClientType;
    /// `false` when updates carry nothing worth reporting.
    const EMITS_UPDATES: bool = true;

    /// The `data` field of the outbound event.
    fn projection(&self) -> Value;

    fn changed(old: &Self, new: &Self) -> bool;
}

impl VeleroResource for Backup {
    const KIND: VeleroResourceKind = VeleroResourceKind::Backup;
    const CLIENT: ClientType = ClientType::VeleroBackup;

    fn projection(&self) -> Value {
        let status = &self.status;
        json!({
            "phase": status.phase,
            "progress": status.progress,
            "startTimestamp": status.start_timestamp,
            "completionTimestamp": status.completion_timestamp,
            "expiration": status.expiration,
            "formatVersion": status.format_version,
            "validationErrors": status.validation_errors,
        })
    }

    fn changed(old: &Self, new: &Self) -> bool {
        let (old, new) = (&old.status, &new.status);
        old.phase != new.phase
            || old.progress != new.progress
            || old.completion_timestamp != new.completion_timestamp
            || old.expiration != new.expiration
            || old.start_timestamp != new.start_timestamp
            || old.format_version != new.format_version
    }
}

impl VeleroResource for Restore {
    const KIND: VeleroResourceKind = VeleroResourceKind::Restore;
    const CLIENT: ClientType = ClientType::VeleroRestore;

    fn projection(&self) -> Value {
        json!({
            "backupName": self.spec.backup_name,
            "scheduleName": self.spec.schedule_name,
            "phase": self.status.phase,
            "progress": self.status.progress,
            "startTimestamp": self.status.start_timestamp,
            "completionTimestamp": self.status.completion_timestamp,
            "validationErrors": self.status.validation_errors,
        })
    }

    fn changed(old: &Self, new: &Self) -> bool {
        old.status.phase != new.status.phase
            || old.status.progress != new.status.progress
            || old.spec.backup_name != new.spec.backup_name
            || old.spec.schedule_name != new.spec.schedule_name
    }
}

impl VeleroResource for BackupStorageLocation {
    const KIND: VeleroResourceKind = VeleroResourceKind::BackupStorageLocation;
    const CLIENT: ClientType = ClientType::VeleroBsl;

    fn projection(&self) -> Value {
        json!({
            "provider": self.spec.provider,
            "default": self.spec.default,
            "accessMode": self.spec.access_mode,
            "phase": self.status.phase,
            "message": self.status.message,
            "lastValidationTime": self.status.last_validation_time,
        })
    }

    fn changed(old: &Self, new: &Self) -> bool {
        old.status.phase != new.status.phase
            || old.status.message != new.status.message
            || old.spec.access_mode != new.spec.access_mode
            || old.spec.default != new.spec.default
    }
}

impl VeleroResource for VolumeSnapshotLocation {
    const KIND: VeleroResourceKind = VeleroResourceKind::VolumeSnapshotLocation;
    const CLIENT: ClientType = ClientType::VeleroVsl;
    const EMITS_UPDATES: bool = false;

    fn projection(&self) -> Value {
        json!({ "provider": self.spec.provider })
    }

    fn changed(_old: &Self, _new: &Self) -> bool {
        false
    }
}

impl VeleroResource for Schedule {
    const KIND: VeleroResourceKind = VeleroResourceKind::Schedule;
    const CLIENT: ClientType = ClientType::VeleroSchedule;

    fn projection(&self) -> Value {
        json!({
            "schedule": self.spec.schedule,
            "paused": self.spec.paused,
            "phase": self.status.phase,
            "lastBackup": self.status.last_backup,
            "validationErrors": self.status.validation_errors,
        })
    }

    fn changed(old: &Self, new: &Self) -> bool {
        old.status != new.status
            || old.spec.paused != new.spec.paused
            || old.spec.schedule != new.spec.schedule
    }
}

pub struct VeleroHandler<K> {
    ctx: HandlerContext,
    _kind: std::marker::PhantomData<fn(K)>,
}

impl<K: VeleroResource> VeleroHandler<K> {
    pub fn new(ctx: HandlerContext) -> Self {
        Self {
            ctx,
            _kind: std::marker::PhantomData,
        }
    }

    fn event(&self, event_type: VeleroEventType, obj: &K) -> VeleroChangeEvent {
        VeleroChangeEvent {
            event_type,
            resource_kind: K::KIND,
            cluster_id: self.ctx.cluster_id(),
            resource_name: obj.name_any(),
            data: (event_type != VeleroEventType::Deleted).then(|| obj.projection()),
        }
    }

    async fn emit(&self, event_type: VeleroEventType, obj: &K) {
        let event = self.event(event_type, obj);
        publish_json(self.ctx.publisher.as_ref(), topics::STORAGE_MODULE, &event).await;
    }
}

#[async_trait::async_trait]
impl<K: VeleroResource> ResourceEventHandler<K> for VeleroHandler<K> {
    async fn on_add(&self, obj: &K) {
        self.emit(VeleroEventType::Added, obj).await;
    }

    async fn on_update(&self, old: &K, new: &K) {
        if !K::EMITS_UPDATES || !K::changed(old, new) {
            debug!(kind = %K::KIND, name = %new.name_any(), "Velero resource unchanged");
            return;
        }
        self.emit(VeleroEventType::Updated, new).await;
    }

    async fn on_delete(&self, obj: &K) {
        self.emit(VeleroEventType::Deleted, obj).await;
    }
}

pub fn build_informer<K: VeleroResource>(
    factory: &mut InformerFactory,
    client: Client,
    namespace: &NamespaceScope,
    ctx: HandlerContext,
) {
    factory.add_informer(
        K::CLIENT.informer_name(),
        scoped_api::<K>(client, namespace),
        watcher::Config::default(),
        Arc::new(VeleroHandler::<K>::new(ctx)),
    );
}

/// Registers the informer for one Velero client type. Other client types are ignored.
pub fn build_informer_for(
    factory: &mut InformerFactory,
    client_type: ClientType,
    client: Client,
    namespace: &NamespaceScope,
    ctx: HandlerContext,
) {
    match client_type {
        ClientType::VeleroBsl => {
            build_informer::<BackupStorageLocation>(factory, client, namespace, ctx)
        }
        ClientType::VeleroVsl => {
            build_informer::<VolumeSnapshotLocation>(factory, client, namespace, ctx)
        }
        ClientType::VeleroBackup => build_informer::<Backup>(factory, client, namespace, ctx),
        ClientType::VeleroRestore => build_informer::<Restore>(factory, client, namespace, ctx),
        ClientType::VeleroSchedule => build_informer::<Schedule>(factory, client, namespace, ctx),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::cluster::ClusterLabels;
    use crate::infrastructure::k8s::crds::BackupProgress;
    use crate::infrastructure::publisher::test_support::RecordingPublisher;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("velero".to_string()),
            ..Default::default()
        }
    }

    fn backup(phase: &str, backed_up: i64) -> Backup {
        let mut backup = Backup {
            metadata: meta("nightly"),
            ..Default::default()
        };
        backup.status.phase = Some(phase.to_string());
        backup.status.format_version = Some("1.1.0".to_string());
        backup.status.progress = Some(BackupProgress {
            total_items: 10,
            items_backed_up: backed_up,
        });
        backup
    }

    fn handler<K: VeleroResource>() -> (VeleroHandler<K>, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let ctx = HandlerContext::new(ClusterLabels::new("prod", 7), publisher.clone());
        (VeleroHandler::new(ctx), publisher)
    }

    #[test(tokio::test)]
    async fn backup_add_carries_initial_status() {
        let (handler, publisher) = handler::<Backup>();

        handler.on_add(&backup("New", 0)).await;

        let payloads = publisher.payloads(topics::STORAGE_MODULE);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["eventType"], "Added");
        assert_eq!(payloads[0]["resourceKind"], "Backup");
        assert_eq!(payloads[0]["clusterId"], 7);
        assert_eq!(payloads[0]["resourceName"], "nightly");
        assert_eq!(payloads[0]["data"]["phase"], "New");
        assert_eq!(payloads[0]["data"]["formatVersion"], "1.1.0");
    }

    #[test(tokio::test)]
    async fn backup_update_emits_only_on_tracked_change() {
        let (handler, publisher) = handler::<Backup>();

        handler.on_update(&backup("InProgress", 3), &backup("InProgress", 3)).await;
        handler.on_update(&backup("InProgress", 3), &backup("InProgress", 7)).await;
        handler.on_update(&backup("InProgress", 7), &backup("Completed", 7)).await;

        let phases: Vec<_> = publisher
            .payloads(topics::STORAGE_MODULE)
            .into_iter()
            .map(|p| (p["eventType"].clone(), p["data"]["phase"].clone()))
            .collect();
        assert_eq!(
            phases,
            vec![
                (json!("Updated"), json!("InProgress")),
                (json!("Updated"), json!("Completed")),
            ]
        );
    }

    #[test(tokio::test)]
    async fn delete_is_a_bare_record() {
        let (handler, publisher) = handler::<Backup>();

        handler.on_delete(&backup("Completed", 10)).await;

        let payloads = publisher.payloads(topics::STORAGE_MODULE);
        assert_eq!(
            payloads,
            vec![json!({
                "eventType": "Deleted",
                "resourceKind": "Backup",
                "clusterId": 7,
                "resourceName": "nightly",
            })]
        );
    }

    #[test(tokio::test)]
    async fn restore_diffs_backup_name() {
        let (handler, publisher) = handler::<Restore>();
        let old = Restore {
            metadata: meta("restore-1"),
            ..Default::default()
        };
        let mut new = old.clone();
        new.spec.backup_name = Some("nightly".to_string());

        handler.on_update(&old, &old).await;
        handler.on_update(&old, &new).await;

        let payloads = publisher.payloads(topics::STORAGE_MODULE);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["data"]["backupName"], "nightly");
    }

    #[test(tokio::test)]
    async fn storage_location_diffs_phase_message_and_access_mode() {
        let (handler, publisher) = handler::<BackupStorageLocation>();
        let old = BackupStorageLocation {
            metadata: meta("default"),
            ..Default::default()
        };
        let mut unavailable = old.clone();
        unavailable.status.phase = Some("Unavailable".to_string());
        let mut read_only = old.clone();
        read_only.spec.access_mode = Some("ReadOnly".to_string());
        let mut revalidated = old.clone();
        revalidated.status.last_validation_time = Some("2024-05-01T12:00:00Z".to_string());

        handler.on_update(&old, &revalidated).await;
        handler.on_update(&old, &unavailable).await;
        handler.on_update(&old, &read_only).await;

        assert_eq!(publisher.payloads(topics::STORAGE_MODULE).len(), 2);
    }

    #[test(tokio::test)]
    async fn snapshot_location_skips_updates() {
        let (handler, publisher) = handler::<VolumeSnapshotLocation>();
        let old = VolumeSnapshotLocation {
            metadata: meta("aws"),
            ..Default::default()
        };
        let mut new = old.clone();
        new.spec.provider = Some("aws".to_string());

        handler.on_update(&old, &new).await;
        handler.on_add(&new).await;
        handler.on_delete(&new).await;

        let types: Vec<_> = publisher
            .payloads(topics::STORAGE_MODULE)
            .into_iter()
            .map(|p| p["eventType"].clone())
            .collect();
        assert_eq!(types, vec![json!("Added"), json!("Deleted")]);
    }

    #[test(tokio::test)]
    async fn schedule_pause_is_reported() {
        let (handler, publisher) = handler::<Schedule>();
        let old = Schedule {
            metadata: meta("daily"),
            ..Default::default()
        };
        let mut paused = old.clone();
        paused.spec.paused = true;

        handler.on_update(&old, &paused).await;

        let payloads = publisher.payloads(topics::STORAGE_MODULE);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["data"]["paused"], true);
    }
}
