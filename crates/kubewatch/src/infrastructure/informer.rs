//! Shared-informer semantics on top of `kube` watch streams.
//!
//! A watch stream only reports `Applied`, `Deleted` and `Restarted`. Handlers expect
//! add/update/delete callbacks with the previous object on update, periodic resyncs and a
//! cache-sync barrier, so every informer keeps its own object cache and derives the
//! callbacks from it.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::FutureExt;
use futures::Stream;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Resource;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::cluster::ClusterLabels;
use crate::infrastructure::k8s::KubernetesError;

/// Period after which every cached object is re-delivered as an update.
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Callbacks registered on an informer.
///
/// Calls for one object arrive in order. Implementations never see errors from the
/// informer runtime and must not return any.
#[async_trait::async_trait]
pub trait ResourceEventHandler<K>: Send + Sync {
    async fn on_add(&self, obj: &K);
    async fn on_update(&self, old: &K, new: &K);
    async fn on_delete(&self, obj: &K);
}

/// A callback invocation derived from a watch event.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<K> {
    Add(K),
    Update { old: K, new: K },
    Delete(K),
}

type ObjectKey = (Option<String>, String);

fn object_key<K: Resource>(obj: &K) -> ObjectKey {
    (obj.namespace(), obj.name_any())
}

/// Last known state of every object an informer has seen.
#[derive(Debug)]
pub struct ObjectCache<K> {
    objects: HashMap<ObjectKey, K>,
}

impl<K> Default for ObjectCache<K> {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }
}

impl<K: Resource + Clone> ObjectCache<K> {
    /// Folds a watch event into the cache and returns the callbacks it implies.
    ///
    /// A relist produces an add or update for every listed object and a delete, carrying
    /// the last known state, for every cached object missing from the list.
    pub fn apply(&mut self, event: watcher::Event<K>) -> Vec<Notification<K>> {
        match event {
            watcher::Event::Applied(obj) => vec![self.upsert(obj)],
            watcher::Event::Deleted(obj) => {
                self.objects.remove(&object_key(&obj));
                vec![Notification::Delete(obj)]
            }
            watcher::Event::Restarted(objs) => {
                let mut listed = HashSet::with_capacity(objs.len());
                let mut notifications = Vec::with_capacity(objs.len());
                for obj in objs {
                    listed.insert(object_key(&obj));
                    notifications.push(self.upsert(obj));
                }
                let gone: Vec<ObjectKey> = self
                    .objects
                    .keys()
                    .filter(|key| !listed.contains(*key))
                    .cloned()
                    .collect();
                for key in gone {
                    if let Some(obj) = self.objects.remove(&key) {
                        notifications.push(Notification::Delete(obj));
                    }
                }
                notifications
            }
        }
    }

    /// Re-delivers every cached object as an update to itself.
    pub fn resync(&self) -> Vec<Notification<K>> {
        self.objects
            .values()
            .map(|obj| Notification::Update {
                old: obj.clone(),
                new: obj.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn upsert(&mut self, obj: K) -> Notification<K> {
        match self.objects.insert(object_key(&obj), obj.clone()) {
            Some(old) => Notification::Update { old, new: obj },
            None => Notification::Add(obj),
        }
    }
}

async fn dispatch<K>(handler: &dyn ResourceEventHandler<K>, notification: &Notification<K>) {
    match notification {
        Notification::Add(obj) => handler.on_add(obj).await,
        Notification::Update { old, new } => handler.on_update(old, new).await,
        Notification::Delete(obj) => handler.on_delete(obj).await,
    }
}

/// Delivers notifications in order. Returns `false` when the token fired mid-delivery.
async fn deliver<K>(
    handler: &dyn ResourceEventHandler<K>,
    notifications: Vec<Notification<K>>,
    token: &CancellationToken,
) -> bool {
    for notification in notifications {
        select! {
            _ = token.cancelled() => return false,
            _ = dispatch(handler, &notification) => {}
        }
    }
    true
}

type EventStream<K> = BoxStream<'static, Result<watcher::Event<K>, watcher::Error>>;

async fn run_informer<K>(
    name: String,
    labels: ClusterLabels,
    mut stream: EventStream<K>,
    handler: Arc<dyn ResourceEventHandler<K>>,
    resync_period: Duration,
    token: CancellationToken,
    synced: watch::Sender<bool>,
) where
    K: Resource + Clone + Send + Sync + 'static,
{
    info!(informer = %name, cluster = %labels, "Informer started");
    let mut cache = ObjectCache::<K>::default();
    let start = tokio::time::Instant::now() + resync_period;
    let mut resync = tokio::time::interval_at(start, resync_period);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            biased;
            _ = token.cancelled() => {
                break;
            }
            _ = resync.tick() => {
                debug!(informer = %name, objects = cache.len(), "Resync");
                if !deliver(handler.as_ref(), cache.resync(), &token).await {
                    break;
                }
            }
            event = stream.next() => {
                match event {
                    Some(Ok(event)) => {
                        let relisted = matches!(event, watcher::Event::Restarted(_));
                        let notifications = cache.apply(event);
                        if !deliver(handler.as_ref(), notifications, &token).await {
                            break;
                        }
                        if relisted {
                            synced.send_replace(true);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(informer = %name, cluster = %labels, "Watch error, backing off: {e}");
                    }
                    None => {
                        warn!(informer = %name, cluster = %labels, "Watch stream ended");
                        break;
                    }
                }
            }
        }
    }

    info!(informer = %name, cluster = %labels, "Informer stopped");
}

/// A bundle of informers for one cluster that share a stop token and a sync barrier.
///
/// Informers are registered first and only begin watching on [`InformerFactory::start`].
/// Dropping the factory stops its informers.
pub struct InformerFactory {
    labels: ClusterLabels,
    token: CancellationToken,
    pending: Vec<(String, BoxFuture<'static, ()>)>,
    tasks: Vec<JoinHandle<()>>,
    synced: Vec<(String, watch::Receiver<bool>)>,
    started: bool,
}

impl InformerFactory {
    pub fn new(labels: ClusterLabels) -> Self {
        Self {
            labels,
            token: CancellationToken::new(),
            pending: Vec::new(),
            tasks: Vec::new(),
            synced: Vec::new(),
            started: false,
        }
    }

    pub fn labels(&self) -> &ClusterLabels {
        &self.labels
    }

    /// Registers an informer over `api` filtered by `config`.
    pub fn add_informer<K>(
        &mut self,
        name: impl Into<String>,
        api: Api<K>,
        config: watcher::Config,
        handler: Arc<dyn ResourceEventHandler<K>>,
    ) where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        let stream = watcher::watcher(api, config).default_backoff();
        self.add_stream(name, stream, handler);
    }

    /// Registers an informer fed by an arbitrary watch event stream.
    pub fn add_stream<K, S>(
        &mut self,
        name: impl Into<String>,
        stream: S,
        handler: Arc<dyn ResourceEventHandler<K>>,
    ) where
        K: Resource + Clone + Send + Sync + 'static,
        S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
    {
        let name = name.into();
        let (synced_tx, synced_rx) = watch::channel(false);
        let future = run_informer(
            name.clone(),
            self.labels.clone(),
            stream.boxed(),
            handler,
            DEFAULT_RESYNC_PERIOD,
            self.token.child_token(),
            synced_tx,
        )
        .boxed();
        self.synced.push((name.clone(), synced_rx));
        self.pending.push((name, future));
    }

    pub fn informer_count(&self) -> usize {
        self.synced.len()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Spawns every registered informer that is not running yet.
    pub fn start(&mut self) {
        for (name, future) in self.pending.drain(..) {
            debug!(informer = %name, cluster = %self.labels, "Spawning informer");
            self.tasks.push(tokio::spawn(future));
        }
        self.started = true;
    }

    /// Blocks until every informer delivered its initial list.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::CacheSyncFailed`] if an informer stopped before syncing or the
    ///   deadline passed
    pub async fn wait_for_cache_sync(
        &self,
        timeout: Duration,
    ) -> Result<(), Report<KubernetesError>> {
        let waits = self.synced.iter().map(|(name, rx)| {
            let mut rx = rx.clone();
            let name = name.clone();
            async move {
                rx.wait_for(|synced| *synced)
                    .await
                    .map(|_| ())
                    .map_err(|_| name)
            }
        });

        match tokio::time::timeout(timeout, futures::future::join_all(waits)).await {
            Ok(results) => {
                let failed: Vec<String> = results.into_iter().filter_map(Result::err).collect();
                if failed.is_empty() {
                    Ok(())
                } else {
                    Err(Report::new(KubernetesError::CacheSyncFailed {
                        message: format!("informers stopped before sync: {}", failed.join(", ")),
                    }))
                }
            }
            Err(_) => Err(Report::new(KubernetesError::CacheSyncFailed {
                message: format!("timed out after {timeout:?} on cluster {}", self.labels),
            })),
        }
    }

    /// Cancels the stop token and waits for the informers to return.
    pub async fn shutdown(mut self, timeout: Duration) {
        self.token.cancel();
        self.pending.clear();
        let tasks = std::mem::take(&mut self.tasks);
        let labels = self.labels.clone();
        if tokio::time::timeout(timeout, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(cluster = %labels, "Informer shutdown timed out after {:?}", timeout);
        }
    }
}

impl Drop for InformerFactory {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
