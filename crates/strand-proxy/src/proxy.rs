//! Storage proxy: a client-side cache of one remote collection.
//!
//! Updates from the authority carry a monotonically increasing version. While
//! every update is exactly one version ahead of the local model the proxy is
//! synchronised and folds updates in as they arrive. An update from the
//! future means something was missed: the proxy drops to [`SyncState::None`],
//! asks for the full model, and keeps queueing updates until either the
//! model arrives or the missing updates do.

use std::collections::HashMap;
use std::sync::Arc;

use smol_str::{SmolStr, format_smolstr};
use strand_common::DeliveryOptions;
use strand_crdt::{CollectionData, CrdtSet, Operation, ReferenceId, Referenceable};
use tokio::sync::{mpsc, oneshot};

use crate::error::ProxyError;
use crate::messages::{ProxyRequest, Update, UpdateChange, UpdateEntry};
use crate::observer::{Notification, NotificationKind, Observer, Registration, UpdateDetails};
use crate::scheduler::NotificationScheduler;
use crate::{HandleId, ParticleId, ProxyId};

/// How far the local model can be trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No trusted model: never synchronised, or fell behind.
    None,
    /// Full model requested, not yet received.
    Pending,
    /// Local model is current.
    Full,
}

impl SyncState {
    pub fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

struct Observed<T> {
    particle: ParticleId,
    handle: HandleId,
    options: DeliveryOptions,
    observer: Arc<dyn Observer<T>>,
}

enum ReadRequest<T> {
    List(oneshot::Sender<Vec<T>>),
    Get {
        id: ReferenceId,
        reply: oneshot::Sender<Option<T>>,
    },
}

/// Result of a read that may have to wait for the authority.
pub struct PendingRead<V> {
    inner: ReadState<V>,
}

enum ReadState<V> {
    Ready(V),
    Waiting(oneshot::Receiver<V>),
}

impl<V> PendingRead<V> {
    fn ready(value: V) -> Self {
        Self {
            inner: ReadState::Ready(value),
        }
    }

    fn waiting(receiver: oneshot::Receiver<V>) -> Self {
        Self {
            inner: ReadState::Waiting(receiver),
        }
    }

    /// Whether the value was served from the local model.
    pub fn is_local(&self) -> bool {
        matches!(self.inner, ReadState::Ready(_))
    }

    /// Wait for the value. Fails if the proxy was torn down first.
    pub async fn recv(self) -> Result<V, ProxyError> {
        match self.inner {
            ReadState::Ready(value) => Ok(value),
            ReadState::Waiting(receiver) => receiver.await.map_err(|_| ProxyError::ChannelClosed),
        }
    }
}

/// Client-side cache of one remote collection.
///
/// Operations that notify observers hand the notification to the
/// [`NotificationScheduler`], which spawns its dispatch task; they must be
/// called from within a tokio runtime.
pub struct StorageProxy<T> {
    id: ProxyId,
    name: SmolStr,
    version: Option<u64>,
    sync_state: SyncState,
    keep_synced: bool,
    listener_attached: bool,
    pending_updates: Vec<Update<T>>,
    max_pending_updates: Option<usize>,
    observers: Vec<Observed<T>>,
    model: CrdtSet<T>,
    reads: HashMap<u64, ReadRequest<T>>,
    next_request: u64,
    id_base: SmolStr,
    next_local_id: u64,
    outbound: mpsc::UnboundedSender<ProxyRequest<T>>,
    scheduler: NotificationScheduler<T>,
}

impl<T: Referenceable + Send + 'static> StorageProxy<T> {
    /// `name` is the proxy's id on the wire; `id_base` seeds
    /// [`generate_id`](Self::generate_id).
    pub fn new(
        id: ProxyId,
        name: impl Into<SmolStr>,
        id_base: impl Into<SmolStr>,
        outbound: mpsc::UnboundedSender<ProxyRequest<T>>,
        scheduler: NotificationScheduler<T>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            version: None,
            sync_state: SyncState::None,
            keep_synced: false,
            listener_attached: false,
            pending_updates: Vec::new(),
            max_pending_updates: None,
            observers: Vec::new(),
            model: CrdtSet::new(),
            reads: HashMap::new(),
            next_request: 0,
            id_base: id_base.into(),
            next_local_id: 0,
            outbound,
            scheduler,
        }
    }

    pub fn with_max_pending_updates(mut self, bound: Option<usize>) -> Self {
        self.max_pending_updates = bound;
        self
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// Version of the last update folded into the local model.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn is_synced(&self) -> bool {
        self.sync_state.is_full()
    }

    /// Local model, whether or not it is trusted.
    pub fn model(&self) -> &CrdtSet<T> {
        &self.model
    }

    /// Updates waiting for a gap to fill.
    pub fn pending_updates(&self) -> usize {
        self.pending_updates.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// A fresh id for values created through this proxy.
    pub fn generate_id(&mut self) -> SmolStr {
        let id = format_smolstr!("{}:{}", self.id_base, self.next_local_id);
        self.next_local_id += 1;
        id
    }

    fn send(&self, request: ProxyRequest<T>) -> Result<(), ProxyError> {
        self.outbound
            .send(request)
            .map_err(|_| ProxyError::ChannelClosed)
    }

    fn request_sync(&mut self) -> Result<(), ProxyError> {
        metrics::counter!("strand_proxy_resyncs_total").increment(1);
        self.send(ProxyRequest::SynchronizeProxy {
            proxy: self.name.clone(),
        })
    }

    fn notify(
        &self,
        kind: NotificationKind<T>,
        version: Option<u64>,
        wants: impl Fn(&DeliveryOptions) -> bool,
    ) {
        for observed in self.observers.iter().filter(|o| wants(&o.options)) {
            self.notify_one(observed, kind.clone(), version);
        }
    }

    fn notify_one(&self, observed: &Observed<T>, kind: NotificationKind<T>, version: Option<u64>) {
        self.scheduler.enqueue(
            &observed.observer,
            Notification {
                proxy: self.id,
                particle: observed.particle.clone(),
                handle: observed.handle.clone(),
                version,
                kind,
            },
        );
    }

    fn is_observing(&self, particle: &str) -> bool {
        self.observers.iter().any(|o| o.particle == particle)
    }

    /// Whether `entry` is one of our own writes that the model already holds.
    ///
    /// Local writes are only applied with a trusted model, so a proxy that
    /// never had one has applied nothing.
    fn applied_locally(&self, update: &Update<T>, entry: &UpdateEntry<T>, removal: bool) -> bool {
        let own = update
            .originator
            .as_deref()
            .is_some_and(|originator| self.is_observing(originator));
        if !own || self.version.is_none() {
            return false;
        }
        if removal {
            !self.model.data().contains(entry.value.id())
        } else {
            self.model.version().get(&entry.actor) >= entry.clock.get(&entry.actor)
        }
    }

    /// Attach a handle.
    ///
    /// Handles that cannot read are ignored. The first readable handle
    /// attaches the update listener; the first one that wants a synced model
    /// requests it. A sync-notified handle registering after the model
    /// arrived gets the model straight away.
    pub fn register(
        &mut self,
        registration: Registration<T>,
        defaults: DeliveryOptions,
    ) -> Result<(), ProxyError> {
        if !registration.can_read {
            tracing::debug!(
                proxy = %self.id,
                particle = %registration.particle,
                handle = %registration.handle,
                "skipping registration of unreadable handle"
            );
            return Ok(());
        }

        let options = registration.options.unwrap_or(defaults);
        let observed = Observed {
            particle: registration.particle,
            handle: registration.handle,
            options,
            observer: registration.observer,
        };

        if !self.listener_attached {
            self.send(ProxyRequest::InitializeProxy {
                proxy: self.name.clone(),
            })?;
            self.listener_attached = true;
        }

        if options.keep_synced {
            if !self.keep_synced {
                self.request_sync()?;
                self.keep_synced = true;
                if !self.sync_state.is_full() {
                    self.sync_state = SyncState::Pending;
                }
            }
            if options.notify_sync && self.sync_state.is_full() {
                self.notify_one(&observed, NotificationKind::Sync(self.model.view()), self.version);
            }
        }

        self.observers.push(observed);
        Ok(())
    }

    /// Detach a handle. Returns false if it was not registered.
    ///
    /// Notifications already handed to the scheduler are still delivered.
    pub fn deregister(&mut self, particle: &str, handle: &str) -> bool {
        let before = self.observers.len();
        self.observers
            .retain(|o| o.particle != particle || o.handle != handle);
        let removed = self.observers.len() < before;
        if removed {
            tracing::debug!(proxy = %self.id, particle, handle, "deregistered handle");
        }
        removed
    }

    /// Handle an incremental update from the authority.
    pub fn on_update(&mut self, update: Update<T>) -> Result<(), ProxyError> {
        tracing::trace!(proxy = %self.id, version = update.version, "received update");

        let unsynced_listeners = self
            .observers
            .iter()
            .any(|o| !o.options.keep_synced && o.options.notify_update);
        if unsynced_listeners {
            if let Some(details) = self.describe_unapplied(&update) {
                self.notify(
                    NotificationKind::Update(details),
                    Some(update.version),
                    |options| !options.keep_synced && options.notify_update,
                );
            }
        }

        if !self.keep_synced {
            return Ok(());
        }
        if let Some(current) = self.version.filter(|&current| update.version <= current) {
            metrics::counter!("strand_proxy_stale_total", "kind" => "update").increment(1);
            tracing::warn!(
                proxy = %self.id,
                version = update.version,
                current,
                "dropping stale update"
            );
            return Ok(());
        }

        let at = self
            .pending_updates
            .partition_point(|pending| pending.version < update.version);
        if self
            .pending_updates
            .get(at)
            .is_some_and(|pending| pending.version == update.version)
        {
            tracing::warn!(proxy = %self.id, version = update.version, "dropping duplicate update");
            return Ok(());
        }
        self.pending_updates.insert(at, update);

        if let Some(bound) = self.max_pending_updates {
            if self.pending_updates.len() > bound {
                tracing::warn!(
                    proxy = %self.id,
                    queued = self.pending_updates.len(),
                    bound,
                    "pending update queue full, forcing resync"
                );
                self.pending_updates.clear();
                return self.desync();
            }
        }

        self.drain()
    }

    /// Handle a full model from the authority.
    pub fn on_full_sync(&mut self, version: u64, data: CollectionData<T>) -> Result<(), ProxyError> {
        if let Some(current) = self.version.filter(|&current| version <= current) {
            metrics::counter!("strand_proxy_stale_total", "kind" => "model").increment(1);
            tracing::warn!(proxy = %self.id, version, current, "dropping stale model");
            return Ok(());
        }

        self.model.update_data(data);
        self.version = Some(version);
        self.sync_state = SyncState::Full;
        self.pending_updates.retain(|pending| pending.version > version);
        tracing::debug!(
            proxy = %self.id,
            version,
            queued = self.pending_updates.len(),
            "synchronised"
        );

        self.notify(
            NotificationKind::Sync(self.model.view()),
            self.version,
            |options| options.keep_synced && options.notify_sync,
        );
        self.drain()
    }

    /// Answer a read that was sent to the authority.
    pub fn on_list_response(&mut self, request: u64, values: Vec<T>) {
        match self.reads.remove(&request) {
            Some(ReadRequest::List(reply)) => {
                let _ = reply.send(values);
            }
            Some(ReadRequest::Get { id, reply }) => {
                let _ = reply.send(values.into_iter().find(|value| value.id() == id.as_str()));
            }
            None => {
                tracing::warn!(proxy = %self.id, request, "response for unknown read request");
            }
        }
    }

    fn desync(&mut self) -> Result<(), ProxyError> {
        let was_full = self.sync_state.is_full();
        self.sync_state = SyncState::None;
        self.request_sync()?;
        if was_full {
            metrics::counter!("strand_proxy_desyncs_total").increment(1);
            tracing::debug!(proxy = %self.id, version = ?self.version, "desynchronised");
            self.notify(NotificationKind::Desync, self.version, |options| {
                options.notify_desync
            });
        }
        Ok(())
    }

    /// Fold every queued update that directly follows the local version.
    fn drain(&mut self) -> Result<(), ProxyError> {
        while let Some(next) = self.pending_updates.first() {
            if self.version.and_then(|current| current.checked_add(1)) != Some(next.version) {
                break;
            }
            let update = self.pending_updates.remove(0);
            let details = self.fold(&update)?;
            self.version = Some(update.version);

            if let Some(details) = details {
                self.notify(
                    NotificationKind::Update(details),
                    self.version,
                    |options| options.keep_synced && options.notify_update,
                );
            }
        }

        if !self.pending_updates.is_empty() {
            if self.sync_state.is_full() {
                self.desync()?;
            }
        } else if !self.sync_state.is_full() && self.version.is_some() {
            tracing::debug!(proxy = %self.id, version = ?self.version, "caught up");
            self.sync_state = SyncState::Full;
        }
        Ok(())
    }

    /// Apply an update to the model and describe what observers should see.
    ///
    /// Echoes of writes one of our particles already applied locally are
    /// refused by the model and so produce nothing. Echoes of writes made
    /// before the model was trusted change it and are notified like any other.
    fn fold(&mut self, update: &Update<T>) -> Result<Option<UpdateDetails<T>>, ProxyError> {
        let mut details = UpdateDetails {
            added: Vec::new(),
            removed: Vec::new(),
            originator: update.originator.clone(),
        };
        let mut rejected = 0u64;

        match &update.change {
            UpdateChange::Add(entries) => {
                for entry in entries {
                    let applied = self.model.apply(&entry.add_operation())?;
                    if applied.is_effective() {
                        details.added.push(entry.value.clone());
                    } else if !applied.is_accepted() && !self.applied_locally(update, entry, false) {
                        rejected += 1;
                    }
                }
            }
            UpdateChange::Remove(entries) => {
                for entry in entries {
                    let local = self.model.get(entry.value.id()).cloned();
                    let applied = self.model.apply(&entry.remove_operation())?;
                    if applied.is_effective() {
                        details.removed.extend(local);
                    } else if !applied.is_accepted() && !self.applied_locally(update, entry, true) {
                        rejected += 1;
                    }
                }
            }
        }

        if rejected > 0 {
            metrics::counter!("strand_proxy_rejected_ops_total").increment(rejected);
            tracing::warn!(
                proxy = %self.id,
                version = update.version,
                rejected,
                "update carried operations the model could not apply"
            );
        }
        Ok((!details.is_empty()).then_some(details))
    }

    /// Describe an update from its effective flags without touching the model.
    fn describe_unapplied(&self, update: &Update<T>) -> Option<UpdateDetails<T>> {
        let mut details = UpdateDetails {
            added: Vec::new(),
            removed: Vec::new(),
            originator: update.originator.clone(),
        };
        let (entries, removal) = match &update.change {
            UpdateChange::Add(entries) => (entries, false),
            UpdateChange::Remove(entries) => (entries, true),
        };
        let fresh = entries
            .iter()
            .filter(|entry| entry.effective && !self.applied_locally(update, entry, removal))
            .map(|entry| entry.value.clone());
        if removal {
            details.removed.extend(fresh);
        } else {
            details.added.extend(fresh);
        }
        (!details.is_empty()).then_some(details)
    }

    /// Add `value` on behalf of `particle`.
    ///
    /// The write always goes to the authority. With a trusted model it is
    /// also applied locally, with the particle as actor, and observers are
    /// told immediately.
    pub fn store(&mut self, particle: &ParticleId, value: T) -> Result<(), ProxyError> {
        if !self.sync_state.is_full() {
            return self.send(ProxyRequest::Store {
                proxy: self.name.clone(),
                particle: particle.clone(),
                value,
                actor: particle.clone(),
                clock: None,
            });
        }

        let mut clock = self.model.version().clone();
        clock.increment(particle.clone());
        self.send(ProxyRequest::Store {
            proxy: self.name.clone(),
            particle: particle.clone(),
            value: value.clone(),
            actor: particle.clone(),
            clock: Some(clock.clone()),
        })?;

        let applied = self
            .model
            .apply(&Operation::add(value.clone(), particle.clone(), clock))?;
        if applied.is_effective() {
            let details = UpdateDetails {
                added: vec![value],
                removed: Vec::new(),
                originator: Some(particle.clone()),
            };
            self.notify(NotificationKind::Update(details), self.version, |options| {
                options.notify_update
            });
        }
        Ok(())
    }

    /// Remove the element `id` on behalf of `particle`.
    pub fn remove(&mut self, particle: &ParticleId, id: &str) -> Result<(), ProxyError> {
        if !self.sync_state.is_full() {
            return self.send(ProxyRequest::Remove {
                proxy: self.name.clone(),
                particle: particle.clone(),
                id: id.into(),
                actor: particle.clone(),
                clock: None,
            });
        }

        let Some(value) = self.model.get(id).cloned() else {
            tracing::debug!(proxy = %self.id, id, "remove of absent element");
            return Ok(());
        };
        let clock = self.model.version().clone();
        self.send(ProxyRequest::Remove {
            proxy: self.name.clone(),
            particle: particle.clone(),
            id: id.into(),
            actor: particle.clone(),
            clock: Some(clock.clone()),
        })?;

        let applied = self
            .model
            .apply(&Operation::remove(value.clone(), particle.clone(), clock))?;
        if applied.is_effective() {
            let details = UpdateDetails {
                added: Vec::new(),
                removed: vec![value],
                originator: Some(particle.clone()),
            };
            self.notify(NotificationKind::Update(details), self.version, |options| {
                options.notify_update
            });
        }
        Ok(())
    }

    /// Remove every element on behalf of `particle`.
    pub fn clear(&mut self, particle: &ParticleId) -> Result<(), ProxyError> {
        if !self.sync_state.is_full() {
            return self.send(ProxyRequest::RemoveMultiple {
                proxy: self.name.clone(),
                particle: particle.clone(),
                values: Vec::new(),
                actor: particle.clone(),
                clock: None,
            });
        }

        let values = self.model.view();
        let clock = self.model.version().clone();
        self.send(ProxyRequest::RemoveMultiple {
            proxy: self.name.clone(),
            particle: particle.clone(),
            values: values.clone(),
            actor: particle.clone(),
            clock: Some(clock.clone()),
        })?;

        let mut removed = Vec::new();
        for value in values {
            let op = Operation::remove(value.clone(), particle.clone(), clock.clone());
            if self.model.apply(&op)?.is_effective() {
                removed.push(value);
            }
        }
        if !removed.is_empty() {
            let details = UpdateDetails {
                added: Vec::new(),
                removed,
                originator: Some(particle.clone()),
            };
            self.notify(NotificationKind::Update(details), self.version, |options| {
                options.notify_update
            });
        }
        Ok(())
    }

    fn check_readable(&self, particle: &ParticleId) -> Result<(), ProxyError> {
        if self.is_observing(particle) {
            Ok(())
        } else {
            Err(ProxyError::NotReadable {
                proxy: self.id,
                particle: particle.clone(),
            })
        }
    }

    fn next_request(&mut self) -> u64 {
        let request = self.next_request;
        self.next_request += 1;
        request
    }

    /// Every value in the collection. Served locally when synchronised.
    pub fn to_list(&mut self, particle: &ParticleId) -> Result<PendingRead<Vec<T>>, ProxyError> {
        self.check_readable(particle)?;
        if self.sync_state.is_full() {
            return Ok(PendingRead::ready(self.model.view()));
        }

        let (reply, receiver) = oneshot::channel();
        let request = self.next_request();
        self.send(ProxyRequest::ToList {
            proxy: self.name.clone(),
            particle: particle.clone(),
            request,
        })?;
        self.reads.insert(request, ReadRequest::List(reply));
        Ok(PendingRead::waiting(receiver))
    }

    /// The value with id `id`, if any. Served locally when synchronised.
    pub fn get(
        &mut self,
        particle: &ParticleId,
        id: &str,
    ) -> Result<PendingRead<Option<T>>, ProxyError> {
        self.check_readable(particle)?;
        if self.sync_state.is_full() {
            return Ok(PendingRead::ready(self.model.get(id).cloned()));
        }

        let (reply, receiver) = oneshot::channel();
        let request = self.next_request();
        self.send(ProxyRequest::ToList {
            proxy: self.name.clone(),
            particle: particle.clone(),
            request,
        })?;
        self.reads.insert(
            request,
            ReadRequest::Get {
                id: id.into(),
                reply,
            },
        );
        Ok(PendingRead::waiting(receiver))
    }
}

#[cfg(test)]
mod tests {
    use strand_crdt::{Entity, VersionMap};

    use super::*;
    use crate::error::ObserverError;
    use crate::messages::UpdateEntry;

    fn proxy() -> (
        StorageProxy<Entity>,
        mpsc::UnboundedReceiver<ProxyRequest<Entity>>,
    ) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let proxy = StorageProxy::new(
            ProxyId::new(0),
            "p0",
            "base",
            outbound,
            NotificationScheduler::new(),
        );
        (proxy, requests)
    }

    fn synced(proxy: &mut StorageProxy<Entity>) {
        let observer: Arc<dyn Observer<Entity>> =
            Arc::new(|_: Notification<Entity>| -> Result<(), ObserverError> { Ok(()) });
        let options = DeliveryOptions {
            notify_sync: false,
            notify_update: false,
            ..DeliveryOptions::default()
        };
        proxy
            .register(Registration::new("reader", "h", observer), options)
            .unwrap();
        proxy.on_full_sync(1, CollectionData::new()).unwrap();
    }

    fn add(version: u64, id: &str, tick: u64) -> Update<Entity> {
        Update::add(
            version,
            vec![UpdateEntry {
                value: Entity::new(id, id),
                actor: "them".into(),
                clock: VersionMap::new().with("them", tick),
                effective: true,
            }],
        )
    }

    #[test]
    fn test_generate_id() {
        let (mut proxy, _requests) = proxy();
        assert_eq!(proxy.generate_id(), "base:0");
        assert_eq!(proxy.generate_id(), "base:1");
    }

    #[test]
    fn test_register_requests_sync_once() {
        let (mut proxy, mut requests) = proxy();
        synced(&mut proxy);
        synced(&mut proxy);

        assert_eq!(
            requests.try_recv().unwrap(),
            ProxyRequest::InitializeProxy { proxy: "p0".into() }
        );
        assert_eq!(
            requests.try_recv().unwrap(),
            ProxyRequest::SynchronizeProxy { proxy: "p0".into() }
        );
        assert!(requests.try_recv().is_err());
        assert_eq!(proxy.observer_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_queued_update_is_dropped() {
        let (mut proxy, _requests) = proxy();
        synced(&mut proxy);

        proxy.on_update(add(3, "c", 2)).unwrap();
        proxy.on_update(add(3, "c", 2)).unwrap();
        assert_eq!(proxy.pending_updates(), 1);
        assert_eq!(proxy.sync_state(), SyncState::None);

        proxy.on_update(add(2, "b", 1)).unwrap();
        assert_eq!(proxy.pending_updates(), 0);
        assert_eq!(proxy.version(), Some(3));
        assert!(proxy.is_synced());
        assert_eq!(proxy.model().view().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_operations_still_advance_version() {
        let (mut proxy, _requests) = proxy();
        synced(&mut proxy);

        // Skips them:1, so the model refuses it, but the version stream is intact.
        proxy.on_update(add(2, "b", 2)).unwrap();
        assert_eq!(proxy.version(), Some(2));
        assert!(proxy.is_synced());
        assert!(proxy.model().view().is_empty());
    }

    #[tokio::test]
    async fn test_list_response_for_unknown_request_is_ignored() {
        let (mut proxy, _requests) = proxy();
        proxy.on_list_response(42, vec![Entity::new("a", "a")]);
        assert!(proxy.reads.is_empty());
    }

    #[tokio::test]
    async fn test_model_at_last_version_stays_synced() {
        let (mut proxy, _requests) = proxy();
        synced(&mut proxy);

        proxy.on_update(add(3, "c", 2)).unwrap();
        proxy.on_full_sync(u64::MAX, CollectionData::new()).unwrap();
        assert_eq!(proxy.pending_updates(), 0);
        assert!(proxy.is_synced());

        proxy.on_update(add(u64::MAX, "d", 1)).unwrap();
        assert_eq!(proxy.version(), Some(u64::MAX));
        assert!(proxy.is_synced());
        assert!(proxy.model().view().is_empty());
    }

    #[test]
    fn test_deregister_removes_only_that_handle() {
        let (mut proxy, _requests) = proxy();
        synced(&mut proxy);
        let observer: Arc<dyn Observer<Entity>> =
            Arc::new(|_: Notification<Entity>| -> Result<(), ObserverError> { Ok(()) });
        proxy
            .register(
                Registration::new("reader", "other", observer),
                DeliveryOptions::updates_only(),
            )
            .unwrap();

        assert!(proxy.deregister("reader", "h"));
        assert!(!proxy.deregister("reader", "h"));
        assert_eq!(proxy.observer_count(), 1);
        assert!(proxy.to_list(&"reader".into()).is_ok());

        assert!(proxy.deregister("reader", "other"));
        assert!(matches!(
            proxy.to_list(&"reader".into()),
            Err(ProxyError::NotReadable { .. })
        ));
    }

    #[test]
    fn test_sync_state_helpers() {
        assert!(SyncState::Full.is_full());
        assert!(SyncState::Pending.is_pending());
        assert!(!SyncState::None.is_full());
    }
}
