//! Arena of storage proxies sharing one scheduler and one authority channel.

use std::collections::HashMap;
use std::sync::Arc;

use smol_str::SmolStr;
use strand_common::{IdSource, SessionIds, SyncConfig};
use strand_crdt::Referenceable;
use tokio::sync::mpsc;

use crate::error::ProxyError;
use crate::mapper::IdentityMapper;
use crate::messages::{AuthorityMessage, ProxyRequest};
use crate::observer::Registration;
use crate::proxy::{PendingRead, StorageProxy};
use crate::scheduler::NotificationScheduler;
use crate::{HandleId, ParticleId, ProxyId};

/// Owns every proxy of one execution context.
///
/// Proxies are addressed locally by [`ProxyId`] and on the wire by the name
/// the host's [`IdentityMapper`] issued for them. Inbound messages go
/// through [`ProxyHost::dispatch`].
///
/// Notifications are delivered by a task the shared scheduler spawns, so any
/// call that may notify an observer (registration, dispatch, local writes)
/// must run inside a tokio runtime.
pub struct ProxyHost<T> {
    config: SyncConfig,
    proxies: HashMap<ProxyId, StorageProxy<T>>,
    names: IdentityMapper<ProxyId>,
    scheduler: NotificationScheduler<T>,
    outbound: mpsc::UnboundedSender<ProxyRequest<T>>,
    ids: Arc<dyn IdSource>,
    next_proxy: u64,
}

impl<T: Referenceable + Send + 'static> ProxyHost<T> {
    pub fn new(config: SyncConfig, outbound: mpsc::UnboundedSender<ProxyRequest<T>>) -> Self {
        Self {
            names: IdentityMapper::new(config.id_prefix.clone()),
            config,
            proxies: HashMap::new(),
            scheduler: NotificationScheduler::new(),
            outbound,
            ids: Arc::new(SessionIds::random()),
            next_proxy: 0,
        }
    }

    /// Host plus the receiving end of its authority channel.
    pub fn channel(config: SyncConfig) -> (Self, mpsc::UnboundedReceiver<ProxyRequest<T>>) {
        let (outbound, requests) = mpsc::unbounded_channel();
        (Self::new(config, outbound), requests)
    }

    /// Replace the source of id bases handed to new proxies.
    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &NotificationScheduler<T> {
        &self.scheduler
    }

    /// Wait for every queued notification to be delivered.
    pub async fn idle(&self) {
        self.scheduler.idle().await
    }

    /// Create a proxy, named `name` on the wire or with a fresh name.
    pub fn new_proxy(&mut self, name: Option<SmolStr>) -> Result<ProxyId, ProxyError> {
        let id = ProxyId::new(self.next_proxy);
        let name = self.names.create_mapping(id, name)?;
        self.next_proxy += 1;

        let proxy = StorageProxy::new(
            id,
            name.clone(),
            self.ids.next_id(),
            self.outbound.clone(),
            self.scheduler.clone(),
        )
        .with_max_pending_updates(self.config.max_pending_updates);
        self.proxies.insert(id, proxy);

        tracing::debug!(proxy = %id, %name, "created proxy");
        Ok(id)
    }

    pub fn proxy(&self, id: ProxyId) -> Result<&StorageProxy<T>, ProxyError> {
        self.proxies
            .get(&id)
            .ok_or(ProxyError::UnknownProxy { proxy: id })
    }

    fn proxy_mut(&mut self, id: ProxyId) -> Result<&mut StorageProxy<T>, ProxyError> {
        self.proxies
            .get_mut(&id)
            .ok_or(ProxyError::UnknownProxy { proxy: id })
    }

    /// Resolve a wire name to a proxy.
    pub fn proxy_named(&self, name: &str) -> Result<ProxyId, ProxyError> {
        Ok(*self.names.mapping_for_id(name)?)
    }

    /// Wire name of a proxy.
    pub fn name_of(&self, id: ProxyId) -> Result<&SmolStr, ProxyError> {
        Ok(self.names.id_for_object(&id)?)
    }

    pub fn register(
        &mut self,
        proxy: ProxyId,
        registration: Registration<T>,
    ) -> Result<(), ProxyError> {
        let defaults = self.config.default_options;
        self.proxy_mut(proxy)?.register(registration, defaults)
    }

    /// Detach one handle from a proxy. Returns false if it was not registered.
    pub fn deregister(
        &mut self,
        proxy: ProxyId,
        particle: &ParticleId,
        handle: &HandleId,
    ) -> Result<bool, ProxyError> {
        Ok(self.proxy_mut(proxy)?.deregister(particle, handle))
    }

    /// Route a message from the authority to its proxy.
    pub fn dispatch(&mut self, message: AuthorityMessage<T>) -> Result<(), ProxyError> {
        let id = *self.names.mapping_for_id(message.proxy())?;
        let proxy = self.proxy_mut(id)?;
        match message {
            AuthorityMessage::Update { update, .. } => proxy.on_update(update),
            AuthorityMessage::FullModel { version, data, .. } => proxy.on_full_sync(version, data),
            AuthorityMessage::ListResponse {
                request, values, ..
            } => {
                proxy.on_list_response(request, values);
                Ok(())
            }
        }
    }

    pub fn store(
        &mut self,
        proxy: ProxyId,
        particle: &ParticleId,
        value: T,
    ) -> Result<(), ProxyError> {
        self.proxy_mut(proxy)?.store(particle, value)
    }

    pub fn remove(
        &mut self,
        proxy: ProxyId,
        particle: &ParticleId,
        id: &str,
    ) -> Result<(), ProxyError> {
        self.proxy_mut(proxy)?.remove(particle, id)
    }

    pub fn clear(&mut self, proxy: ProxyId, particle: &ParticleId) -> Result<(), ProxyError> {
        self.proxy_mut(proxy)?.clear(particle)
    }

    pub fn to_list(
        &mut self,
        proxy: ProxyId,
        particle: &ParticleId,
    ) -> Result<PendingRead<Vec<T>>, ProxyError> {
        self.proxy_mut(proxy)?.to_list(particle)
    }

    pub fn get(
        &mut self,
        proxy: ProxyId,
        particle: &ParticleId,
        id: &str,
    ) -> Result<PendingRead<Option<T>>, ProxyError> {
        self.proxy_mut(proxy)?.get(particle, id)
    }

    pub fn generate_id(&mut self, proxy: ProxyId) -> Result<SmolStr, ProxyError> {
        Ok(self.proxy_mut(proxy)?.generate_id())
    }

    /// Drop a proxy. Reads still waiting on the authority fail with
    /// [`ProxyError::ChannelClosed`]; later messages for its name are
    /// mapping errors.
    pub fn teardown(&mut self, id: ProxyId) -> Result<StorageProxy<T>, ProxyError> {
        let proxy = self
            .proxies
            .remove(&id)
            .ok_or(ProxyError::UnknownProxy { proxy: id })?;
        self.names.remove_mapping(proxy.name())?;
        tracing::debug!(proxy = %id, name = %proxy.name(), "tore down proxy");
        Ok(proxy)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use strand_common::CounterIds;
    use strand_crdt::Entity;

    use super::*;
    use crate::error::{MappingError, ObserverError};
    use crate::messages::Update;
    use crate::observer::Notification;

    fn quiet() -> Arc<dyn crate::Observer<Entity>> {
        Arc::new(|_: Notification<Entity>| -> Result<(), ObserverError> { Ok(()) })
    }

    fn host() -> (ProxyHost<Entity>, mpsc::UnboundedReceiver<ProxyRequest<Entity>>) {
        let (host, requests) = ProxyHost::channel(SyncConfig::default());
        (host.with_id_source(Arc::new(CounterIds::new("base"))), requests)
    }

    #[test]
    fn test_proxies_get_prefixed_names() {
        let (mut host, _requests) = host();
        let first = host.new_proxy(None).unwrap();
        let second = host.new_proxy(Some("things".into())).unwrap();

        assert_eq!(host.name_of(first).unwrap(), "p0");
        assert_eq!(host.proxy_named("things").unwrap(), second);
        assert_eq!(host.generate_id(first).unwrap(), "base0:0");
        assert_eq!(host.generate_id(first).unwrap(), "base0:1");
        assert_eq!(host.generate_id(second).unwrap(), "base1:0");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut host, _requests) = host();
        host.new_proxy(Some("things".into())).unwrap();
        let err = host.new_proxy(Some("things".into())).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Mapping(MappingError::AlreadyMapped { .. })
        ));
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_dispatch_to_unknown_name_fails() {
        let (mut host, _requests) = host();
        let err = host
            .dispatch(AuthorityMessage::Update {
                proxy: "nobody".into(),
                update: Update::add(1, vec![]),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Mapping(MappingError::UnknownId { .. })
        ));
    }

    #[tokio::test]
    async fn test_teardown_fails_waiting_reads() {
        let (mut host, mut requests) = host();
        let proxy = host.new_proxy(None).unwrap();
        let particle = ParticleId::from("reader");
        host.register(
            proxy,
            Registration::new(particle.clone(), "h", quiet())
                .with_options(crate::DeliveryOptions::updates_only()),
        )
        .unwrap();
        assert_eq!(
            requests.recv().await.unwrap(),
            ProxyRequest::InitializeProxy { proxy: "p0".into() }
        );

        let read = host.to_list(proxy, &particle).unwrap();
        assert!(!read.is_local());
        host.teardown(proxy).unwrap();

        assert!(matches!(read.recv().await, Err(ProxyError::ChannelClosed)));
        assert!(host.is_empty());
        assert!(host.dispatch(AuthorityMessage::ListResponse {
            proxy: "p0".into(),
            request: 0,
            values: vec![],
        })
        .is_err());
    }

    #[test]
    fn test_unreadable_particle_cannot_read() {
        let (mut host, _requests) = host();
        let proxy = host.new_proxy(None).unwrap();
        let err = host.to_list(proxy, &"stranger".into()).err().unwrap();
        assert!(matches!(err, ProxyError::NotReadable { .. }));
        assert!(matches!(
            host.store(ProxyId::new(9), &"p".into(), Entity::new("e", "v")),
            Err(ProxyError::UnknownProxy { .. })
        ));
    }
}
