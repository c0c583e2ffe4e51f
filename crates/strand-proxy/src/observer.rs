use std::fmt;
use std::sync::Arc;

use strand_common::DeliveryOptions;

use crate::error::ObserverError;
use crate::{HandleId, ParticleId, ProxyId};

/// Receives notifications from the scheduler.
///
/// Returning `Err` or panicking is logged by the scheduler and does not stop
/// delivery to other observers.
pub trait Observer<T>: Send + Sync {
    fn notify(&self, notification: Notification<T>) -> Result<(), ObserverError>;
}

impl<T, F> Observer<T> for F
where
    F: Fn(Notification<T>) -> Result<(), ObserverError> + Send + Sync,
{
    fn notify(&self, notification: Notification<T>) -> Result<(), ObserverError> {
        self(notification)
    }
}

/// A notification addressed to one (particle, handle) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification<T> {
    pub proxy: ProxyId,
    pub particle: ParticleId,
    pub handle: HandleId,
    /// Proxy version when the notification was produced.
    pub version: Option<u64>,
    pub kind: NotificationKind<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind<T> {
    /// The full model after a synchronisation.
    Sync(Vec<T>),
    Update(UpdateDetails<T>),
    /// The proxy fell behind and has requested a resync.
    Desync,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDetails<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub originator: Option<ParticleId>,
}

impl<T> UpdateDetails<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<T> NotificationKind<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Update(_) => "update",
            Self::Desync => "desync",
        }
    }
}

/// A handle's interest in a proxy.
pub struct Registration<T> {
    pub particle: ParticleId,
    pub handle: HandleId,
    pub can_read: bool,
    /// `None` takes the host's configured defaults.
    pub options: Option<DeliveryOptions>,
    pub observer: Arc<dyn Observer<T>>,
}

impl<T> Registration<T> {
    pub fn new(
        particle: impl Into<ParticleId>,
        handle: impl Into<HandleId>,
        observer: Arc<dyn Observer<T>>,
    ) -> Self {
        Self {
            particle: particle.into(),
            handle: handle.into(),
            can_read: true,
            options: None,
            observer,
        }
    }

    pub fn with_options(mut self, options: DeliveryOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn write_only(mut self) -> Self {
        self.can_read = false;
        self
    }
}

impl<T> fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("particle", &self.particle)
            .field("handle", &self.handle)
            .field("can_read", &self.can_read)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
