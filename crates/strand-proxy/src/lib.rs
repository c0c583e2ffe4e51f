//! Client-side storage proxies for replicated sets.
//!
//! A [`ProxyHost`] owns an arena of [`StorageProxy`]s, each caching one
//! remote collection held by an authority. Proxies fold the authority's
//! versioned updates into a local [`CrdtSet`](strand_crdt::CrdtSet), detect
//! gaps and resynchronise, and fan notifications out to registered observers
//! through a shared [`NotificationScheduler`].

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub mod error;
pub mod host;
pub mod mapper;
pub mod messages;
pub mod observer;
pub mod proxy;
pub mod scheduler;

pub use error::{MappingError, ObserverError, ProxyError, StrandError};
pub use host::ProxyHost;
pub use mapper::IdentityMapper;
pub use messages::{AuthorityMessage, ProxyRequest, Update, UpdateChange, UpdateEntry};
pub use observer::{Notification, NotificationKind, Observer, Registration, UpdateDetails};
pub use proxy::{PendingRead, StorageProxy, SyncState};
pub use scheduler::NotificationScheduler;
pub use strand_common::{DeliveryOptions, SyncConfig};

/// Identifier of a particle; also the actor for the writes it makes.
pub type ParticleId = SmolStr;

/// Identifier of a handle within its particle.
pub type HandleId = SmolStr;

/// Index of a proxy in its host's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyId(u64);

impl ProxyId {
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy#{}", self.0)
    }
}
