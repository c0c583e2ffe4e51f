//! Messages exchanged between proxies and the authority.
//!
//! Proxies are named on the wire by the id the host's mapper issued for
//! them. The encoding of these messages is left to the transport; they only
//! promise serde support.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strand_crdt::{Actor, CollectionData, Operation, ReferenceId, VersionMap};

use crate::ParticleId;

/// Requests sent from a proxy to the authority.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ProxyRequest<T> {
    /// Start delivering incremental updates for this proxy.
    InitializeProxy { proxy: SmolStr },
    /// Send the full model.
    SynchronizeProxy { proxy: SmolStr },
    /// Add a value on behalf of a particle.
    Store {
        proxy: SmolStr,
        particle: ParticleId,
        value: T,
        actor: Actor,
        /// Clock the proxy applied locally, absent when it has no trusted
        /// model and the authority must assign one.
        clock: Option<VersionMap>,
    },
    /// Remove a value on behalf of a particle.
    Remove {
        proxy: SmolStr,
        particle: ParticleId,
        id: ReferenceId,
        actor: Actor,
        clock: Option<VersionMap>,
    },
    /// Remove several values at once. An empty list clears whatever the
    /// authority currently holds.
    RemoveMultiple {
        proxy: SmolStr,
        particle: ParticleId,
        values: Vec<T>,
        actor: Actor,
        clock: Option<VersionMap>,
    },
    /// Read the collection; answered with [`AuthorityMessage::ListResponse`].
    ToList {
        proxy: SmolStr,
        particle: ParticleId,
        request: u64,
    },
}

/// Messages the authority delivers to proxies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum AuthorityMessage<T> {
    Update {
        proxy: SmolStr,
        update: Update<T>,
    },
    FullModel {
        proxy: SmolStr,
        version: u64,
        data: CollectionData<T>,
    },
    ListResponse {
        proxy: SmolStr,
        request: u64,
        values: Vec<T>,
    },
}

impl<T> AuthorityMessage<T> {
    /// Wire id of the proxy this message is addressed to.
    pub fn proxy(&self) -> &str {
        match self {
            Self::Update { proxy, .. }
            | Self::FullModel { proxy, .. }
            | Self::ListResponse { proxy, .. } => proxy,
        }
    }
}

/// One versioned change to the remote collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Update<T> {
    pub version: u64,
    /// Particle whose write produced this update, if any.
    pub originator: Option<ParticleId>,
    pub change: UpdateChange<T>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum UpdateChange<T> {
    Add(Vec<UpdateEntry<T>>),
    Remove(Vec<UpdateEntry<T>>),
}

/// A single add or remove inside an [`Update`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UpdateEntry<T> {
    pub value: T,
    pub actor: Actor,
    pub clock: VersionMap,
    /// Whether the authority saw a visible change when it applied this entry.
    pub effective: bool,
}

impl<T: Clone> UpdateEntry<T> {
    pub fn add_operation(&self) -> Operation<T> {
        Operation::add(self.value.clone(), self.actor.clone(), self.clock.clone())
    }

    pub fn remove_operation(&self) -> Operation<T> {
        Operation::remove(self.value.clone(), self.actor.clone(), self.clock.clone())
    }
}

impl<T> Update<T> {
    pub fn add(version: u64, entries: Vec<UpdateEntry<T>>) -> Self {
        Self {
            version,
            originator: None,
            change: UpdateChange::Add(entries),
        }
    }

    pub fn remove(version: u64, entries: Vec<UpdateEntry<T>>) -> Self {
        Self {
            version,
            originator: None,
            change: UpdateChange::Remove(entries),
        }
    }

    pub fn from_originator(mut self, particle: impl Into<ParticleId>) -> Self {
        self.originator = Some(particle.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_crdt::Entity;

    #[test]
    fn test_update_json_shape() {
        let update = Update::add(
            3,
            vec![UpdateEntry {
                value: Entity::new("e1", "hello"),
                actor: "you".into(),
                clock: VersionMap::new().with("you", 1),
                effective: true,
            }],
        )
        .from_originator("particle-a");
        let message = AuthorityMessage::Update {
            proxy: "p0".into(),
            update,
        };

        insta::assert_snapshot!(serde_json::to_string(&message).unwrap(), @r#"{"Update":{"proxy":"p0","update":{"version":3,"originator":"particle-a","change":{"Add":[{"value":{"id":"e1","data":"hello"},"actor":"you","clock":{"you":1},"effective":true}]}}}}"#);
    }

    #[test]
    fn test_message_proxy() {
        let message: AuthorityMessage<Entity> = AuthorityMessage::ListResponse {
            proxy: "p4".into(),
            request: 0,
            values: vec![],
        };
        assert_eq!(message.proxy(), "p4");
    }
}
