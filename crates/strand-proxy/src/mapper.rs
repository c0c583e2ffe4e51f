//! Bidirectional table between wire identifiers and local objects.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use smol_str::{SmolStr, format_smolstr};

use crate::error::MappingError;

/// Maps opaque identifiers that cross the authority boundary to local
/// objects and back.
///
/// Lookups of unknown ids or objects are errors, never `None`: a message
/// naming something that was not registered here is a protocol bug.
#[derive(Debug)]
pub struct IdentityMapper<K> {
    prefix: SmolStr,
    next: u64,
    by_id: HashMap<SmolStr, K>,
    by_object: HashMap<K, SmolStr>,
}

impl<K: Clone + Eq + Hash + Debug> IdentityMapper<K> {
    pub fn new(prefix: impl Into<SmolStr>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
            by_id: HashMap::new(),
            by_object: HashMap::new(),
        }
    }

    /// Next issued id not already taken by a requested one.
    fn fresh_id(&mut self) -> SmolStr {
        loop {
            let id = format_smolstr!("{}{}", self.prefix, self.next);
            self.next += 1;
            if !self.by_id.contains_key(&id) {
                return id;
            }
        }
    }

    /// Map `object` to `requested_id`, or to a freshly issued id.
    pub fn create_mapping(
        &mut self,
        object: K,
        requested_id: Option<SmolStr>,
    ) -> Result<SmolStr, MappingError> {
        if let Some(existing) = self.by_object.get(&object) {
            return Err(MappingError::AlreadyMapped {
                id: existing.clone(),
            });
        }
        let id = match requested_id {
            Some(id) => id,
            None => self.fresh_id(),
        };
        if self.by_id.contains_key(&id) {
            return Err(MappingError::AlreadyMapped { id });
        }

        tracing::trace!(%id, ?object, "created mapping");
        self.by_id.insert(id.clone(), object.clone());
        self.by_object.insert(object, id.clone());
        Ok(id)
    }

    /// Reuse the existing mapping for `object` or create one.
    pub fn maybe_create_mapping(&mut self, object: K) -> Result<SmolStr, MappingError> {
        match self.by_object.get(&object) {
            Some(id) => Ok(id.clone()),
            None => self.create_mapping(object, None),
        }
    }

    pub fn has_mapping_for(&self, object: &K) -> bool {
        self.by_object.contains_key(object)
    }

    pub fn id_for_object(&self, object: &K) -> Result<&SmolStr, MappingError> {
        self.by_object
            .get(object)
            .ok_or_else(|| MappingError::UnknownObject {
                object: format!("{object:?}"),
            })
    }

    pub fn mapping_for_id(&self, id: &str) -> Result<&K, MappingError> {
        self.by_id
            .get(id)
            .ok_or_else(|| MappingError::UnknownId { id: id.into() })
    }

    /// Drop the mapping for `id`, returning the object it referred to.
    pub fn remove_mapping(&mut self, id: &str) -> Result<K, MappingError> {
        let object = self
            .by_id
            .remove(id)
            .ok_or_else(|| MappingError::UnknownId { id: id.into() })?;
        self.by_object.remove(&object);
        Ok(object)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
