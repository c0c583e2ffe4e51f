//! Element identity.

use smol_str::SmolStr;

/// Stable identity of a set element.
pub type ReferenceId = SmolStr;

/// A value that can live in a [`CrdtSet`](crate::CrdtSet).
///
/// Two values with the same id are the same element; the set keeps at most
/// one value per id.
pub trait Referenceable: Clone + PartialEq + std::fmt::Debug {
    fn id(&self) -> &str;
}

/// Minimal referenceable value: an id and an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Entity {
    pub id: ReferenceId,
    pub data: SmolStr,
}

impl Entity {
    pub fn new(id: impl Into<ReferenceId>, data: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }
}

impl Referenceable for Entity {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Referenceable for SmolStr {
    fn id(&self) -> &str {
        self.as_str()
    }
}
