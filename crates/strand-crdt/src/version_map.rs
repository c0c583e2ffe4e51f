//! Per-actor logical clocks.
//!
//! A [`VersionMap`] records, for every actor that has written to a replica,
//! the highest clock value accepted from that actor. Actors missing from the
//! map are treated as clock 0, and zero clocks are never stored, so two maps
//! compare equal exactly when they agree for every actor.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A causally distinct writer.
pub type Actor = SmolStr;

/// Mapping from actor to the highest clock value seen from that actor.
///
/// `Ord` is an arbitrary total order used only for deterministic tie-breaks;
/// causal comparisons go through [`VersionMap::dominates`].
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionMap {
    clocks: BTreeMap<Actor, u64>,
}

impl VersionMap {
    /// Create an empty version map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock for `actor`, 0 if the actor has never been seen.
    pub fn get(&self, actor: &str) -> u64 {
        self.clocks.get(actor).copied().unwrap_or(0)
    }

    /// Set the clock for `actor`.
    pub fn set(&mut self, actor: impl Into<Actor>, clock: u64) {
        let actor = actor.into();
        if clock == 0 {
            self.clocks.remove(&actor);
        } else {
            self.clocks.insert(actor, clock);
        }
    }

    /// Increment the clock for `actor` and return the new value.
    pub fn increment(&mut self, actor: impl Into<Actor>) -> u64 {
        let clock = self.clocks.entry(actor.into()).or_insert(0);
        *clock += 1;
        *clock
    }

    /// Builder-style variant of [`VersionMap::set`].
    pub fn with(mut self, actor: impl Into<Actor>, clock: u64) -> Self {
        self.set(actor, clock);
        self
    }

    /// Pointwise max of `self` and `other`, in place.
    pub fn merge(&mut self, other: &VersionMap) {
        for (actor, &clock) in &other.clocks {
            if clock > self.get(actor) {
                self.clocks.insert(actor.clone(), clock);
            }
        }
    }

    /// Pointwise max of `self` and `other` as a new map.
    pub fn merged_with(&self, other: &VersionMap) -> VersionMap {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    /// True iff every clock in `other` is `<=` the corresponding clock here.
    pub fn dominates(&self, other: &VersionMap) -> bool {
        other
            .clocks
            .iter()
            .all(|(actor, &clock)| self.get(actor) >= clock)
    }

    /// True iff `other` dominates `self`.
    pub fn is_dominated_by(&self, other: &VersionMap) -> bool {
        other.dominates(self)
    }

    /// Actors whose clocks differ between the two maps.
    pub fn differing_actors<'a>(&'a self, other: &'a VersionMap) -> Vec<&'a Actor> {
        let mut actors: Vec<&Actor> = self
            .clocks
            .keys()
            .chain(other.clocks.keys())
            .filter(|actor| self.get(actor) != other.get(actor))
            .collect();
        actors.sort();
        actors.dedup();
        actors
    }

    /// Actors with a recorded clock.
    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.clocks.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Actor, u64)> {
        self.clocks.iter().map(|(actor, &clock)| (actor, clock))
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

impl<A: Into<Actor>> FromIterator<(A, u64)> for VersionMap {
    fn from_iter<I: IntoIterator<Item = (A, u64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (actor, clock) in iter {
            map.set(actor, clock);
        }
        map
    }
}

impl fmt::Display for VersionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (actor, clock)) in self.clocks.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{actor}: {clock}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_actor_is_zero() {
        let map = VersionMap::new().with("me", 3);
        assert_eq!(map.get("me"), 3);
        assert_eq!(map.get("you"), 0);
    }

    #[test]
    fn test_merge_is_pointwise_max() {
        let a = VersionMap::from_iter([("me", 2), ("you", 1)]);
        let b = VersionMap::from_iter([("you", 4), ("them", 1)]);
        let merged = a.merged_with(&b);
        assert_eq!(merged, VersionMap::from_iter([("me", 2), ("you", 4), ("them", 1)]));
        assert_eq!(merged, b.merged_with(&a));
    }

    #[test]
    fn test_dominates() {
        let a = VersionMap::from_iter([("me", 2), ("you", 1)]);
        let b = VersionMap::from_iter([("me", 1)]);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(a.dominates(&a));
        assert!(a.dominates(&VersionMap::new()));
        assert!(b.is_dominated_by(&a));
    }

    #[test]
    fn test_concurrent_maps_do_not_dominate() {
        let a = VersionMap::from_iter([("me", 2)]);
        let b = VersionMap::from_iter([("you", 1)]);
        assert!(!a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn test_differing_actors() {
        let old = VersionMap::from_iter([("me", 1), ("you", 2)]);
        let new = VersionMap::from_iter([("me", 3), ("you", 2), ("them", 1)]);
        let actors: Vec<&str> = new
            .differing_actors(&old)
            .into_iter()
            .map(|a| a.as_str())
            .collect();
        assert_eq!(actors, vec!["me", "them"]);
    }

    #[test]
    fn test_zero_clocks_are_not_stored() {
        let map = VersionMap::from_iter([("me", 0), ("you", 1)]);
        assert_eq!(map, VersionMap::new().with("you", 1));
        assert_eq!(map.actors().count(), 1);
    }

    #[test]
    fn test_display() {
        let map = VersionMap::from_iter([("me", 1), ("you", 2)]);
        assert_eq!(map.to_string(), "{me: 1, you: 2}");
    }
}
