//! Observed-remove set keyed by element id.
//!
//! Every element carries the [`VersionMap`] of the writes that contributed to
//! it, and the replica carries an aggregate version summarising every
//! operation it has folded in. Adds must arrive in strict per-actor sequence;
//! a remove is only accepted from a writer that has observed every
//! contribution to the element it removes. Merging two replicas treats an
//! element missing from a replica whose version already covers the element's
//! contributors as removed there.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CrdtError;
use crate::reference::{ReferenceId, Referenceable};
use crate::version_map::{Actor, VersionMap};

/// A single element and the writes that contributed to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataValue<T> {
    pub value: T,
    pub contributors: VersionMap,
}

impl<T> DataValue<T> {
    pub fn new(value: T, contributors: VersionMap) -> Self {
        Self {
            value,
            contributors,
        }
    }
}

/// Persistent state of one replica.
///
/// Every element's contributors are dominated by `version`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionData<T> {
    values: BTreeMap<ReferenceId, DataValue<T>>,
    version: VersionMap,
}

impl<T> Default for CollectionData<T> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            version: VersionMap::new(),
        }
    }
}

impl<T: Referenceable> CollectionData<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build replica state from its parts.
    ///
    /// Contributors not covered by `version` are folded into it so the
    /// domination invariant holds.
    pub fn from_parts(
        mut version: VersionMap,
        entries: impl IntoIterator<Item = DataValue<T>>,
    ) -> Self {
        let mut values = BTreeMap::new();
        for entry in entries {
            if !version.dominates(&entry.contributors) {
                tracing::warn!(
                    id = entry.value.id(),
                    contributors = %entry.contributors,
                    version = %version,
                    "element contributors exceed aggregate version, widening"
                );
                version.merge(&entry.contributors);
            }
            values.insert(ReferenceId::from(entry.value.id()), entry);
        }
        Self { values, version }
    }

    pub fn version(&self) -> &VersionMap {
        &self.version
    }

    pub fn get(&self, id: &str) -> Option<&DataValue<T>> {
        self.values.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    /// Elements in id order.
    pub fn entries(&self) -> impl Iterator<Item = &DataValue<T>> {
        self.values.values()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of applying an [`Operation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The operation was stale, out of sequence, or not entitled to act.
    /// Nothing changed.
    Rejected,
    /// Accepted, but the set of visible values is the same as before.
    Unchanged,
    /// Accepted and the visible values changed.
    Changed,
}

impl Applied {
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Rejected)
    }

    pub fn is_effective(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// Operations on a [`CrdtSet`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operation<T> {
    /// Add `value`; `clock[actor]` must be exactly one past the replica's
    /// clock for `actor`.
    Add {
        value: T,
        actor: Actor,
        clock: VersionMap,
    },
    /// Remove `value`; `clock[actor]` must equal the replica's clock for
    /// `actor` and `clock` must dominate the element's contributors.
    Remove {
        value: T,
        actor: Actor,
        clock: VersionMap,
    },
    /// Batch catching one replica up with another after a merge.
    FastForward(FastForward<T>),
}

impl<T> Operation<T> {
    pub fn add(value: T, actor: impl Into<Actor>, clock: VersionMap) -> Self {
        Self::Add {
            value,
            actor: actor.into(),
            clock,
        }
    }

    pub fn remove(value: T, actor: impl Into<Actor>, clock: VersionMap) -> Self {
        Self::Remove {
            value,
            actor: actor.into(),
            clock,
        }
    }
}

/// Catch-up batch produced by [`CrdtSet::merge`] for the other replica.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FastForward<T> {
    /// Version of the replica this batch was computed for.
    pub old_clock: VersionMap,
    /// Version after the batch is applied.
    pub new_clock: VersionMap,
    pub added: Vec<DataValue<T>>,
    pub removed: Vec<T>,
}

impl<T: Referenceable> FastForward<T> {
    pub fn new(old_clock: VersionMap, new_clock: VersionMap) -> Self {
        Self {
            old_clock,
            new_clock,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Rewrite the batch as plain adds when possible.
    ///
    /// Only batches without removals whose additions all come from a single
    /// actor, one clock tick apart, can be rewritten. Anything else is
    /// returned unchanged as a single fast-forward.
    pub fn simplify(self) -> Vec<Operation<T>> {
        if !self.removed.is_empty() || self.added.is_empty() {
            return vec![Operation::FastForward(self)];
        }

        let actors: Vec<Actor> = self
            .new_clock
            .differing_actors(&self.old_clock)
            .into_iter()
            .cloned()
            .collect();
        let [actor] = actors.as_slice() else {
            return vec![Operation::FastForward(self)];
        };
        let actor = actor.clone();

        let start = self.old_clock.get(&actor);
        let mut ticks: Vec<u64> = self
            .added
            .iter()
            .map(|entry| entry.contributors.get(&actor))
            .collect();
        ticks.sort_unstable();
        let in_sequence = ticks
            .iter()
            .zip(start + 1..)
            .all(|(&tick, expected)| tick == expected);
        let last = start + ticks.len() as u64;

        if !in_sequence || self.old_clock.clone().with(actor.clone(), last) != self.new_clock {
            return vec![Operation::FastForward(self)];
        }

        let mut added = self.added;
        added.sort_by_key(|entry| entry.contributors.get(&actor));
        added
            .into_iter()
            .map(|entry| Operation::add(entry.value, actor.clone(), entry.contributors))
            .collect()
    }
}

/// A change to propagate to a replica.
#[derive(Clone, Debug, PartialEq)]
pub enum CrdtChange<T> {
    /// Replace the whole model.
    Data(CollectionData<T>),
    /// Apply these operations in order.
    Operations(Vec<Operation<T>>),
}

/// Result of [`CrdtSet::merge`].
#[derive(Clone, Debug, PartialEq)]
pub struct MergeChanges<T> {
    /// The merged model, already adopted by the merging replica.
    pub model_change: CrdtChange<T>,
    /// Operations that bring the other replica to the merged model.
    pub other_change: CrdtChange<T>,
    /// Whether the merging replica's state changed.
    pub mine_changed: bool,
    /// Whether the other replica's state differs from the merged model.
    pub theirs_changed: bool,
}

/// A replicated set of [`Referenceable`] values.
#[derive(Clone, Debug)]
pub struct CrdtSet<T> {
    data: CollectionData<T>,
}

impl<T: Referenceable> Default for CrdtSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Referenceable> CrdtSet<T> {
    pub fn new() -> Self {
        Self {
            data: CollectionData::new(),
        }
    }

    pub fn from_data(data: CollectionData<T>) -> Self {
        Self { data }
    }

    /// Current replica state.
    pub fn data(&self) -> &CollectionData<T> {
        &self.data
    }

    pub fn into_data(self) -> CollectionData<T> {
        self.data
    }

    pub fn version(&self) -> &VersionMap {
        &self.data.version
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.data.values.get(id).map(|entry| &entry.value)
    }

    /// Contributors of an element that must be present.
    pub fn contributors(&self, id: &str) -> Result<&VersionMap, CrdtError> {
        self.data
            .values
            .get(id)
            .map(|entry| &entry.contributors)
            .ok_or_else(|| CrdtError::UnknownElement { id: id.into() })
    }

    /// Values currently in the set. No ordering is promised.
    pub fn view(&self) -> Vec<T> {
        self.data
            .values
            .values()
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// Replace the replica state wholesale.
    pub fn update_data(&mut self, data: CollectionData<T>) {
        self.data = data;
    }

    /// Apply an operation.
    ///
    /// Rejections are reported as [`Applied::Rejected`] and leave the replica
    /// untouched. `Err` is returned only for protocol violations.
    pub fn apply(&mut self, op: &Operation<T>) -> Result<Applied, CrdtError> {
        let applied = apply_to(&mut self.data, op, false)?;
        if !applied.is_accepted() {
            tracing::debug!(?op, version = %self.data.version, "rejected operation");
        }
        Ok(applied)
    }

    /// Check whether `op` would be accepted without applying it.
    pub fn can_apply(&self, op: &Operation<T>) -> Result<Applied, CrdtError> {
        let mut scratch = self.data.clone();
        apply_to(&mut scratch, op, true)
    }

    /// Join `other` into this replica.
    ///
    /// An element present on both sides survives with the pointwise max of
    /// its contributors. An element present on one side only survives unless
    /// the other side's version already dominates its contributors, meaning
    /// the other side saw it and removed it.
    pub fn merge(&mut self, other: &CollectionData<T>) -> Result<MergeChanges<T>, CrdtError> {
        let new_version = self.data.version.merged_with(&other.version);
        let mut merged = BTreeMap::new();
        let mut fast_forward = FastForward::new(other.version.clone(), new_version.clone());

        for (id, theirs) in &other.values {
            match self.data.values.get(id) {
                Some(mine) => {
                    let entry = DataValue::new(
                        pick_value(mine, theirs)?.clone(),
                        mine.contributors.merged_with(&theirs.contributors),
                    );
                    if entry != *theirs {
                        fast_forward.added.push(entry.clone());
                    }
                    merged.insert(id.clone(), entry);
                }
                None if self.data.version.dominates(&theirs.contributors) => {
                    fast_forward.removed.push(theirs.value.clone());
                }
                None => {
                    merged.insert(id.clone(), theirs.clone());
                }
            }
        }

        for (id, mine) in &self.data.values {
            if other.values.contains_key(id) || other.version.dominates(&mine.contributors) {
                continue;
            }
            fast_forward.added.push(mine.clone());
            merged.insert(id.clone(), mine.clone());
        }

        let merged = CollectionData {
            values: merged,
            version: new_version,
        };
        let mine_changed = merged != self.data;
        let theirs_changed = merged != *other;
        self.data = merged.clone();

        Ok(MergeChanges {
            model_change: CrdtChange::Data(merged),
            other_change: CrdtChange::Operations(fast_forward.simplify()),
            mine_changed,
            theirs_changed,
        })
    }
}

/// Choose the surviving value when both replicas hold the same element.
///
/// The value whose contributors dominate wins. Concurrent histories fall
/// back to the total order on [`VersionMap`] so every replica picks the same
/// value. Identical histories with different values cannot be reconciled.
fn pick_value<'a, T: Referenceable>(
    mine: &'a DataValue<T>,
    theirs: &'a DataValue<T>,
) -> Result<&'a T, CrdtError> {
    if mine.value == theirs.value {
        return Ok(&mine.value);
    }
    if mine.contributors == theirs.contributors {
        return Err(CrdtError::ConflictingValue {
            id: mine.value.id().into(),
        });
    }
    let theirs_wins = if theirs.contributors.dominates(&mine.contributors) {
        true
    } else if mine.contributors.dominates(&theirs.contributors) {
        false
    } else {
        theirs.contributors > mine.contributors
    };
    Ok(if theirs_wins { &theirs.value } else { &mine.value })
}

fn apply_to<T: Referenceable>(
    data: &mut CollectionData<T>,
    op: &Operation<T>,
    dry_run: bool,
) -> Result<Applied, CrdtError> {
    match op {
        Operation::Add {
            value,
            actor,
            clock,
        } => {
            let next = clock.get(actor);
            if next != data.version.get(actor) + 1 {
                return Ok(Applied::Rejected);
            }
            // The writer may only depend on writes this replica has seen.
            let depends_on_unseen = clock
                .iter()
                .any(|(other, tick)| other != actor && data.version.get(other) < tick);
            if depends_on_unseen {
                return Ok(Applied::Rejected);
            }

            let applied = match data.values.get(value.id()) {
                Some(existing) if existing.value == *value => Applied::Unchanged,
                Some(existing) if existing.contributors.dominates(clock) => {
                    return Err(CrdtError::ConflictingValue {
                        id: value.id().into(),
                    });
                }
                _ => Applied::Changed,
            };
            if dry_run {
                return Ok(applied);
            }

            data.version.set(actor.clone(), next);
            match data.values.get_mut(value.id()) {
                Some(existing) => {
                    existing.contributors.merge(clock);
                    existing.value = value.clone();
                }
                None => {
                    data.values.insert(
                        value.id().into(),
                        DataValue::new(value.clone(), clock.clone()),
                    );
                }
            }
            Ok(applied)
        }
        Operation::Remove {
            value,
            actor,
            clock,
        } => {
            let Some(existing) = data.values.get(value.id()) else {
                return Ok(Applied::Rejected);
            };
            // Removes never advance the remover's clock.
            if clock.get(actor) != data.version.get(actor) {
                return Ok(Applied::Rejected);
            }
            if !clock.dominates(&existing.contributors) {
                return Ok(Applied::Rejected);
            }
            if dry_run {
                return Ok(Applied::Changed);
            }

            data.values.remove(value.id());
            Ok(Applied::Changed)
        }
        Operation::FastForward(ff) => {
            if !data.version.dominates(&ff.old_clock) {
                return Ok(Applied::Rejected);
            }
            for entry in &ff.added {
                if let Some(existing) = data.values.get(entry.value.id()) {
                    pick_value(existing, entry)?;
                }
            }
            if dry_run {
                return Ok(Applied::Changed);
            }

            let mut changed = false;
            for entry in &ff.added {
                let id = entry.value.id();
                match data.values.get_mut(id) {
                    Some(existing) => {
                        let value = pick_value(existing, entry)?.clone();
                        if value != existing.value {
                            existing.value = value;
                            changed = true;
                        }
                        existing.contributors.merge(&entry.contributors);
                    }
                    None if !data.version.dominates(&entry.contributors) => {
                        data.values.insert(id.into(), entry.clone());
                        changed = true;
                    }
                    None => {}
                }
            }
            for value in &ff.removed {
                let covered = data
                    .values
                    .get(value.id())
                    .is_some_and(|existing| ff.new_clock.dominates(&existing.contributors));
                if covered {
                    data.values.remove(value.id());
                    changed = true;
                }
            }
            data.version.merge(&ff.new_clock);

            Ok(if changed {
                Applied::Changed
            } else {
                Applied::Unchanged
            })
        }
    }
}
