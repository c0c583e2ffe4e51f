//! Error types for CRDT operations.

use miette::Diagnostic;
use thiserror::Error;

use crate::ReferenceId;

/// Protocol violations detected while applying operations.
///
/// Ordinary rejections (stale or out-of-sequence clocks, removes that have
/// not observed every contribution) are not errors; see
/// [`Applied::Rejected`](crate::Applied::Rejected).
#[derive(Error, Debug, Diagnostic, PartialEq, Eq)]
#[non_exhaustive]
pub enum CrdtError {
    /// An add carried a different value for an existing element without any
    /// new causal evidence.
    #[error("cannot replace value of element {id} without new clock entries")]
    #[diagnostic(
        code(strand::crdt::conflicting_value),
        help("the writer is not honouring the per-actor clock protocol")
    )]
    ConflictingValue { id: ReferenceId },

    /// Element lookup that requires presence.
    #[error("element {id} is not in the set")]
    #[diagnostic(code(strand::crdt::unknown_element))]
    UnknownElement { id: ReferenceId },
}
