//! Identifier sources.
//!
//! Anything that needs fresh identifiers takes an [`IdSource`] instead of
//! reaching for global state, so tests can substitute a deterministic one.

use std::sync::atomic::{AtomicU64, Ordering};

use smol_str::{SmolStr, format_smolstr};

/// Issues unique identifiers.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> SmolStr;
}

/// Deterministic `{prefix}{n}` identifiers.
#[derive(Debug)]
pub struct CounterIds {
    prefix: SmolStr,
    next: AtomicU64,
}

impl CounterIds {
    pub fn new(prefix: impl Into<SmolStr>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl IdSource for CounterIds {
    fn next_id(&self) -> SmolStr {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format_smolstr!("{}{}", self.prefix, n)
    }
}

/// `!{session}:{n}` identifiers with a random per-session component, for ids
/// that must not collide with those issued by other processes.
#[derive(Debug)]
pub struct SessionIds {
    session: SmolStr,
    next: AtomicU64,
}

impl SessionIds {
    pub fn random() -> Self {
        Self::with_session(format_smolstr!("{:016x}", rand::random::<u64>()))
    }

    pub fn with_session(session: impl Into<SmolStr>) -> Self {
        Self {
            session: session.into(),
            next: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }
}

impl IdSource for SessionIds {
    fn next_id(&self) -> SmolStr {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format_smolstr!("!{}:{}", self.session, n)
    }
}
