//! Ambient pieces shared by the strand crates: configuration, telemetry and
//! identifier generation.

pub mod config;
pub mod error;
pub mod id;
pub mod telemetry;

pub use crate::config::{DeliveryOptions, SyncConfig};
pub use crate::error::ConfigError;
pub use crate::id::{CounterIds, IdSource, SessionIds};
