use miette::Diagnostic;
use smol_str::SmolStr;
use strand_common::ConfigError;
use strand_crdt::CrdtError;
use thiserror::Error;

use crate::ProxyId;

/// Top-level error type for strand.
#[derive(Debug, Error, Diagnostic)]
pub enum StrandError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Crdt(#[from] CrdtError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

/// Storage proxy errors
#[derive(Debug, Error, Diagnostic)]
pub enum ProxyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Crdt(#[from] CrdtError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Mapping(#[from] MappingError),

    #[error("no proxy {proxy} in this host")]
    #[diagnostic(code(strand::proxy::unknown))]
    UnknownProxy { proxy: ProxyId },

    #[error("authority channel closed")]
    #[diagnostic(
        code(strand::proxy::channel_closed),
        help("the receiving side of the outbound channel was dropped")
    )]
    ChannelClosed,

    #[error("particle {particle} has no readable handle on proxy {proxy}")]
    #[diagnostic(code(strand::proxy::not_readable))]
    NotReadable { proxy: ProxyId, particle: SmolStr },
}

/// Identity mapper errors.
///
/// A missing mapping means a message referenced state that was never
/// registered locally. These are never recovered from.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum MappingError {
    #[error("no object mapped to id {id}")]
    #[diagnostic(code(strand::mapping::unknown_id))]
    UnknownId { id: SmolStr },

    #[error("object {object} has no mapping")]
    #[diagnostic(code(strand::mapping::unknown_object))]
    UnknownObject { object: String },

    #[error("id {id} is already mapped")]
    #[diagnostic(code(strand::mapping::already_mapped))]
    AlreadyMapped { id: SmolStr },
}

/// Failure reported by an observer while handling a notification.
#[derive(Debug, Error, Diagnostic)]
#[error("observer failed: {message}")]
#[diagnostic(code(strand::observer::failed))]
pub struct ObserverError {
    pub message: SmolStr,
}

impl ObserverError {
    pub fn new(message: impl Into<SmolStr>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(id: &str) -> Result<(), StrandError> {
        Err(MappingError::UnknownId { id: id.into() }.into())
    }

    #[test]
    fn test_umbrella_keeps_inner_diagnostics() {
        let err = lookup("p7").unwrap_err();
        assert!(matches!(err, StrandError::Mapping(MappingError::UnknownId { .. })));
        assert_eq!(err.to_string(), "no object mapped to id p7");
        assert_eq!(
            err.code().map(|code| code.to_string()).as_deref(),
            Some("strand::mapping::unknown_id")
        );

        let err = StrandError::from(ProxyError::ChannelClosed);
        assert_eq!(
            err.code().map(|code| code.to_string()).as_deref(),
            Some("strand::proxy::channel_closed")
        );
    }
}
