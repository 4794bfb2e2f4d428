//! Error types for the thermal equilibrium protocol
//!
//! Every error is fatal to the run that raised it; nothing here is retried.

use crate::types::{DecodeError, PeerId};
use std::time::Duration;
use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Registration,
    UnknownPeer,
    Timeout,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Registration => write!(f, "registration"),
            ErrorKind::UnknownPeer => write!(f, "unknown peer"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Config => write!(f, "config"),
        }
    }
}

/// Failures while admitting peripherals
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("peer id {0} registered twice")]
    DuplicateId(PeerId),

    #[error("peer id {id} outside 1..={max}")]
    IdOutOfRange { id: PeerId, max: usize },

    #[error("expected HELLO, got {0}")]
    NotHello(&'static str),

    #[error("malformed HELLO {line:?}: {source}")]
    Malformed {
        line: String,
        #[source]
        source: DecodeError,
    },

    #[error("all {0} peer slots are taken")]
    Full(usize),

    #[error("only {registered} of {expected} peers registered")]
    Incomplete { registered: usize, expected: usize },
}

/// Settings rejected before any connection is made
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("peer count must be at least 1")]
    NoPeers,

    #[error("epsilon must be positive, got {0}")]
    InvalidEpsilon(f64),

    #[error("round timeout must be non-zero")]
    ZeroTimeout,

    #[error("id must be 1..={max}, got {id}")]
    IdOutOfRange { id: PeerId, max: usize },

    #[error("initial temperature must be finite, got {0}")]
    NonFiniteValue(f64),
}

/// Errors raised by the coordinator and peripheral state machines
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection to {0} closed while a message was expected")]
    ConnectionClosed(String),

    #[error("malformed line from {peer}: {line:?}: {source}")]
    Malformed {
        peer: String,
        line: String,
        #[source]
        source: DecodeError,
    },

    #[error("line from {peer} exceeds {max} bytes")]
    LineTooLong { peer: String, max: usize },

    #[error("unexpected {got} from {peer}, expected {expected}")]
    Unexpected {
        peer: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("peer {registered} reported as id {claimed}")]
    IdMismatch { registered: PeerId, claimed: PeerId },

    #[error("registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("TEMP from unknown peer id {0}")]
    UnknownPeer(PeerId),

    #[error("no message within {0:?}")]
    Timeout(Duration),

    #[error("invalid settings: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::ConnectionClosed(_) => ErrorKind::Transport,
            Error::Malformed { .. }
            | Error::LineTooLong { .. }
            | Error::Unexpected { .. }
            | Error::IdMismatch { .. } => ErrorKind::Protocol,
            Error::Registration(_) => ErrorKind::Registration,
            Error::UnknownPeer(_) => ErrorKind::UnknownPeer,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}
