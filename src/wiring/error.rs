//! Error types for the wiring layer.

use std::fmt;

use compact_str::CompactString;

use crate::graph::ConnectError;

/// Malformed handler declaration. Fatal at the declaration site; never
/// defaulted away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    BlankSignalName,
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerError::BlankSignalName => write!(f, "signal name must not be blank"),
        }
    }
}

impl std::error::Error for MarkerError {}

/// A marker's declared source could not be turned into a live emitter.
/// Recoverable: the offending marker is skipped, siblings still process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    PathNotFound { path: CompactString },
    SignalMissing { node: CompactString, signal: CompactString },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::PathNotFound { path } => {
                write!(f, "no node at path '{}'", path)
            }
            ResolveError::SignalMissing { node, signal } => {
                write!(f, "node '{}' does not expose signal '{}'", node, signal)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Why a single marker failed to bind. Either the source could not be
/// resolved or the host rejected the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindFailure {
    Resolve(ResolveError),
    Connect(ConnectError),
}

impl fmt::Display for BindFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindFailure::Resolve(e) => write!(f, "resolution failed: {}", e),
            BindFailure::Connect(e) => write!(f, "connect rejected: {}", e),
        }
    }
}

impl std::error::Error for BindFailure {}

impl From<ResolveError> for BindFailure {
    fn from(e: ResolveError) -> Self {
        BindFailure::Resolve(e)
    }
}

impl From<ConnectError> for BindFailure {
    fn from(e: ConnectError) -> Self {
        BindFailure::Connect(e)
    }
}
