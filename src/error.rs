//! Error types for the cache-consistency engine

use thiserror::Error;

use crate::backend::{BackendError, StatementKind};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the pool, sync engine, and configuration layer.
///
/// Backend client errors reach this enum only after classification: transient
/// faults are retried internally, recoverable faults cause context
/// replacement, and what remains propagates here.
#[derive(Error, Debug)]
pub enum Error {
    /// No pooled connection became available within the acquire timeout.
    #[error("connection pool exhausted after {waited_ms} ms")]
    PoolExhausted { waited_ms: u64 },

    /// The backend connection could not be established or was lost.
    #[error("backend connection lost: {0}")]
    ConnectionLost(BackendError),

    /// The backend rejected a statement template during connection setup.
    /// This is a schema/configuration mismatch, not a transient fault.
    #[error("statement preparation failed for {kind:?}: {source}")]
    StatementPrepareFailed {
        kind: StatementKind,
        source: BackendError,
    },

    /// A synchronization pass could not complete; it will be retried from
    /// the same baseline on the next tick.
    #[error("sync pass aborted: {0}")]
    SyncAborted(String),

    /// A caller-supplied argument or configuration value is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A programming-contract violation, e.g. releasing a context that is
    /// not checked out.
    #[error("internal contract violation: {0}")]
    InternalContractViolation(&'static str),

    /// A fatal backend error propagated unmodified.
    #[error("backend failure: {0}")]
    Backend(BackendError),
}

// =============================================================================
// Tests
// =============================================================================
