//! Backend Ports
//!
//! Abstractions over the SQL client library that serves user/group records.
//! The engine never builds SQL at runtime: every query is one of a fixed set
//! of statement templates, prepared once per connection during the connect
//! handshake and addressed by [`StatementKind`] afterwards.
//!
//! Concrete adapters implement [`Connector`] and [`BackendConnection`]. The
//! crate ships one adapter, [`memory`], which serves records from an
//! in-process table and is used throughout the test suite.

use async_trait::async_trait;
use thiserror::Error;

pub mod classify;
pub mod memory;

pub use classify::{classify, describe, ErrorClass};

// =============================================================================
// Statement Templates
// =============================================================================

/// The fixed set of statements prepared on every connection.
///
/// Templates are static strings enumerated at build time, so there is no
/// injection surface and no runtime SQL generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Look up a single user record by login name.
    SelectUserByName,
    /// Look up a single user record by numeric id.
    SelectUserById,
    /// Look up a single group record by name.
    SelectGroupByName,
    /// Look up a single group record by numeric id.
    SelectGroupById,
    /// Ids of user records modified after a given marker value.
    SelectUsersModifiedSince,
    /// Ids of group records modified after a given marker value.
    SelectGroupsModifiedSince,
    /// The backend's global modification marker.
    SelectUpdateMarker,
}

impl StatementKind {
    /// Every statement a connection must prepare, in preparation order.
    pub const ALL: [StatementKind; 7] = [
        StatementKind::SelectUserByName,
        StatementKind::SelectUserById,
        StatementKind::SelectGroupByName,
        StatementKind::SelectGroupById,
        StatementKind::SelectUsersModifiedSince,
        StatementKind::SelectGroupsModifiedSince,
        StatementKind::SelectUpdateMarker,
    ];

    /// The SQL template for this statement.
    pub fn sql(self) -> &'static str {
        match self {
            StatementKind::SelectUserByName => {
                "SELECT uid, userid FROM ftpusers WHERE userid = ?"
            }
            StatementKind::SelectUserById => {
                "SELECT uid, userid FROM ftpusers WHERE uid = ?"
            }
            StatementKind::SelectGroupByName => {
                "SELECT gid, groupname FROM ftpgroups WHERE groupname = ?"
            }
            StatementKind::SelectGroupById => {
                "SELECT gid, groupname FROM ftpgroups WHERE gid = ?"
            }
            StatementKind::SelectUsersModifiedSince => {
                "SELECT uid FROM ftpusers WHERE modified_at > ?"
            }
            StatementKind::SelectGroupsModifiedSince => {
                "SELECT gid FROM ftpgroups WHERE modified_at > ?"
            }
            StatementKind::SelectUpdateMarker => {
                "SELECT marker FROM update_marker LIMIT 1"
            }
        }
    }
}

// =============================================================================
// Row Model
// =============================================================================

/// A single column value in a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U32(u32),
    U64(u64),
    Text(String),
    Null,
}

impl Value {
    /// The value as a 32-bit id, if it is one.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a 64-bit marker, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            Value::U32(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    /// The value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One result row: a sequence of column values.
pub type Row = Vec<Value>;

// =============================================================================
// Errors
// =============================================================================

/// A raw error reported by the backend client library.
///
/// `code` is the client-library error number; [`classify`] maps it to a
/// retry/recover/fail decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("backend error {code}: {message}")]
pub struct BackendError {
    pub code: u32,
    pub message: String,
}

impl BackendError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The retry class of this error.
    pub fn class(&self) -> ErrorClass {
        classify(self.code)
    }
}

/// Failure during connection establishment.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The backend handshake itself failed.
    #[error("backend handshake failed: {0}")]
    Handshake(BackendError),

    /// The backend accepted the connection but rejected a statement
    /// template. This is a configuration mismatch, not a transient fault.
    #[error("statement preparation failed for {kind:?}: {source}")]
    Prepare {
        kind: StatementKind,
        source: BackendError,
    },
}

// =============================================================================
// Ports
// =============================================================================

/// Port for opening backend connections.
///
/// `connect` performs the full handshake: open the client connection, then
/// prepare every template in [`StatementKind::ALL`]. A connection is never
/// handed out with a partial statement set.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>, ConnectError>;
}

/// Port for one live backend connection with its prepared statements.
///
/// A connection is exclusively owned by whoever holds the box; the pool
/// enforces single ownership, so implementations need `&mut self` only.
#[async_trait]
pub trait BackendConnection: Send {
    /// Execute one of the prepared statements.
    async fn execute(
        &mut self,
        kind: StatementKind,
        params: &[Value],
    ) -> Result<Vec<Row>, BackendError>;

    /// Close the connection. Errors during close are swallowed by adapters;
    /// a connection being torn down has nothing useful left to report.
    async fn close(&mut self);
}

// =============================================================================
// Tests
// =============================================================================
