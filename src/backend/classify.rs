//! Error Mapping Layer
//!
//! Translates backend client-library error codes into the retry taxonomy the
//! pool and sync engine act on. Pure functions: no state, no I/O.
//!
//! The code space follows the MySQL client/server convention: server-side
//! errors in the 1000s, client-side errors in the 2000s, plus the raw errno
//! the client surfaces for a broken pipe.

/// What the caller should do about a backend error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the individual operation a bounded number of times; the
    /// connection itself is still good.
    Transient,
    /// Discard the connection context and acquire a fresh one.
    Recoverable,
    /// Propagate to the caller for process-level handling. No retry.
    Fatal,
}

// Server-side codes.
const ER_ACCESS_DENIED: u32 = 1045;
const ER_BAD_FIELD: u32 = 1054;
const ER_NO_SUCH_TABLE: u32 = 1146;
const ER_SERVER_SHUTDOWN: u32 = 1053;
const ER_LOCK_WAIT_TIMEOUT: u32 = 1205;
const ER_LOCK_DEADLOCK: u32 = 1213;

// Client-side codes.
const CR_CONN_HOST_ERROR: u32 = 2003;
const CR_SERVER_GONE: u32 = 2006;
const CR_OUT_OF_MEMORY: u32 = 2008;
const CR_SERVER_LOST: u32 = 2013;

// errno surfaced directly by the client on a dead socket.
const EPIPE: u32 = 32;

/// Classify a backend client error code.
///
/// Unknown codes are [`ErrorClass::Fatal`]: blind retries against an error we
/// cannot identify risk masking data problems.
pub fn classify(code: u32) -> ErrorClass {
    match code {
        ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK | CR_SERVER_LOST => ErrorClass::Transient,
        CR_SERVER_GONE | ER_SERVER_SHUTDOWN | CR_CONN_HOST_ERROR | EPIPE => {
            ErrorClass::Recoverable
        }
        ER_ACCESS_DENIED | ER_BAD_FIELD | ER_NO_SUCH_TABLE | CR_OUT_OF_MEMORY => ErrorClass::Fatal,
        _ => ErrorClass::Fatal,
    }
}

/// A short human-readable description for a known code.
pub fn describe(code: u32) -> &'static str {
    match code {
        ER_ACCESS_DENIED => "access denied",
        ER_BAD_FIELD => "unknown column",
        ER_NO_SUCH_TABLE => "table does not exist",
        ER_SERVER_SHUTDOWN => "server shutdown in progress",
        ER_LOCK_WAIT_TIMEOUT => "lock wait timeout exceeded",
        ER_LOCK_DEADLOCK => "deadlock detected",
        CR_CONN_HOST_ERROR => "cannot connect to server",
        CR_SERVER_GONE => "server has gone away",
        CR_OUT_OF_MEMORY => "client out of memory",
        CR_SERVER_LOST => "connection lost during query",
        EPIPE => "broken pipe",
        _ => "unrecognized backend error",
    }
}

// =============================================================================
// Tests
// =============================================================================
