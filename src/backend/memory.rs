//! In-Memory Backend Adapter
//!
//! Serves user/group records from an in-process table instead of a real SQL
//! server. Use this for:
//!
//! - Unit and integration testing without a database
//! - Embedding the engine in a single-process deployment
//! - CI pipelines
//!
//! The store keeps a monotonically increasing update marker: every write
//! bumps it and stamps the written row, exactly the shape the sync engine
//! expects from the real backend. Fault injection hooks (`inject_error`,
//! `fail_connects`, `fail_prepare`) let tests script client-library failures
//! by error code.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BackendConnection, BackendError, ConnectError, Connector, Row, StatementKind, Value};

// =============================================================================
// Record Store
// =============================================================================

#[derive(Debug, Clone)]
struct RecordRow {
    id: u32,
    name: String,
    modified_at: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    users: Vec<RecordRow>,
    groups: Vec<RecordRow>,
    marker: u64,
    // Fault injection script: one entry per upcoming query, `Some(code)`
    // fails it, `None` lets it through.
    scripted: VecDeque<Option<u32>>,
    connect_failures: u32,
    prepare_failure: Option<(StatementKind, u32)>,
    // Counters observed by tests.
    connects: u64,
    queries: u64,
}

/// Shared record table standing in for the backend database.
///
/// Clone the `Arc` freely: one store can back many connections, mirroring
/// several pooled connections against one server.
#[derive(Debug, Default)]
pub struct RecordStore {
    inner: Mutex<StoreInner>,
}

impl RecordStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or update a user record, bumping the global marker.
    pub fn upsert_user(&self, id: u32, name: &str) -> u64 {
        let mut inner = self.inner.lock();
        inner.marker += 1;
        let marker = inner.marker;
        upsert(&mut inner.users, id, name, marker);
        marker
    }

    /// Insert or update a group record, bumping the global marker.
    pub fn upsert_group(&self, id: u32, name: &str) -> u64 {
        let mut inner = self.inner.lock();
        inner.marker += 1;
        let marker = inner.marker;
        upsert(&mut inner.groups, id, name, marker);
        marker
    }

    /// The current global modification marker.
    pub fn marker(&self) -> u64 {
        self.inner.lock().marker
    }

    /// Queue an error code; the next `execute` on any connection fails with
    /// it. Codes queue FIFO, one per query.
    pub fn inject_error(&self, code: u32) {
        self.inner.lock().scripted.push_back(Some(code));
    }

    /// Let the next `skip` queries through, then fail the one after with
    /// `code`.
    pub fn inject_error_after(&self, skip: usize, code: u32) {
        let mut inner = self.inner.lock();
        for _ in 0..skip {
            inner.scripted.push_back(None);
        }
        inner.scripted.push_back(Some(code));
    }

    /// Make the next `n` connection attempts fail with a host-unreachable
    /// error.
    pub fn fail_connects(&self, n: u32) {
        self.inner.lock().connect_failures = n;
    }

    /// Make every subsequent connect fail statement preparation for `kind`
    /// with the given error code. Cleared with [`RecordStore::clear_faults`].
    pub fn fail_prepare(&self, kind: StatementKind, code: u32) {
        self.inner.lock().prepare_failure = Some((kind, code));
    }

    /// Drop all pending fault injection.
    pub fn clear_faults(&self) {
        let mut inner = self.inner.lock();
        inner.scripted.clear();
        inner.connect_failures = 0;
        inner.prepare_failure = None;
    }

    /// Number of successful connection handshakes so far.
    pub fn connect_count(&self) -> u64 {
        self.inner.lock().connects
    }

    /// Number of statement executions so far (including injected failures).
    pub fn query_count(&self) -> u64 {
        self.inner.lock().queries
    }
}

fn upsert(rows: &mut Vec<RecordRow>, id: u32, name: &str, marker: u64) {
    match rows.iter_mut().find(|r| r.id == id) {
        Some(row) => {
            row.name = name.to_string();
            row.modified_at = marker;
        }
        None => rows.push(RecordRow {
            id,
            name: name.to_string(),
            modified_at: marker,
        }),
    }
}

// =============================================================================
// Connector
// =============================================================================

/// [`Connector`] over a shared [`RecordStore`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: Arc<RecordStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>, ConnectError> {
        {
            let mut inner = self.store.inner.lock();
            if inner.connect_failures > 0 {
                inner.connect_failures -= 1;
                return Err(ConnectError::Handshake(BackendError::new(
                    2003,
                    "cannot connect to server",
                )));
            }
            // The prepare loop a real adapter runs against the server.
            for kind in StatementKind::ALL {
                if let Some((failing, code)) = inner.prepare_failure {
                    if failing == kind {
                        return Err(ConnectError::Prepare {
                            kind,
                            source: BackendError::new(code, super::describe(code)),
                        });
                    }
                }
                let _ = kind.sql();
            }
            inner.connects += 1;
        }
        Ok(Box::new(MemoryConnection {
            store: Arc::clone(&self.store),
            open: true,
        }))
    }
}

// =============================================================================
// Connection
// =============================================================================

struct MemoryConnection {
    store: Arc<RecordStore>,
    open: bool,
}

#[async_trait]
impl BackendConnection for MemoryConnection {
    async fn execute(
        &mut self,
        kind: StatementKind,
        params: &[Value],
    ) -> Result<Vec<Row>, BackendError> {
        let mut inner = self.store.inner.lock();
        inner.queries += 1;

        if !self.open {
            return Err(BackendError::new(2006, "server has gone away"));
        }
        if let Some(Some(code)) = inner.scripted.pop_front() {
            return Err(BackendError::new(code, super::describe(code)));
        }

        let rows = match kind {
            StatementKind::SelectUpdateMarker => {
                vec![vec![Value::U64(inner.marker)]]
            }
            StatementKind::SelectUserByName => select_by_name(&inner.users, params)?,
            StatementKind::SelectGroupByName => select_by_name(&inner.groups, params)?,
            StatementKind::SelectUserById => select_by_id(&inner.users, params)?,
            StatementKind::SelectGroupById => select_by_id(&inner.groups, params)?,
            StatementKind::SelectUsersModifiedSince => modified_since(&inner.users, params)?,
            StatementKind::SelectGroupsModifiedSince => modified_since(&inner.groups, params)?,
        };
        Ok(rows)
    }

    async fn close(&mut self) {
        self.open = false;
    }
}

fn select_by_name(rows: &[RecordRow], params: &[Value]) -> Result<Vec<Row>, BackendError> {
    let name = params
        .first()
        .and_then(Value::as_text)
        .ok_or_else(|| BackendError::new(1054, "expected a name parameter"))?;
    Ok(rows
        .iter()
        .filter(|r| r.name == name)
        .map(|r| vec![Value::U32(r.id), Value::Text(r.name.clone())])
        .collect())
}

fn select_by_id(rows: &[RecordRow], params: &[Value]) -> Result<Vec<Row>, BackendError> {
    let id = params
        .first()
        .and_then(Value::as_u32)
        .ok_or_else(|| BackendError::new(1054, "expected an id parameter"))?;
    Ok(rows
        .iter()
        .filter(|r| r.id == id)
        .map(|r| vec![Value::U32(r.id), Value::Text(r.name.clone())])
        .collect())
}

fn modified_since(rows: &[RecordRow], params: &[Value]) -> Result<Vec<Row>, BackendError> {
    let since = params
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| BackendError::new(1054, "expected a marker parameter"))?;
    Ok(rows
        .iter()
        .filter(|r| r.modified_at > since)
        .map(|r| vec![Value::U32(r.id)])
        .collect())
}

// =============================================================================
// Tests
// =============================================================================
