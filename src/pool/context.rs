//! Connection Context
//!
//! One live backend connection plus its prepared statements, owned by
//! exactly one holder at a time: either the pool's free set or the caller
//! that acquired it. Ownership transfers by value, so the single-owner
//! invariant is enforced by the type system rather than by convention.

use std::time::{Duration, Instant};

use crate::backend::{BackendConnection, BackendError, Row, StatementKind, Value};

/// A checked-out backend connection.
pub struct ConnectionContext {
    slot: u32,
    conn: Box<dyn BackendConnection>,
    created_at: Instant,
    last_used: Instant,
}

impl ConnectionContext {
    pub(crate) fn new(slot: u32, conn: Box<dyn BackendConnection>) -> Self {
        let now = Instant::now();
        Self {
            slot,
            conn,
            created_at: now,
            last_used: now,
        }
    }

    /// The pool-slot index identifying this context.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Time since this context was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since this context last executed a statement or was acquired.
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Execute one of the connection's prepared statements.
    ///
    /// Errors come back raw; the caller decides retry/discard/propagate via
    /// [`classify`](crate::backend::classify).
    pub async fn execute(
        &mut self,
        kind: StatementKind,
        params: &[Value],
    ) -> Result<Vec<Row>, BackendError> {
        self.last_used = Instant::now();
        self.conn.execute(kind, params).await
    }

    pub(crate) async fn close(mut self) {
        self.conn.close().await;
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("slot", &self.slot)
            .field("age", &self.age())
            .field("idle_for", &self.idle_for())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryConnector, RecordStore};
    use crate::backend::Connector;

    #[tokio::test]
    async fn test_execute_updates_last_used() {
        let store = RecordStore::new();
        let conn = MemoryConnector::new(store).connect().await.unwrap();
        let mut ctx = ConnectionContext::new(0, conn);

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(ctx.idle_for() >= Duration::from_millis(10));

        ctx.execute(StatementKind::SelectUpdateMarker, &[])
            .await
            .unwrap();
        assert!(ctx.idle_for() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_slot_identity() {
        let store = RecordStore::new();
        let conn = MemoryConnector::new(store).connect().await.unwrap();
        let ctx = ConnectionContext::new(7, conn);
        assert_eq!(ctx.slot(), 7);
    }
}
