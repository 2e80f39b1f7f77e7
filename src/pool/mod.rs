//! Connection Pool
//!
//! Owns a bounded set of backend connections, each carrying the full
//! prepared-statement set, and hands them out one owner at a time.
//!
//! # Design
//!
//! - Free/in-use bookkeeping lives under a single `tokio::sync::Mutex`;
//!   checked-out slots are tracked in an [`IdList`], which is what lets
//!   `release` detect a context that was never acquired.
//! - Blocking happens only in `acquire`, on the [`CondVar`], always with a
//!   bounded timeout. No lock is ever held across a backend call: connect
//!   and statement execution run with the context exclusively owned.
//! - The pool is elastic between `min_connections` and `max_connections`:
//!   contexts are created lazily past the eager minimum and destroyed on
//!   release once they outlive the idle threshold.

pub mod condvar;
pub mod context;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::backend::{ConnectError, Connector, ErrorClass};
use crate::collections::{IdList, IdListKind};
use crate::config::PoolConfig;
use crate::error::{Error, Result};

pub use condvar::{CondVar, WaitOutcome};
pub use context::ConnectionContext;

// =============================================================================
// State
// =============================================================================

struct PoolState {
    /// Contexts owned by the pool, ready to hand out. LIFO: the most
    /// recently released context is the next one out.
    free: Vec<ConnectionContext>,
    /// Slots currently checked out, by id.
    in_use: IdList,
    /// Next never-used slot id.
    next_slot: u32,
    /// Set by `finalize`; refuses further acquires.
    closed: bool,
}

impl PoolState {
    fn total(&self) -> usize {
        self.free.len() + self.in_use.len()
    }
}

/// Counters and gauges describing pool activity.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub free: usize,
    pub in_use: usize,
    pub created: u64,
    pub destroyed: u64,
    pub acquire_timeouts: u64,
}

// =============================================================================
// Pool
// =============================================================================

/// Bounded pool of backend connection contexts.
pub struct Pool {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    available: CondVar,
    created: AtomicU64,
    destroyed: AtomicU64,
    acquire_timeouts: AtomicU64,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// Build the pool and eagerly open `min_connections` connections.
    ///
    /// Any failure while meeting the minimum tears the partial pool down and
    /// propagates: a backend that cannot satisfy the configured floor at
    /// startup is a deployment problem, not something to limp past.
    #[instrument(skip_all, fields(min = config.min_connections, max = config.max_connections))]
    pub async fn init(config: PoolConfig, connector: Arc<dyn Connector>) -> Result<Arc<Self>> {
        config.validate()?;

        let pool = Arc::new(Self {
            config,
            connector,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                in_use: IdList::new(IdListKind::PoolSlots),
                next_slot: 0,
                closed: false,
            }),
            available: CondVar::new(),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            acquire_timeouts: AtomicU64::new(0),
        });

        for _ in 0..pool.config.min_connections {
            let slot = {
                let mut state = pool.state.lock().await;
                let slot = state.next_slot;
                state.next_slot += 1;
                slot
            };
            match pool.open_context(slot).await {
                Ok(ctx) => pool.state.lock().await.free.push(ctx),
                Err(e) => {
                    let free = std::mem::take(&mut pool.state.lock().await.free);
                    futures::future::join_all(free.into_iter().map(ConnectionContext::close))
                        .await;
                    return Err(e);
                }
            }
        }

        debug!(opened = pool.config.min_connections, "pool initialized");
        Ok(pool)
    }

    /// Check a context out of the pool, blocking up to the configured
    /// acquire timeout when the pool is at capacity.
    ///
    /// Ownership of the returned context transfers to the caller until it is
    /// passed back through [`release`](Pool::release) or
    /// [`discard`](Pool::discard).
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<ConnectionContext> {
        self.acquire_within(self.config.acquire_timeout).await
    }

    /// Like [`acquire`](Pool::acquire), but bounded by an explicit timeout
    /// instead of the configured one, for callers whose own deadline is
    /// shorter than the pool's.
    pub async fn acquire_within(&self, timeout: Duration) -> Result<ConnectionContext> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().await;

        loop {
            if state.closed {
                // The wake that got us here may have been meant for a parked
                // finalize; hand it on before bailing out.
                self.available.signal();
                return Err(Error::InvalidArgument(
                    "acquire on a finalized pool".into(),
                ));
            }

            if let Some(mut ctx) = state.free.pop() {
                state.in_use.insert(ctx.slot());
                ctx.touch();
                return Ok(ctx);
            }

            if state.total() < self.config.max_connections {
                // Reserve the slot so capacity accounting covers the
                // in-flight create, then connect outside the lock.
                let slot = state.next_slot;
                state.next_slot += 1;
                state.in_use.insert(slot);
                drop(state);

                return match self.open_context(slot).await {
                    Ok(ctx) => Ok(ctx),
                    Err(e) => {
                        self.state.lock().await.in_use.remove(slot);
                        // The reservation is gone; let a blocked waiter try
                        // the lazy-create path itself.
                        self.available.signal();
                        Err(e)
                    }
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(Error::PoolExhausted {
                    waited_ms: timeout.as_millis() as u64,
                });
            }

            let (guard, outcome) = self.available.wait(&self.state, state, Some(remaining)).await;
            state = guard;
            if outcome == WaitOutcome::TimedOut {
                debug!("acquire wait timed out, re-checking free set once");
            }
        }
    }

    /// Return a context to the pool.
    ///
    /// Applies the idle-expiry policy: a context past the idle threshold is
    /// destroyed instead of re-pooled (the pool re-creates lazily on
    /// demand), as long as that does not take the pool below its minimum.
    /// Releasing a context that is not checked out is a contract violation;
    /// the context is closed, never re-pooled.
    pub async fn release(&self, ctx: ConnectionContext) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.in_use.remove(ctx.slot()) {
            drop(state);
            warn!(slot = ctx.slot(), "release of a context that is not checked out");
            ctx.close().await;
            return Err(Error::InternalContractViolation(
                "release of a context that is not checked out",
            ));
        }

        let expired = ctx.age() > self.config.idle_timeout
            && state.total() >= self.config.min_connections;
        if expired {
            drop(state);
            debug!(slot = ctx.slot(), age_ms = ctx.age().as_millis() as u64, "idle expiry");
            ctx.close().await;
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        } else {
            state.free.push(ctx);
            drop(state);
        }

        self.available.signal();
        Ok(())
    }

    /// Drop a context hit by a recoverable or fatal backend error.
    ///
    /// The connection is closed rather than re-pooled; capacity frees up, so
    /// the next `acquire` may lazily create a replacement. The pool does not
    /// retry anything itself — retry policy belongs to the caller.
    pub async fn discard(&self, ctx: ConnectionContext) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.in_use.remove(ctx.slot()) {
            drop(state);
            warn!(slot = ctx.slot(), "discard of a context that is not checked out");
            ctx.close().await;
            return Err(Error::InternalContractViolation(
                "discard of a context that is not checked out",
            ));
        }
        drop(state);

        ctx.close().await;
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        self.available.signal();
        Ok(())
    }

    /// Shut the pool down.
    ///
    /// Refuses new acquires, waits up to `grace` for checked-out contexts to
    /// come back, then force-forgets stragglers and closes every pooled
    /// connection.
    #[instrument(skip(self))]
    pub async fn finalize(&self, grace: Duration) -> Result<()> {
        let deadline = Instant::now() + grace;
        let mut state = self.state.lock().await;
        state.closed = true;

        while !state.in_use.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    outstanding = state.in_use.len(),
                    "grace period lapsed, abandoning checked-out contexts"
                );
                state.in_use.clear();
                break;
            }
            let (guard, _outcome) = self.available.wait(&self.state, state, Some(remaining)).await;
            state = guard;
        }

        let free = std::mem::take(&mut state.free);
        drop(state);

        let closed = free.len();
        futures::future::join_all(free.into_iter().map(ConnectionContext::close)).await;
        self.destroyed.fetch_add(closed as u64, Ordering::Relaxed);
        debug!(closed, "pool finalized");
        Ok(())
    }

    /// Current pool activity counters.
    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        PoolStats {
            free: state.free.len(),
            in_use: state.in_use.len(),
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
        }
    }

    /// The pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Open a connection and wrap it in a context. Runs without the pool
    /// lock held.
    async fn open_context(&self, slot: u32) -> Result<ConnectionContext> {
        match self.connector.connect().await {
            Ok(conn) => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Ok(ConnectionContext::new(slot, conn))
            }
            Err(ConnectError::Prepare { kind, source }) => {
                warn!(?kind, code = source.code, "statement preparation rejected");
                Err(Error::StatementPrepareFailed { kind, source })
            }
            Err(ConnectError::Handshake(err)) => {
                warn!(code = err.code, "backend handshake failed");
                match err.class() {
                    ErrorClass::Fatal => Err(Error::Backend(err)),
                    _ => Err(Error::ConnectionLost(err)),
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
