//! Synchronization Engine
//!
//! Detects out-of-process writes to the backend and invalidates stale cached
//! entries. The backend maintains a global, monotonically increasing update
//! marker; every pass compares it against the marker observed by the
//! previous pass and, only when it moved, asks for the ids of records
//! modified in between.
//!
//! # Pass semantics
//!
//! - The common case — nothing changed — costs a single round trip.
//! - `previous` advances only after a pass fully completes, so an aborted or
//!   failed pass retries from the same baseline on the next tick
//!   (idempotent catch-up).
//! - Passes never overlap: a tick that lands while a pass is in flight is
//!   dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendError, ErrorClass, Row, StatementKind, Value};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::pool::{ConnectionContext, Pool};

// =============================================================================
// Refresh Targets
// =============================================================================

/// Which record population a target caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDomain {
    Users,
    Groups,
}

/// A process-local cache that wants to hear about stale record ids.
///
/// `invalidate` runs on the sync task with no engine locks held; it must not
/// block on the pool.
pub trait RefreshTarget: Send + Sync {
    fn domain(&self) -> RecordDomain;
    fn invalidate(&self, ids: &[u32]);
}

/// What a pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReport {
    /// Another pass was already in flight; this tick was dropped.
    Skipped,
    /// The marker had not moved; no refresh queries were issued.
    NoChange { marker: u64 },
    /// Stale entries were refreshed and the baseline advanced.
    Refreshed { marker: u64, users: usize, groups: usize },
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct SyncState {
    /// Marker observed by the last completed pass.
    previous: u64,
    /// Most recent marker seen, completed pass or not. Invariant:
    /// `previous <= current`.
    current: u64,
}

// =============================================================================
// Engine
// =============================================================================

/// Timer-driven cache invalidation against the backend's update marker.
pub struct SyncEngine {
    pool: Arc<Pool>,
    config: SyncConfig,
    targets: Vec<Arc<dyn RefreshTarget>>,
    state: parking_lot::Mutex<SyncState>,
    in_pass: AtomicBool,
}

impl SyncEngine {
    pub fn new(pool: Arc<Pool>, config: SyncConfig, targets: Vec<Arc<dyn RefreshTarget>>) -> Self {
        Self {
            pool,
            config,
            targets,
            state: parking_lot::Mutex::new(SyncState {
                previous: 0,
                current: 0,
            }),
            in_pass: AtomicBool::new(false),
        }
    }

    /// Marker baseline of the last completed pass.
    pub fn previous(&self) -> u64 {
        self.state.lock().previous
    }

    /// Most recent marker observed.
    pub fn current(&self) -> u64 {
        self.state.lock().current
    }

    /// Run one synchronization pass.
    ///
    /// Safe to call directly (tests, forced refresh) or from the timer task.
    /// Concurrent calls coalesce: the loser returns [`SyncReport::Skipped`].
    #[instrument(skip(self))]
    pub async fn run_pass(&self) -> Result<SyncReport> {
        if self.in_pass.swap(true, Ordering::AcqRel) {
            debug!("pass already in flight, dropping tick");
            return Ok(SyncReport::Skipped);
        }
        let result = self.pass_inner().await;
        self.in_pass.store(false, Ordering::Release);
        result
    }

    async fn pass_inner(&self) -> Result<SyncReport> {
        // The wait for a connection is bounded by the tick interval (or the
        // pool's own acquire timeout, whichever is shorter); if the pool
        // cannot supply one in time, the pass aborts and the next tick
        // retries from the same baseline.
        let bound = self
            .config
            .tick_interval
            .min(self.pool.config().acquire_timeout);
        let mut ctx = match self.pool.acquire_within(bound).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "no pooled connection for sync pass");
                return Err(Error::SyncAborted(format!(
                    "could not acquire a connection: {e}"
                )));
            }
        };

        let marker = match self
            .query(&mut ctx, StatementKind::SelectUpdateMarker, &[])
            .await
        {
            Ok(rows) => first_u64(&rows).unwrap_or(0),
            Err(err) => return self.fail_pass(ctx, err).await,
        };

        let previous = {
            let mut state = self.state.lock();
            state.current = state.current.max(marker);
            state.previous
        };

        if marker <= previous {
            self.pool.release(ctx).await?;
            return Ok(SyncReport::NoChange { marker });
        }

        let since = &[Value::U64(previous)];
        let users = match self
            .query(&mut ctx, StatementKind::SelectUsersModifiedSince, since)
            .await
        {
            Ok(rows) => collect_ids(&rows),
            Err(err) => return self.fail_pass(ctx, err).await,
        };
        let groups = match self
            .query(&mut ctx, StatementKind::SelectGroupsModifiedSince, since)
            .await
        {
            Ok(rows) => collect_ids(&rows),
            Err(err) => return self.fail_pass(ctx, err).await,
        };

        self.pool.release(ctx).await?;

        for target in &self.targets {
            let stale = match target.domain() {
                RecordDomain::Users => &users,
                RecordDomain::Groups => &groups,
            };
            if !stale.is_empty() {
                target.invalidate(stale);
            }
        }

        // Only now has the baseline caught up.
        self.state.lock().previous = marker;
        debug!(marker, users = users.len(), groups = groups.len(), "refresh pass complete");
        Ok(SyncReport::Refreshed {
            marker,
            users: users.len(),
            groups: groups.len(),
        })
    }

    /// Execute a statement with a single internal retry on transient errors.
    async fn query(
        &self,
        ctx: &mut ConnectionContext,
        kind: StatementKind,
        params: &[Value],
    ) -> std::result::Result<Vec<Row>, BackendError> {
        match ctx.execute(kind, params).await {
            Ok(rows) => Ok(rows),
            Err(err) if err.class() == ErrorClass::Transient => {
                debug!(code = err.code, ?kind, "transient backend error, retrying once");
                ctx.execute(kind, params).await
            }
            Err(err) => Err(err),
        }
    }

    /// Dispose of the context per the error's class and abort the pass with
    /// `previous` untouched.
    async fn fail_pass(&self, ctx: ConnectionContext, err: BackendError) -> Result<SyncReport> {
        match err.class() {
            ErrorClass::Transient => {
                // Retry already spent; the connection itself is healthy.
                self.pool.release(ctx).await?;
                warn!(code = err.code, "sync pass aborted on transient error");
                Err(Error::SyncAborted(err.to_string()))
            }
            ErrorClass::Recoverable => {
                self.pool.discard(ctx).await?;
                warn!(code = err.code, "sync pass aborted, connection discarded");
                Err(Error::SyncAborted(err.to_string()))
            }
            ErrorClass::Fatal => {
                self.pool.discard(ctx).await?;
                Err(Error::Backend(err))
            }
        }
    }

    /// Start the recurring timer task.
    ///
    /// Ticks that land during a pass are dropped twice over: the interval
    /// skips missed ticks, and `run_pass` coalesces.
    pub fn spawn(self: &Arc<Self>) -> SyncHandle {
        let engine = Arc::clone(self);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task: JoinHandle<()> = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick fires immediately; consume it so the
            // first pass happens one full interval after spawn.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.run_pass().await {
                            Ok(report) => debug!(?report, "sync tick"),
                            // Aborts are retried on the next tick; nothing
                            // user-visible.
                            Err(e) => warn!(error = %e, "sync pass failed"),
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });

        SyncHandle { stop: stop_tx, task }
    }
}

/// Handle to the running timer task.
pub struct SyncHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the timer and wait for the task to exit. An in-flight pass
    /// finishes first.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

fn first_u64(rows: &[Row]) -> Option<u64> {
    rows.first().and_then(|r| r.first()).and_then(Value::as_u64)
}

fn collect_ids(rows: &[Row]) -> Vec<u32> {
    rows.iter()
        .filter_map(|r| r.first())
        .filter_map(Value::as_u32)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryConnector, RecordStore};
    use crate::config::PoolConfig;
    use assert_matches::assert_matches;
    use std::time::Duration;

    struct CountingTarget {
        domain: RecordDomain,
        seen: parking_lot::Mutex<Vec<u32>>,
    }

    impl CountingTarget {
        fn new(domain: RecordDomain) -> Arc<Self> {
            Arc::new(Self {
                domain,
                seen: parking_lot::Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<u32> {
            self.seen.lock().clone()
        }
    }

    impl RefreshTarget for CountingTarget {
        fn domain(&self) -> RecordDomain {
            self.domain
        }

        fn invalidate(&self, ids: &[u32]) {
            self.seen.lock().extend_from_slice(ids);
        }
    }

    async fn engine_with(
        store: &Arc<RecordStore>,
        targets: Vec<Arc<dyn RefreshTarget>>,
    ) -> Arc<SyncEngine> {
        let pool = Pool::init(
            PoolConfig {
                min_connections: 1,
                max_connections: 2,
                acquire_timeout: Duration::from_millis(100),
                ..PoolConfig::default()
            },
            Arc::new(MemoryConnector::new(Arc::clone(store))),
        )
        .await
        .unwrap();
        Arc::new(SyncEngine::new(pool, SyncConfig::default(), targets))
    }

    #[tokio::test]
    async fn test_unchanged_marker_is_a_noop_pass() {
        let store = RecordStore::new();
        let engine = engine_with(&store, vec![]).await;

        let before = store.query_count();
        let report = engine.run_pass().await.unwrap();
        assert_eq!(report, SyncReport::NoChange { marker: 0 });
        // Exactly one round trip: the marker query, no refresh queries.
        assert_eq!(store.query_count() - before, 1);
        assert_eq!(engine.previous(), 0);
    }

    #[tokio::test]
    async fn test_moved_marker_refreshes_and_advances_baseline() {
        let store = RecordStore::new();
        let users = CountingTarget::new(RecordDomain::Users);
        let groups = CountingTarget::new(RecordDomain::Groups);
        let engine = engine_with(&store, vec![users.clone(), groups.clone()]).await;

        store.upsert_user(100, "alice");
        store.upsert_group(10, "staff");
        store.upsert_user(101, "bob");

        let report = engine.run_pass().await.unwrap();
        assert_eq!(
            report,
            SyncReport::Refreshed {
                marker: 3,
                users: 2,
                groups: 1
            }
        );
        assert_eq!(engine.previous(), 3);

        let mut seen_users = users.seen();
        seen_users.sort_unstable();
        assert_eq!(seen_users, vec![100, 101]);
        assert_eq!(groups.seen(), vec![10]);
    }

    #[tokio::test]
    async fn test_second_pass_after_refresh_is_noop() {
        let store = RecordStore::new();
        let engine = engine_with(&store, vec![]).await;

        store.upsert_user(100, "alice");
        assert_matches!(
            engine.run_pass().await.unwrap(),
            SyncReport::Refreshed { .. }
        );
        assert_eq!(
            engine.run_pass().await.unwrap(),
            SyncReport::NoChange { marker: 1 }
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_baseline() {
        let store = RecordStore::new();
        let engine = engine_with(&store, vec![]).await;

        // Establish previous = 5.
        for i in 0..5 {
            store.upsert_user(100 + i, "u");
        }
        engine.run_pass().await.unwrap();
        assert_eq!(engine.previous(), 5);

        // Move the marker to 9, then fail the refresh: the marker query
        // passes, the users query hits a recoverable fault.
        for i in 0..4 {
            store.upsert_user(200 + i, "v");
        }
        store.inject_error_after(1, 2006);
        let err = engine.run_pass().await.unwrap_err();
        assert_matches!(err, Error::SyncAborted(_));
        assert_eq!(engine.previous(), 5);
        // The marker was still observed.
        assert_eq!(engine.current(), 9);

        // Next tick catches up from the same baseline.
        let report = engine.run_pass().await.unwrap();
        assert_eq!(
            report,
            SyncReport::Refreshed {
                marker: 9,
                users: 4,
                groups: 0
            }
        );
        assert_eq!(engine.previous(), 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pass_acquire_bounded_by_tick_interval() {
        let store = RecordStore::new();
        let pool = Pool::init(
            PoolConfig {
                min_connections: 1,
                max_connections: 1,
                acquire_timeout: Duration::from_secs(2),
                ..PoolConfig::default()
            },
            Arc::new(MemoryConnector::new(Arc::clone(&store))),
        )
        .await
        .unwrap();
        let engine = SyncEngine::new(
            Arc::clone(&pool),
            SyncConfig {
                tick_interval: Duration::from_millis(50),
            },
            vec![],
        );

        // With the pool held, the pass must give up within roughly one tick
        // interval, not the pool's much longer acquire timeout.
        let held = pool.acquire().await.unwrap();
        let started = std::time::Instant::now();
        let err = engine.run_pass().await.unwrap_err();
        assert_matches!(err, Error::SyncAborted(_));
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "pass waited {:?}",
            started.elapsed()
        );
        pool.release(held).await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_error_retried_once() {
        let store = RecordStore::new();
        let engine = engine_with(&store, vec![]).await;

        store.upsert_user(100, "alice");
        store.inject_error(1213); // deadlock on the marker query, then clean
        let report = engine.run_pass().await.unwrap();
        assert_matches!(report, SyncReport::Refreshed { .. });
    }

    #[tokio::test]
    async fn test_fatal_error_propagates() {
        let store = RecordStore::new();
        let engine = engine_with(&store, vec![]).await;

        store.inject_error(1045);
        assert_matches!(engine.run_pass().await, Err(Error::Backend(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_passes_coalesce() {
        let store = RecordStore::new();
        let engine = engine_with(&store, vec![]).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            tasks.push(tokio::spawn(async move { engine.run_pass().await }));
        }

        let mut skipped = 0;
        for task in tasks {
            if let Ok(SyncReport::Skipped) = task.await.unwrap() {
                skipped += 1;
            }
        }
        // At least one pass ran; everything that overlapped was dropped.
        assert!(skipped < 8);
    }

    #[tokio::test]
    async fn test_timer_task_runs_passes() {
        let store = RecordStore::new();
        let users = CountingTarget::new(RecordDomain::Users);
        let pool = Pool::init(
            PoolConfig {
                min_connections: 1,
                max_connections: 2,
                acquire_timeout: Duration::from_millis(100),
                ..PoolConfig::default()
            },
            Arc::new(MemoryConnector::new(Arc::clone(&store))),
        )
        .await
        .unwrap();
        let engine = Arc::new(SyncEngine::new(
            pool,
            SyncConfig {
                tick_interval: Duration::from_millis(20),
            },
            vec![users.clone()],
        ));

        store.upsert_user(100, "alice");
        let handle = engine.spawn();
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.shutdown().await;

        assert_eq!(engine.previous(), 1);
        assert_eq!(users.seen(), vec![100]);
    }
}
