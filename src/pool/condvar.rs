//! Condition Variable
//!
//! A semaphore-backed wait/signal/broadcast primitive with explicit
//! waiting-count bookkeeping, used to block pool callers until another task
//! changes shared state. The primitive performs no mutual exclusion itself:
//! the caller supplies the protecting lock, which `wait` releases while
//! parked and re-acquires before returning.
//!
//! # Wake-token accounting
//!
//! Every wake token (semaphore permit) corresponds to exactly one decrement
//! of the waiting count. `signal` decrements when it releases a permit; a
//! waiter that times out reconciles under the bookkeeping lock — if a permit
//! is already pending, a signal raced the timeout and accounted for us, so
//! the waiter consumes the token and reports `Signaled`; otherwise it
//! decrements the count itself. A token is never consumed twice and a count
//! is never decremented twice.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, Semaphore};

/// Why `wait` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A signal or broadcast released this waiter.
    Signaled,
    /// The timeout elapsed with no signal.
    TimedOut,
}

/// Semaphore-backed condition variable.
pub struct CondVar {
    waiters: parking_lot::Mutex<usize>,
    sem: Semaphore,
}

impl CondVar {
    /// A condition variable with no pending permits and no waiters.
    pub fn new() -> Self {
        Self {
            waiters: parking_lot::Mutex::new(0),
            sem: Semaphore::new(0),
        }
    }

    /// Release `guard`, park until signaled or `timeout` elapses, then
    /// re-acquire the lock.
    ///
    /// The caller must pass the guard of `lock`; the returned guard is a
    /// fresh acquisition of the same lock. State observed before the wait
    /// must be re-checked after it: another task ran in between.
    pub async fn wait<'a, T>(
        &self,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
        timeout: Option<Duration>,
    ) -> (MutexGuard<'a, T>, WaitOutcome) {
        // Register before releasing the lock so a signaler that observes the
        // state we are waiting on cannot miss us.
        *self.waiters.lock() += 1;
        drop(guard);

        let outcome = match timeout {
            None => {
                match self.sem.acquire().await {
                    Ok(permit) => {
                        permit.forget();
                        WaitOutcome::Signaled
                    }
                    // The semaphore is owned by this CondVar and never
                    // closed.
                    Err(_) => WaitOutcome::Signaled,
                }
            }
            Some(timeout) => match tokio::time::timeout(timeout, self.sem.acquire()).await {
                Ok(Ok(permit)) => {
                    permit.forget();
                    WaitOutcome::Signaled
                }
                Ok(Err(_)) => WaitOutcome::Signaled,
                Err(_elapsed) => {
                    let mut waiters = self.waiters.lock();
                    match self.sem.try_acquire() {
                        // A signal raced the timeout: it already decremented
                        // the count for us, so consume its token.
                        Ok(permit) => {
                            permit.forget();
                            WaitOutcome::Signaled
                        }
                        Err(_) => {
                            *waiters -= 1;
                            WaitOutcome::TimedOut
                        }
                    }
                }
            },
        };

        (lock.lock().await, outcome)
    }

    /// Release one waiter, if any. No-op when nobody is waiting.
    pub fn signal(&self) {
        let mut waiters = self.waiters.lock();
        if *waiters > 0 {
            *waiters -= 1;
            self.sem.add_permits(1);
        }
    }

    /// Release every current waiter and zero the waiting count.
    pub fn broadcast(&self) {
        let mut waiters = self.waiters.lock();
        if *waiters > 0 {
            self.sem.add_permits(*waiters);
            *waiters = 0;
        }
    }

    /// Number of tasks currently parked in `wait`.
    pub fn waiter_count(&self) -> usize {
        *self.waiters.lock()
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, task};

    /// Poll until the condvar sees `n` registered waiters.
    async fn wait_for_waiters(cv: &CondVar, n: usize) {
        for _ in 0..500 {
            if cv.waiter_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("never reached {n} waiters (at {})", cv.waiter_count());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_signal_wakes_one_waiter() {
        let lock = Arc::new(Mutex::new(0u32));
        let cv = Arc::new(CondVar::new());

        let waiter = {
            let lock = Arc::clone(&lock);
            let cv = Arc::clone(&cv);
            tokio::spawn(async move {
                let guard = lock.lock().await;
                let (_guard, outcome) = cv.wait(&lock, guard, None).await;
                outcome
            })
        };

        wait_for_waiters(&cv, 1).await;
        cv.signal();
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Signaled);
        assert_eq!(cv.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_stays_parked_until_signaled() {
        let lock = Mutex::new(());
        let cv = CondVar::new();

        let guard = lock.lock().await;
        let mut wait = task::spawn(cv.wait(&lock, guard, None));

        // The first poll registers the waiter and parks; no spurious wake.
        assert_pending!(wait.poll());
        assert_eq!(cv.waiter_count(), 1);
        assert_pending!(wait.poll());

        cv.signal();
        assert!(wait.is_woken());
        let (_guard, outcome) = wait.await;
        assert_eq!(outcome, WaitOutcome::Signaled);
        assert_eq!(cv.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_signal_without_waiters_is_noop() {
        let cv = CondVar::new();
        cv.signal();
        cv.broadcast();
        assert_eq!(cv.waiter_count(), 0);

        // A later wait must not consume a stale token from the no-op above.
        let lock = Mutex::new(());
        let guard = lock.lock().await;
        let (_guard, outcome) = cv
            .wait(&lock, guard, Some(Duration::from_millis(20)))
            .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broadcast_wakes_exactly_all_waiters() {
        const N: usize = 8;
        let lock = Arc::new(Mutex::new(()));
        let cv = Arc::new(CondVar::new());

        let waiters: Vec<_> = (0..N)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let cv = Arc::clone(&cv);
                tokio::spawn(async move {
                    let guard = lock.lock().await;
                    let (_guard, outcome) = cv.wait(&lock, guard, None).await;
                    outcome
                })
            })
            .collect();

        wait_for_waiters(&cv, N).await;
        cv.broadcast();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), WaitOutcome::Signaled);
        }
        assert_eq!(cv.waiter_count(), 0);
        assert_eq!(cv.sem.available_permits(), 0);
    }

    #[tokio::test]
    async fn test_timeout_decrements_count_exactly_once() {
        let lock = Mutex::new(());
        let cv = CondVar::new();

        let guard = lock.lock().await;
        let (_guard, outcome) = cv
            .wait(&lock, guard, Some(Duration::from_millis(10)))
            .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(cv.waiter_count(), 0);

        // A signal after the timeout reconciliation is a no-op: the timed-out
        // waiter already gave its count back.
        cv.signal();
        assert_eq!(cv.sem.available_permits(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_wait_reacquires_lock_and_sees_new_state() {
        let lock = Arc::new(Mutex::new(false));
        let cv = Arc::new(CondVar::new());

        let waiter = {
            let lock = Arc::clone(&lock);
            let cv = Arc::clone(&cv);
            tokio::spawn(async move {
                let mut guard = lock.lock().await;
                while !*guard {
                    let (g, _) = cv.wait(&lock, guard, None).await;
                    guard = g;
                }
                true
            })
        };

        wait_for_waiters(&cv, 1).await;
        {
            let mut guard = lock.lock().await;
            *guard = true;
        }
        cv.signal();
        assert!(waiter.await.unwrap());
    }
}
