//! Bounded, thread-safe resource pools (spec §4.2). A hand-rolled
//! `Mutex<VecDeque<T>>` + `Condvar` free list with RAII checkout guards —
//! the spec names this implementation strategy directly, so no pooling
//! crate (`r2d2`, `deadpool`) is introduced here.

pub mod db_pool;
pub mod directory_pool;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{PkdError, PkdResult};

/// Builds new pooled resources and checks out-of-pool ones for health.
pub trait ResourceFactory<T>: Send + Sync {
    fn build(&self) -> PkdResult<T>;
    /// Cheap liveness probe run on every checkout (e.g. `SELECT 1`).
    fn is_healthy(&self, resource: &mut T) -> bool;
}

struct Inner<T> {
    free: Mutex<VecDeque<T>>,
    condvar: Condvar,
    outstanding: Mutex<usize>,
    max: usize,
}

/// A bounded pool over resource type `T`. Shared by any number of worker
/// threads; internal locking is a mutex + condition variable over the free
/// list, matching spec §4.2 exactly.
pub struct Pool<T> {
    inner: Arc<Inner<T>>,
    factory: Arc<dyn ResourceFactory<T>>,
    acquire_timeout: Duration,
}

impl<T: Send + 'static> Pool<T> {
    pub fn new(
        min: usize,
        max: usize,
        acquire_timeout: Duration,
        factory: Arc<dyn ResourceFactory<T>>,
    ) -> PkdResult<Self> {
        let mut free = VecDeque::with_capacity(max);
        for _ in 0..min {
            free.push_back(factory.build()?);
        }
        Ok(Pool {
            inner: Arc::new(Inner {
                free: Mutex::new(free),
                condvar: Condvar::new(),
                outstanding: Mutex::new(min),
                max,
            }),
            factory,
            acquire_timeout,
        })
    }

    /// Checks out one resource, blocking up to `acquire_timeout`. On
    /// timeout, fails with `PoolExhausted` (spec §4.2). The health check
    /// runs on every checkout; unhealthy resources are discarded and
    /// rebuilt rather than handed to the caller.
    pub fn acquire(&self) -> PkdResult<PoolGuard<T>> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut free = self.inner.free.lock().unwrap();
        loop {
            if let Some(mut resource) = free.pop_front() {
                if self.factory.is_healthy(&mut resource) {
                    return Ok(PoolGuard {
                        resource: Some(resource),
                        pool: self.inner.clone(),
                    });
                }
                // Unhealthy: drop it and try to build a replacement if
                // under the outstanding cap, otherwise keep waiting.
                let mut outstanding = self.inner.outstanding.lock().unwrap();
                if *outstanding < self.inner.max {
                    drop(outstanding_guard_noop(&mut outstanding));
                    let rebuilt = self.factory.build()?;
                    return Ok(PoolGuard {
                        resource: Some(rebuilt),
                        pool: self.inner.clone(),
                    });
                }
                // At cap and not rebuilding: the discarded resource is gone
                // for good, so the live-resource count must drop with it or
                // the pool will believe it's at capacity forever.
                *outstanding -= 1;
                drop(outstanding);
                continue;
            }

            let mut outstanding = self.inner.outstanding.lock().unwrap();
            if *outstanding < self.inner.max {
                *outstanding += 1;
                drop(outstanding);
                let resource = self.factory.build()?;
                return Ok(PoolGuard {
                    resource: Some(resource),
                    pool: self.inner.clone(),
                });
            }
            drop(outstanding);

            let now = Instant::now();
            if now >= deadline {
                return Err(PkdError::PoolExhausted {
                    waited_ms: self.acquire_timeout.as_millis() as u64,
                });
            }
            let (guard, timeout_result) = self
                .inner
                .condvar
                .wait_timeout(free, deadline - now)
                .unwrap();
            free = guard;
            if timeout_result.timed_out() && free.is_empty() {
                return Err(PkdError::PoolExhausted {
                    waited_ms: self.acquire_timeout.as_millis() as u64,
                });
            }
        }
    }
}

/// No-op helper kept separate so the `MutexGuard` borrow ends before the
/// (potentially slow) `factory.build()` call below it, without holding the
/// outstanding-count lock across that I/O.
fn outstanding_guard_noop(_guard: &mut std::sync::MutexGuard<usize>) {}

/// RAII checkout handle: returns the resource to the free list on every
/// exit path (normal return, early `?`, or panic unwind).
pub struct PoolGuard<T> {
    resource: Option<T>,
    pool: Arc<Inner<T>>,
}

impl<T> std::ops::Deref for PoolGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.resource.as_ref().expect("resource taken before drop")
    }
}

impl<T> std::ops::DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.resource.as_mut().expect("resource taken before drop")
    }
}

impl<T> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            let mut free = self.pool.free.lock().unwrap();
            free.push_back(resource);
            drop(free);
            self.pool.condvar.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        built: AtomicUsize,
    }

    impl ResourceFactory<u32> for CountingFactory {
        fn build(&self) -> PkdResult<u32> {
            Ok(self.built.fetch_add(1, Ordering::SeqCst) as u32)
        }
        fn is_healthy(&self, _resource: &mut u32) -> bool {
            true
        }
    }

    #[test]
    fn acquire_and_release_recycles_the_same_resource() {
        let factory = Arc::new(CountingFactory {
            built: AtomicUsize::new(0),
        });
        let pool = Pool::new(1, 2, Duration::from_millis(200), factory).unwrap();
        let first_value = *pool.acquire().unwrap();
        let second_value = *pool.acquire().unwrap();
        assert_eq!(first_value, second_value);
    }

    #[test]
    fn exhaustion_times_out_with_pool_exhausted() {
        let factory = Arc::new(CountingFactory {
            built: AtomicUsize::new(0),
        });
        let pool = Pool::new(0, 1, Duration::from_millis(50), factory).unwrap();
        let _held = pool.acquire().unwrap();
        let result = pool.acquire();
        assert!(matches!(result, Err(PkdError::PoolExhausted { .. })));
    }
}
