// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! LIFO pool of reusable upstream-adapter handles.
//!
//! Amortizes construction of the adapter across fetches and bounds how many
//! concurrent handles exist. With `maxsize = 0` the pool never blocks and
//! fabricates a new handle on every acquire; with `maxsize > 0`, capacity is
//! tracked with a [`tokio::sync::Semaphore`] and handles are built lazily
//! the first time a permit is claimed, rather than up front — the
//! placeholder-slot trick the pool this is modeled on uses to avoid keeping
//! a separate counter of how many handles have been constructed.

use crate::error::PollError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct Inner<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    idle: Mutex<Vec<T>>,
    semaphore: Option<Arc<Semaphore>>,
}

/// A pool of `T` handles, retrieved LIFO (the most recently released handle
/// is the next one returned). Cloning a `ClientPool` shares the same
/// underlying handles and capacity; it does not require `T: Clone`.
pub struct ClientPool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ClientPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> ClientPool<T> {
    /// Build a pool. `maxsize = 0` means unbounded.
    pub fn new<F>(factory: F, maxsize: usize) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                factory: Box::new(factory),
                idle: Mutex::new(Vec::new()),
                semaphore: if maxsize == 0 {
                    None
                } else {
                    Some(Arc::new(Semaphore::new(maxsize)))
                },
            }),
        }
    }

    /// Acquire a handle, blocking forever if the pool is bounded and
    /// exhausted. Never fails.
    pub async fn acquire(&self) -> PoolGuard<T> {
        self.acquire_inner(None)
            .await
            .expect("unbounded wait cannot time out")
    }

    /// Acquire a handle, waiting up to `timeout` if the pool is bounded and
    /// exhausted. Fails with [`PollError::PoolEmpty`] if the timeout
    /// elapses first.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PoolGuard<T>, PollError> {
        self.acquire_inner(Some(timeout)).await
    }

    async fn acquire_inner(&self, timeout: Option<Duration>) -> Result<PoolGuard<T>, PollError> {
        let permit = match &self.inner.semaphore {
            None => None,
            Some(sem) => {
                let sem = sem.clone();
                let permit = match timeout {
                    None => sem
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed"),
                    Some(d) => tokio::time::timeout(d, sem.acquire_owned())
                        .await
                        .map_err(|_| PollError::PoolEmpty)?
                        .expect("semaphore is never closed"),
                };
                Some(permit)
            }
        };

        let obj = {
            let mut idle = self.inner.idle.lock().expect("pool mutex poisoned");
            idle.pop()
        }
        .unwrap_or_else(|| (self.inner.factory)());

        Ok(PoolGuard {
            inner: self.inner.clone(),
            obj: Some(obj),
            _permit: permit,
        })
    }

    /// Number of idle handles currently sitting in the pool. Changes at any
    /// time; useful for tests and metrics only.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().expect("pool mutex poisoned").len()
    }
}

/// A borrowed handle. Dereferences to `T`; returns the handle to the pool
/// when dropped, on every exit path including a panic unwind.
pub struct PoolGuard<T> {
    inner: Arc<Inner<T>>,
    obj: Option<T>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<T> std::ops::Deref for PoolGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.obj.as_ref().expect("guard dropped twice")
    }
}

impl<T> std::ops::DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.obj.as_mut().expect("guard dropped twice")
    }
}

impl<T> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if let Some(obj) = self.obj.take() {
            self.inner
                .idle
                .lock()
                .expect("pool mutex poisoned")
                .push(obj);
        }
    }
}
