//! Reentrant tree lock
//!
//! Every structural mutation of the page tree serializes on one named lock.
//! The lock itself is provided by a [`LockService`] (process-local here,
//! possibly cluster-wide elsewhere). [`TreeLock`] layers reentrancy on top:
//! depth counters live in the [`RequestContext`], and only the outermost
//! acquire/release of a request reaches the service.
//!
//! # Invariants
//!
//! - Release happens on every exit path once acquire succeeded, including
//!   when the future driving [`TreeLock::run`] is dropped
//! - A failed outermost acquire leaves the depth counter unchanged
//! - Two requests never hold the lock at the same time

use crate::services::context::RequestContext;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Errors from locking operations
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was not granted within the wait limit
    #[error("timed out after {waited:?} waiting for lock '{name}'")]
    Timeout { name: String, waited: Duration },

    /// Unlock of a lock that is not held
    #[error("lock '{name}' is not held")]
    NotHeld { name: String },

    /// Lock backend failure
    #[error("lock backend failed: {0}")]
    Backend(String),
}

/// Named mutual exclusion
#[async_trait]
pub trait LockService: Send + Sync {
    async fn lock(&self, name: &str) -> Result<(), LockError>;

    async fn unlock(&self, name: &str) -> Result<(), LockError>;
}

/// Process-local lock service backed by one semaphore per name
#[derive(Debug)]
pub struct LocalLockService {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
    wait: Duration,
}

impl LocalLockService {
    pub fn new(wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            wait,
        }
    }

    fn semaphore(&self, name: &str) -> Arc<Semaphore> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1))),
        )
    }
}

impl Default for LocalLockService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl LockService for LocalLockService {
    async fn lock(&self, name: &str) -> Result<(), LockError> {
        let semaphore = self.semaphore(name);
        let acquired = tokio::time::timeout(self.wait, semaphore.acquire()).await;
        match acquired {
            Ok(Ok(permit)) => {
                // Held until `unlock` returns the permit
                permit.forget();
                Ok(())
            }
            Ok(Err(closed)) => Err(LockError::Backend(closed.to_string())),
            Err(_) => Err(LockError::Timeout {
                name: name.to_string(),
                waited: self.wait,
            }),
        }
    }

    async fn unlock(&self, name: &str) -> Result<(), LockError> {
        let semaphore = self.semaphore(name);
        if semaphore.available_permits() > 0 {
            return Err(LockError::NotHeld {
                name: name.to_string(),
            });
        }
        semaphore.add_permits(1);
        Ok(())
    }
}

/// Reentrant view of a named lock
#[derive(Clone)]
pub struct TreeLock {
    service: Arc<dyn LockService>,
    name: String,
}

impl TreeLock {
    pub fn new(service: Arc<dyn LockService>, name: impl Into<String>) -> Self {
        Self {
            service,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire for the request; nested acquisitions only bump the depth
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<(), LockError> {
        if !ctx.enter_lock(&self.name) {
            return Ok(());
        }
        let mut entered = LockGuard::new(self, ctx, false);
        self.service.lock(&self.name).await?;
        entered.disarm();
        tracing::debug!("Acquired tree lock '{}'", self.name);
        Ok(())
    }

    /// Release for the request; only the outermost release unlocks
    pub async fn release(&self, ctx: &RequestContext) -> Result<(), LockError> {
        if !ctx.leave_lock(&self.name) {
            return Ok(());
        }
        self.service.unlock(&self.name).await?;
        tracing::debug!("Released tree lock '{}'", self.name);
        Ok(())
    }

    /// Run `body` while holding the lock, releasing on every exit path
    pub async fn run<T, E, Fut>(&self, ctx: &RequestContext, body: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        self.acquire(ctx).await?;
        let mut held = LockGuard::new(self, ctx, true);
        let outcome = body.await;
        held.disarm();
        let released = self.release(ctx).await;
        let value = outcome?;
        released?;
        Ok(value)
    }
}

/// Undoes an acquisition when dropped while armed
///
/// Covers futures cancelled between acquire and release. The depth is
/// restored at once; the service unlock is spawned since `Drop` cannot
/// await.
struct LockGuard<'a> {
    lock: &'a TreeLock,
    ctx: &'a RequestContext,
    held: bool,
    armed: bool,
}

impl<'a> LockGuard<'a> {
    fn new(lock: &'a TreeLock, ctx: &'a RequestContext, held: bool) -> Self {
        Self {
            lock,
            ctx,
            held,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || !self.ctx.leave_lock(&self.lock.name) || !self.held {
            return;
        }
        let service = Arc::clone(&self.lock.service);
        let name = self.lock.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Releasing tree lock '{}' after cancellation", name);
                handle.spawn(async move {
                    if let Err(e) = service.unlock(&name).await {
                        tracing::warn!("Failed to release tree lock '{}': {}", name, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("Tree lock '{}' dropped outside a runtime; not released", name);
            }
        }
    }
}

impl std::fmt::Debug for TreeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeLock").field("name", &self.name).finish()
    }
}
