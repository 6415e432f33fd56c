//! Re-entrant schema history lock.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Exclusive lock over a schema history table.
///
/// The holding thread may acquire it again; every acquisition is matched by
/// exactly one release when its guard drops. Other threads block until the
/// depth returns to zero. Clones share the same lock.
#[derive(Clone, Default)]
pub struct HistoryLock {
    inner: Arc<LockInner>,
}

#[derive(Default)]
struct LockInner {
    mutex: ReentrantMutex<()>,
    depth: AtomicUsize,
}

impl HistoryLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is held by the current thread.
    pub fn acquire(&self) -> HistoryLockGuard<'_> {
        let guard = self.inner.mutex.lock();
        self.inner.depth.fetch_add(1, Ordering::SeqCst);
        HistoryLockGuard {
            _guard: guard,
            depth: &self.inner.depth,
        }
    }

    /// Run `f` while holding the lock.
    pub fn with<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.acquire();
        f()
    }

    /// Number of outstanding acquisitions.
    pub fn depth(&self) -> usize {
        self.inner.depth.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for HistoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLock")
            .field("depth", &self.depth())
            .finish()
    }
}

/// Releases one acquisition of a [`HistoryLock`] when dropped.
pub struct HistoryLockGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
    depth: &'a AtomicUsize,
}

impl Drop for HistoryLockGuard<'_> {
    fn drop(&mut self) {
        // Runs before the mutex guard field is dropped.
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
