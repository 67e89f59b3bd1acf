//! Free-list pools for per-call scratch buffers.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// A free-list of reusable scratch buffers.
///
/// Hands out one buffer set per concurrent caller, grows on demand and
/// recycles returned sets. Each pool is owned by a single network and sized
/// for its topology; pools are never shared across network instances.
///
/// Buffers carry the epoch they were created under. [`Pool::invalidate`]
/// bumps the epoch, so sets checked out across a topology change are dropped
/// on return instead of re-entering the free list.
pub(crate) struct Pool<T> {
    free: Mutex<Vec<T>>,
    epoch: AtomicU64,
}

impl<T> Pool<T> {
    pub(crate) fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Takes a recycled buffer, or builds a fresh one with `make`. Returns
    /// the epoch the buffer belongs to, which must be passed back to
    /// [`Pool::put`].
    pub(crate) fn get_or(&self, make: impl FnOnce() -> T) -> (u64, T) {
        let epoch = self.epoch.load(Ordering::Acquire);
        let cached = self.free.lock().pop();
        (epoch, cached.unwrap_or_else(make))
    }

    /// Returns a buffer for reuse. Stale buffers, checked out before an
    /// [`invalidate`](Pool::invalidate), are dropped.
    pub(crate) fn put(&self, epoch: u64, buf: T) {
        if self.epoch.load(Ordering::Acquire) == epoch {
            self.free.lock().push(buf);
        }
    }

    /// Discards every cached buffer and retires outstanding ones. Required
    /// whenever the owning network's topology changes, since cached sets are
    /// sized for the old layers.
    pub(crate) fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.free.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_returned_buffers() {
        let pool: Pool<Vec<u8>> = Pool::new();
        let (epoch, mut buf) = pool.get_or(|| Vec::with_capacity(64));
        buf.push(7);
        pool.put(epoch, buf);

        let (_, buf) = pool.get_or(|| unreachable!("free list holds a buffer"));
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn grows_on_demand() {
        let pool: Pool<u32> = Pool::new();
        let (e1, a) = pool.get_or(|| 1);
        let (e2, b) = pool.get_or(|| 2);
        assert_eq!((a, b), (1, 2));
        pool.put(e1, a);
        pool.put(e2, b);
        assert_eq!(pool.free.lock().len(), 2);
    }

    #[test]
    fn invalidate_retires_outstanding_buffers() {
        let pool: Pool<u32> = Pool::new();
        let (old_epoch, buf) = pool.get_or(|| 1);
        pool.invalidate();
        pool.put(old_epoch, buf);
        assert!(pool.free.lock().is_empty());

        let (epoch, buf) = pool.get_or(|| 2);
        assert_eq!(buf, 2);
        pool.put(epoch, buf);
        assert_eq!(pool.free.lock().len(), 1);
    }
}
