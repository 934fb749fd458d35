use crate::error::{CoreError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Generic object pool: factory + destroyer + max-size + min/max-idle.
///
/// `put` destroys the returned object outright when the idle list is
/// already at `max_idle` (§5 Shared-resource policy).
pub struct ObjectPool<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    destroyer: Box<dyn Fn(T) + Send + Sync>,
    inner: Mutex<Inner<T>>,
    notify: Notify,
    max_size: usize,
    max_idle: usize,
    created: AtomicU64,
    destroyed: AtomicU64,
}

struct Inner<T> {
    idle: Vec<T>,
    held: usize,
    closed: bool,
}

/// A checked-out object; returns itself to the pool's idle list on drop
/// unless the pool has been closed in the meantime.
pub struct Pooled<T> {
    value: Option<T>,
    pool: Arc<ObjectPool<T>>,
}

impl<T> std::ops::Deref for Pooled<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value.as_ref().expect("value taken")
    }
}

impl<T> std::ops::DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("value taken")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(v) = self.value.take() {
            self.pool.put(v);
        }
    }
}

impl<T: Send + 'static> ObjectPool<T> {
    pub fn new(
        max_size: usize,
        max_idle: usize,
        factory: impl Fn() -> T + Send + Sync + 'static,
        destroyer: impl Fn(T) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            factory: Box::new(factory),
            destroyer: Box::new(destroyer),
            inner: Mutex::new(Inner {
                idle: Vec::new(),
                held: 0,
                closed: false,
            }),
            notify: Notify::new(),
            max_size,
            max_idle,
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
        })
    }

    /// Checks out an object, waiting (context-cancellable) if the pool is
    /// at capacity and nothing is idle.
    pub async fn get(self: &Arc<Self>) -> Result<Pooled<T>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(CoreError::PoolClosed);
                }
                if let Some(v) = inner.idle.pop() {
                    inner.held += 1;
                    return Ok(Pooled {
                        value: Some(v),
                        pool: self.clone(),
                    });
                }
                if inner.held < self.max_size {
                    inner.held += 1;
                    drop(inner);
                    let v = (self.factory)();
                    self.created.fetch_add(1, Ordering::Relaxed);
                    return Ok(Pooled {
                        value: Some(v),
                        pool: self.clone(),
                    });
                }
            }
            self.notify.notified().await;
        }
    }

    fn put(&self, v: T) {
        let mut inner = self.inner.lock();
        inner.held -= 1;
        if inner.closed || inner.idle.len() >= self.max_idle {
            (self.destroyer)(v);
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        } else {
            inner.idle.push(v);
        }
        drop(inner);
        self.notify.notify_one();
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        for v in inner.idle.drain(..) {
            (self.destroyer)(v);
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_waiters();
    }

    /// Conservation invariant (§8): `created - destroyed == held + idle`.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }
    pub fn held(&self) -> usize {
        self.inner.lock().held
    }
    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseResult;

    #[tokio::test]
    async fn conservation_holds_across_checkout_and_return() {
        let pool = ObjectPool::new(4, 4, || 0u32, |_| {});
        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        assert_eq!(pool.held(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.held(), 0);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.created() - pool.destroyed(), (pool.held() + pool.idle_count()) as u64);
    }

    #[tokio::test]
    async fn put_destroys_when_idle_is_full() {
        let pool = ObjectPool::new(4, 1, || 0u32, |_| {});
        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.destroyed(), 1);
    }

    proptest! {
        // §8: `created - destroyed == held + idle` at every observation
        // point, across an arbitrary interleaving of checkouts and returns.
        #[test]
        fn conservation_holds_across_random_checkout_return_sequence(ops in prop::collection::vec(any::<bool>(), 1..50)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: TestCaseResult = rt.block_on(async {
                let pool = ObjectPool::new(4, 4, || 0u32, |_| {});
                let mut held: Vec<Pooled<u32>> = Vec::new();
                for checkout in ops {
                    if checkout && held.len() < 4 {
                        held.push(pool.get().await.unwrap());
                    } else if let Some(p) = held.pop() {
                        drop(p);
                    }
                    prop_assert_eq!(
                        pool.created() - pool.destroyed(),
                        (pool.held() + pool.idle_count()) as u64
                    );
                }
                Ok(())
            });
            result?;
        }
    }
}
