use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Capability every external back-end connection must expose so the pool
/// can validate liveness before handing it out (§5 Shared-resource policy).
#[async_trait]
pub trait PoolableConnection: Send + 'static {
    async fn ping(&mut self) -> bool;
}

pub struct DbPoolConfig {
    pub max_open: usize,
    pub max_idle: usize,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
}

struct Entry<C> {
    conn: C,
    created_at: Instant,
    idle_since: Instant,
}

struct Inner<C> {
    idle: VecDeque<Entry<C>>,
    open: usize,
}

/// Connection pool to an external back-end: validates with a ping on
/// `get`, discards dead/expired connections.
pub struct DbPool<C> {
    config: DbPoolConfig,
    inner: Mutex<Inner<C>>,
    notify: Notify,
    factory: Box<dyn Fn() -> futures_boxed::BoxFuture<'static, Result<C>> + Send + Sync>,
}

mod futures_boxed {
    use std::future::Future;
    use std::pin::Pin;
    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

impl<C: PoolableConnection> DbPool<C> {
    pub fn new<F, Fut>(config: DbPoolConfig, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<C>> + Send + 'static,
    {
        Self {
            config,
            inner: Mutex::new(Inner {
                idle: VecDeque::new(),
                open: 0,
            }),
            notify: Notify::new(),
            factory: Box::new(move || Box::pin(factory())),
        }
    }

    pub async fn get(&self) -> Result<DbConn<'_, C>> {
        loop {
            let candidate = {
                let mut inner = self.inner.lock();
                inner.idle.pop_front()
            };
            if let Some(mut entry) = candidate {
                let expired = entry.created_at.elapsed() > self.config.max_lifetime
                    || entry.idle_since.elapsed() > self.config.idle_timeout;
                if expired || !entry.conn.ping().await {
                    let mut inner = self.inner.lock();
                    inner.open = inner.open.saturating_sub(1);
                    self.notify.notify_one();
                    continue;
                }
                return Ok(DbConn {
                    pool: self,
                    conn: Some(entry.conn),
                });
            }
            {
                let mut inner = self.inner.lock();
                if inner.open < self.config.max_open {
                    inner.open += 1;
                    drop(inner);
                    match (self.factory)().await {
                        Ok(conn) => return Ok(DbConn { pool: self, conn: Some(conn) }),
                        Err(e) => {
                            let mut inner = self.inner.lock();
                            inner.open = inner.open.saturating_sub(1);
                            return Err(e);
                        }
                    }
                }
            }
            self.notify.notified().await;
        }
    }

    fn release(&self, conn: C) {
        let mut inner = self.inner.lock();
        if inner.idle.len() >= self.config.max_idle {
            inner.open = inner.open.saturating_sub(1);
        } else {
            inner.idle.push_back(Entry {
                conn,
                created_at: Instant::now(),
                idle_since: Instant::now(),
            });
        }
        drop(inner);
        self.notify.notify_one();
    }
}

pub struct DbConn<'a, C: PoolableConnection> {
    pool: &'a DbPool<C>,
    conn: Option<C>,
}

impl<'a, C: PoolableConnection> std::ops::Deref for DbConn<'a, C> {
    type Target = C;
    fn deref(&self) -> &C {
        self.conn.as_ref().expect("conn taken")
    }
}

impl<'a, C: PoolableConnection> std::ops::DerefMut for DbConn<'a, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("conn taken")
    }
}

impl<'a, C: PoolableConnection> Drop for DbConn<'a, C> {
    fn drop(&mut self) {
        if let Some(c) = self.conn.take() {
            self.pool.release(c);
        }
    }
}
