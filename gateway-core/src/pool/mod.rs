//! Shared concurrency plumbing (C1): generic object pool, worker pool,
//! retry pool, and DB connection pool, used by every other component.

pub mod db_pool;
pub mod object_pool;
pub mod retry;
pub mod worker_pool;

pub use db_pool::{DbPool, DbPoolConfig, PoolableConnection};
pub use object_pool::{ObjectPool, Pooled};
pub use retry::{retry, RetryError, RetryPolicy};
pub use worker_pool::WorkerPool;
