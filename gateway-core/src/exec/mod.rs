//! Execution operators (C11): lazy row-batch producers composed from a
//! [`PhysicalPlan`](crate::plan::PhysicalPlan).

mod operators;

pub use operators::{
    build_operator, Aggregate, Filter, HashJoin, Limit, Projection, Sort, TableScan,
};

use crate::error::Result;
use crate::value::Row;
use async_trait::async_trait;

/// Rows are produced in small fixed-size batches to amortize per-call
/// overhead between operators (§4.8).
pub const BATCH_SIZE: usize = 256;

#[async_trait]
pub trait Operator: Send {
    async fn open(&mut self) -> Result<()>;
    /// Returns `Ok(None)` once exhausted.
    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>>;
    async fn close(&mut self) -> Result<()>;
}

/// Drains an operator end-to-end into a single row vector; used by
/// callers (session dispatch) that don't need streaming delivery.
pub async fn collect_all(op: &mut dyn Operator) -> Result<Vec<Row>> {
    op.open().await?;
    let mut out = Vec::new();
    while let Some(mut batch) = op.next_batch().await? {
        out.append(&mut batch);
    }
    op.close().await?;
    Ok(out)
}
