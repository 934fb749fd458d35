//! Data-source abstraction (C6): the capability set every backend must
//! satisfy, plus the three backends named in the component design.

pub mod hybrid;
pub mod memory;
pub mod persistent;

pub use hybrid::{HybridConfig, HybridSource};
pub use memory::MemorySource;
pub use persistent::PersistentSource;

use crate::error::{CoreError, Result};
use crate::value::{ColumnDef, Row, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Between,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOp,
    pub value: Vec<Value>,
    pub logic_op: Option<LogicOp>,
    pub sub_filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub col: String,
    pub dir: SortDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub func: AggFn,
    pub column: Option<String>,
    pub alias: String,
}

/// Options threaded down to a [`DataSource::query`] call. `Default`
/// represents an *absent* options value — the "nil options must not
/// crash" requirement is implemented by callers passing `QueryOptions::default()`
/// rather than an `Option<QueryOptions>`, so there is no null to guard against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    pub select_columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub group_by: Vec<String>,
    pub aggregations: Vec<Aggregation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub row_count: u64,
}

/// The mandatory capability set (§4.4). Optional capabilities
/// (transactions, write support) are separate traits a backend may also
/// implement; callers probe for them with `as_any`/downcasting at the
/// catalog layer rather than this trait growing default-failing methods.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn is_writable(&self) -> bool;

    async fn list_tables(&self) -> Result<Vec<String>>;
    async fn table_info(&self, table: &str) -> Result<TableInfo>;

    /// `options` defaults to an empty [`QueryOptions`] rather than being
    /// optional (§4.4 "nil options must not crash").
    async fn query(&self, table: &str, options: &QueryOptions) -> Result<QueryResult>;

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<usize>;
    async fn update(&self, table: &str, filters: &[Filter], values: Row) -> Result<usize>;
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize>;

    async fn create_table(&self, table: &str, columns: Vec<ColumnDef>) -> Result<()>;
    async fn drop_table(&self, table: &str) -> Result<()>;
    async fn truncate_table(&self, table: &str) -> Result<()>;

    async fn execute(&self, raw_sql: &str) -> Result<QueryResult>;
}

/// Optional MVCC transaction capability (§4.4).
#[async_trait]
pub trait TransactionalSource: DataSource {
    async fn begin_tx(&self, read_only: bool) -> Result<u64>;
    async fn commit_tx(&self, tx_id: u64) -> Result<()>;
    async fn rollback_tx(&self, tx_id: u64) -> Result<()>;
}

/// Negative capability: a source implementing this returns `Err` from every
/// mutating method, used by read-only backends instead of panicking.
pub fn require_writable(source: &dyn DataSource) -> Result<()> {
    if source.is_writable() {
        Ok(())
    } else {
        Err(CoreError::Runtime("data source is read-only".into()))
    }
}

/// Applies `options.select_columns` to a full row using `all_columns` as
/// the authoritative column order for `full_row`. Fixes the documented
/// projection fast-path bug: a same-*sized* different *set* of columns
/// must not be treated as "no projection needed" (§4.4 known bug).
pub fn project_columns(
    all_columns: &[String],
    full_row: &Row,
    select_columns: &[String],
) -> Row {
    if select_columns.is_empty() || same_column_set(all_columns, select_columns) {
        return full_row.clone();
    }
    select_columns
        .iter()
        .map(|c| {
            all_columns
                .iter()
                .position(|name| name == c)
                .and_then(|idx| full_row.get(idx).cloned())
                .unwrap_or(Value::Null)
        })
        .collect()
}

fn same_column_set(all_columns: &[String], select_columns: &[String]) -> bool {
    if all_columns.len() != select_columns.len() {
        return false;
    }
    let mut a: Vec<&String> = all_columns.iter().collect();
    let mut b: Vec<&String> = select_columns.iter().collect();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_columns_compares_sets_not_lengths() {
        let all = vec!["a".to_string(), "b".to_string()];
        let row = vec![Value::Int(1), Value::Int(2)];
        // Same size, different set -> must actually project, not short-circuit.
        let select = vec!["b".to_string(), "c".to_string()];
        let projected = project_columns(&all, &row, &select);
        assert_eq!(projected, vec![Value::Int(2), Value::Null]);
    }

    #[test]
    fn project_columns_empty_selection_returns_full_row() {
        let all = vec!["a".to_string(), "b".to_string()];
        let row = vec![Value::Int(1), Value::Int(2)];
        let projected = project_columns(&all, &row, &[]);
        assert_eq!(projected, row);
    }

    #[test]
    fn default_query_options_is_safe_nil_equivalent() {
        let opts = QueryOptions::default();
        assert!(opts.select_columns.is_empty());
        assert!(opts.limit.is_none());
    }
}
