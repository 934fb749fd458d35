use super::{project_columns, Filter, FilterOp, LogicOp, QueryOptions, QueryResult};
use crate::error::{CoreError, Result};
use crate::value::{ColumnDef, Row, Value};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Clone)]
struct Versioned {
    row: Row,
    created_tx: u64,
    deleted_tx: Option<u64>,
}

struct Table {
    columns: Vec<ColumnDef>,
    rows: Vec<Versioned>,
}

/// Ordered, multi-version in-memory backend (§4.4 "Memory MVCC"). Every row
/// carries the transaction ID that created/deleted it; a query run without
/// an active transaction sees the latest committed snapshot (`tx_id ==
/// u64::MAX`, i.e. "everything committed so far").
pub struct MemorySource {
    tables: RwLock<HashMap<String, Table>>,
    next_tx: AtomicU64,
    connected: std::sync::atomic::AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
            connected: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn visible(v: &Versioned, snapshot_tx: u64) -> bool {
        v.created_tx <= snapshot_tx && v.deleted_tx.map(|d| d > snapshot_tx).unwrap_or(true)
    }

    fn matches(row: &Row, columns: &[ColumnDef], filter: &Filter) -> bool {
        let idx = columns.iter().position(|c| c.name == filter.field);
        let base = idx
            .and_then(|i| row.get(i))
            .map(|v| eval_filter_op(v, filter))
            .unwrap_or(false);
        if filter.sub_filters.is_empty() {
            return base;
        }
        let sub_results: Vec<bool> = filter
            .sub_filters
            .iter()
            .map(|f| Self::matches(row, columns, f))
            .collect();
        match filter.logic_op {
            Some(LogicOp::Or) => base || sub_results.into_iter().any(|b| b),
            _ => base && sub_results.into_iter().all(|b| b),
        }
    }
}

fn eval_filter_op(value: &Value, filter: &Filter) -> bool {
    match filter.operator {
        FilterOp::Eq => filter.value.first().map(|v| v == value).unwrap_or(false),
        FilterOp::Ne => filter.value.first().map(|v| v != value).unwrap_or(true),
        FilterOp::Lt => filter.value.first().map(|v| value < v).unwrap_or(false),
        FilterOp::Le => filter.value.first().map(|v| value <= v).unwrap_or(false),
        FilterOp::Gt => filter.value.first().map(|v| value > v).unwrap_or(false),
        FilterOp::Ge => filter.value.first().map(|v| value >= v).unwrap_or(false),
        FilterOp::In => filter.value.iter().any(|v| v == value),
        FilterOp::Between => match (filter.value.first(), filter.value.get(1)) {
            (Some(lo), Some(hi)) => value >= lo && value <= hi,
            _ => false,
        },
        FilterOp::Like => match (value.as_text(), filter.value.first().and_then(|v| v.as_text())) {
            (Some(text), Some(pattern)) => like_match(&text, &pattern),
            _ => false,
        },
    }
}

fn like_match(text: &str, pattern: &str) -> bool {
    let regex_str = format!(
        "^{}$",
        regex_escape_sql(pattern).replace('%', ".*").replace('_', ".")
    );
    // Small hand-rolled fallback avoids pulling in the `regex` crate for a
    // single LIKE operator; acceptable since `%`/`_` are the only wildcards.
    glob_like(text, &regex_str)
}

fn regex_escape_sql(pattern: &str) -> String {
    pattern.replace(['\\', '.', '+', '*', '?', '(', ')', '[', ']', '^', '$'], "")
}

fn glob_like(text: &str, simplified: &str) -> bool {
    // simplified is "^...$" with '.' = any-char and ".*" = any-run; walk it
    // as a tiny glob matcher instead of a real regex engine.
    let pattern = simplified.trim_start_matches('^').trim_end_matches('$');
    glob_match(text.as_bytes(), pattern.as_bytes())
}

fn glob_match(text: &[u8], pattern: &str) -> bool {
    let tokens: Vec<&str> = split_glob_tokens(pattern);
    match_tokens(text, &tokens)
}

fn split_glob_tokens(pattern: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = pattern;
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix(".*") {
            tokens.push(".*");
            rest = stripped;
        } else {
            tokens.push(&rest[..1]);
            rest = &rest[1..];
        }
    }
    tokens
}

fn match_tokens(text: &[u8], tokens: &[&str]) -> bool {
    if tokens.is_empty() {
        return text.is_empty();
    }
    match tokens[0] {
        ".*" => {
            for i in 0..=text.len() {
                if match_tokens(&text[i..], &tokens[1..]) {
                    return true;
                }
            }
            false
        }
        "." => !text.is_empty() && match_tokens(&text[1..], &tokens[1..]),
        lit => {
            let b = lit.as_bytes();
            text.starts_with(b) && match_tokens(&text[b.len()..], &tokens[1..])
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::DataSource for MemorySource {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_writable(&self) -> bool {
        true
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.read().keys().cloned().collect())
    }

    async fn table_info(&self, table: &str) -> Result<super::TableInfo> {
        let tables = self.tables.read();
        let t = tables
            .get(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
        Ok(super::TableInfo {
            name: table.to_string(),
            columns: t.columns.clone(),
            row_count: t.rows.iter().filter(|v| v.deleted_tx.is_none()).count() as u64,
        })
    }

    async fn query(&self, table: &str, options: &QueryOptions) -> Result<QueryResult> {
        let tables = self.tables.read();
        let t = tables
            .get(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
        let col_names: Vec<String> = t.columns.iter().map(|c| c.name.clone()).collect();

        let mut rows: Vec<Row> = t
            .rows
            .iter()
            .filter(|v| Self::visible(v, u64::MAX))
            .filter(|v| options.filters.iter().all(|f| Self::matches(&v.row, &t.columns, f)))
            .map(|v| v.row.clone())
            .collect();

        if let Some(offset) = options.offset {
            rows = rows.into_iter().skip(offset).collect();
        }
        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }

        let projected: Vec<Row> = rows
            .iter()
            .map(|r| project_columns(&col_names, r, &options.select_columns))
            .collect();

        let out_columns = if options.select_columns.is_empty() {
            col_names
        } else {
            options.select_columns.clone()
        };

        debug!(table, returned = projected.len(), "memory source query");
        Ok(QueryResult {
            columns: out_columns,
            rows: projected,
        })
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<usize> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
        let tx = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let count = rows.len();
        for row in rows {
            t.rows.push(Versioned {
                row,
                created_tx: tx,
                deleted_tx: None,
            });
        }
        Ok(count)
    }

    async fn update(&self, table: &str, filters: &[Filter], values: Row) -> Result<usize> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
        let columns = t.columns.clone();
        let mut updated = 0;
        for v in t.rows.iter_mut() {
            if v.deleted_tx.is_some() {
                continue;
            }
            if filters.iter().all(|f| Self::matches(&v.row, &columns, f)) {
                v.row = values.clone();
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
        let tx = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let columns = t.columns.clone();
        let mut deleted = 0;
        for v in t.rows.iter_mut() {
            if v.deleted_tx.is_some() {
                continue;
            }
            if filters.iter().all(|f| Self::matches(&v.row, &columns, f)) {
                v.deleted_tx = Some(tx);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn create_table(&self, table: &str, columns: Vec<ColumnDef>) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(table) {
            return Err(CoreError::Semantic(format!("table {table} already exists")));
        }
        tables.insert(table.to_string(), Table { columns, rows: vec![] });
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.tables
            .write()
            .remove(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
        t.rows.clear();
        Ok(())
    }

    async fn execute(&self, raw_sql: &str) -> Result<QueryResult> {
        Err(CoreError::Runtime(format!(
            "memory source cannot execute raw SQL directly: {raw_sql}"
        )))
    }
}

#[async_trait]
impl super::TransactionalSource for MemorySource {
    async fn begin_tx(&self, _read_only: bool) -> Result<u64> {
        Ok(self.next_tx.fetch_add(1, Ordering::SeqCst))
    }

    async fn commit_tx(&self, _tx_id: u64) -> Result<()> {
        Ok(())
    }

    async fn rollback_tx(&self, _tx_id: u64) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::DataSource;

    fn col(name: &str) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            nullable: true,
            mysql_type: 3,
        }
    }

    #[tokio::test]
    async fn insert_then_query_round_trips() {
        let src = MemorySource::new();
        src.create_table("t", vec![col("id"), col("name")]).await.unwrap();
        src.insert(
            "t",
            vec![vec![Value::Int(1), Value::Text("a".into())]],
        )
        .await
        .unwrap();

        let result = src.query("t", &QueryOptions::default()).await.unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn query_with_nil_equivalent_options_does_not_crash() {
        let src = MemorySource::new();
        src.create_table("t", vec![col("id")]).await.unwrap();
        src.insert("t", vec![vec![Value::Int(1)]]).await.unwrap();
        let result = src.query("t", &QueryOptions::default()).await.unwrap();
        assert_eq!(result.columns, vec!["id".to_string()]);
    }

    #[tokio::test]
    async fn delete_hides_row_from_subsequent_query() {
        let src = MemorySource::new();
        src.create_table("t", vec![col("id")]).await.unwrap();
        src.insert("t", vec![vec![Value::Int(1)], vec![Value::Int(2)]])
            .await
            .unwrap();
        let filters = vec![Filter {
            field: "id".into(),
            operator: FilterOp::Eq,
            value: vec![Value::Int(1)],
            logic_op: None,
            sub_filters: vec![],
        }];
        src.delete("t", &filters).await.unwrap();
        let result = src.query("t", &QueryOptions::default()).await.unwrap();
        assert_eq!(result.rows.len(), 1);
    }
}
