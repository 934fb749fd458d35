use super::{project_columns, Filter, QueryOptions, QueryResult};
use crate::error::{CoreError, Result};
use crate::sidecar::{load_table_snapshot, save_table_snapshot, TableSnapshot};
use crate::value::{ColumnDef, Row};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

struct Table {
    columns: Vec<ColumnDef>,
    rows: Vec<Row>,
    dirty: bool,
}

/// Disk-backed backend (§4.4 "Persistent KV", e.g. an LSM-style engine in a
/// real deployment). Keeps the working set in memory guarded by a
/// read/write lock and persists the whole-table snapshot via the bincode
/// sidecar format (§4.10) on every mutating call, mirroring the teacher's
/// length-prefixed WAL persistence style but snapshot- rather than
/// entry-based, since there is no log to replay here.
pub struct PersistentSource {
    data_dir: PathBuf,
    tables: RwLock<HashMap<String, Table>>,
    connected: std::sync::atomic::AtomicBool,
}

impl PersistentSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            tables: RwLock::new(HashMap::new()),
            connected: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.kv"))
    }

    async fn flush(&self, table: &str) -> Result<()> {
        let snapshot = {
            let tables = self.tables.read();
            let t = tables
                .get(table)
                .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
            TableSnapshot {
                columns: t.columns.clone(),
                rows: t.rows.clone(),
            }
        };
        save_table_snapshot(&self.table_path(table), &snapshot).await?;
        if let Some(t) = self.tables.write().get_mut(table) {
            t.dirty = false;
        }
        Ok(())
    }
}

#[async_trait]
impl super::DataSource for PersistentSource {
    async fn connect(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        self.connected.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let dirty: Vec<String> = self
            .tables
            .read()
            .iter()
            .filter(|(_, t)| t.dirty)
            .map(|(name, _)| name.clone())
            .collect();
        for table in dirty {
            self.flush(&table).await?;
        }
        self.connected.store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
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
            row_count: t.rows.len() as u64,
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
            .filter(|row| options.filters.iter().all(|f| row_matches(row, &t.columns, f)))
            .cloned()
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

        debug!(table, returned = projected.len(), "persistent source query");
        Ok(QueryResult {
            columns: out_columns,
            rows: projected,
        })
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<usize> {
        let count = {
            let mut tables = self.tables.write();
            let t = tables
                .get_mut(table)
                .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
            let count = rows.len();
            t.rows.extend(rows);
            t.dirty = true;
            count
        };
        self.flush(table).await?;
        Ok(count)
    }

    async fn update(&self, table: &str, filters: &[Filter], values: Row) -> Result<usize> {
        let updated = {
            let mut tables = self.tables.write();
            let t = tables
                .get_mut(table)
                .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
            let columns = t.columns.clone();
            let mut updated = 0;
            for row in t.rows.iter_mut() {
                if filters.iter().all(|f| row_matches(row, &columns, f)) {
                    *row = values.clone();
                    updated += 1;
                }
            }
            if updated > 0 {
                t.dirty = true;
            }
            updated
        };
        if updated > 0 {
            self.flush(table).await?;
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let deleted = {
            let mut tables = self.tables.write();
            let t = tables
                .get_mut(table)
                .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
            let columns = t.columns.clone();
            let before = t.rows.len();
            t.rows.retain(|row| !filters.iter().all(|f| row_matches(row, &columns, f)));
            let deleted = before - t.rows.len();
            if deleted > 0 {
                t.dirty = true;
            }
            deleted
        };
        if deleted > 0 {
            self.flush(table).await?;
        }
        Ok(deleted)
    }

    async fn create_table(&self, table: &str, columns: Vec<ColumnDef>) -> Result<()> {
        {
            let mut tables = self.tables.write();
            if tables.contains_key(table) {
                return Err(CoreError::Semantic(format!("table {table} already exists")));
            }
            tables.insert(
                table.to_string(),
                Table {
                    columns,
                    rows: vec![],
                    dirty: true,
                },
            );
        }
        self.flush(table).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.tables
            .write()
            .remove(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
        let path = self.table_path(table);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(table, error = %e, "failed to remove persistent sidecar on drop");
            }
        }
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        {
            let mut tables = self.tables.write();
            let t = tables
                .get_mut(table)
                .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))?;
            t.rows.clear();
            t.dirty = true;
        }
        self.flush(table).await
    }

    async fn execute(&self, raw_sql: &str) -> Result<QueryResult> {
        Err(CoreError::Runtime(format!(
            "persistent source cannot execute raw SQL directly: {raw_sql}"
        )))
    }
}

impl PersistentSource {
    /// Loads a table's current on-disk snapshot into memory, registering
    /// it in the catalog. A missing sidecar for a file-backed table is a
    /// `StorageError`, never a panic (§4.10).
    pub async fn load_table(&self, table: &str) -> Result<()> {
        let snapshot = load_table_snapshot(&self.table_path(table)).await?;
        self.tables.write().insert(
            table.to_string(),
            Table {
                columns: snapshot.columns,
                rows: snapshot.rows,
                dirty: false,
            },
        );
        Ok(())
    }
}

fn row_matches(row: &Row, columns: &[ColumnDef], filter: &Filter) -> bool {
    let idx = columns.iter().position(|c| c.name == filter.field);
    let matched = idx
        .and_then(|i| row.get(i))
        .map(|v| match filter.operator {
            super::FilterOp::Eq => filter.value.first().map(|fv| fv == v).unwrap_or(false),
            super::FilterOp::Ne => filter.value.first().map(|fv| fv != v).unwrap_or(true),
            super::FilterOp::Lt => filter.value.first().map(|fv| v < fv).unwrap_or(false),
            super::FilterOp::Le => filter.value.first().map(|fv| v <= fv).unwrap_or(false),
            super::FilterOp::Gt => filter.value.first().map(|fv| v > fv).unwrap_or(false),
            super::FilterOp::Ge => filter.value.first().map(|fv| v >= fv).unwrap_or(false),
            super::FilterOp::In => filter.value.iter().any(|fv| fv == v),
            super::FilterOp::Between => match (filter.value.first(), filter.value.get(1)) {
                (Some(lo), Some(hi)) => v >= lo && v <= hi,
                _ => false,
            },
            super::FilterOp::Like => false,
        })
        .unwrap_or(false);
    if filter.sub_filters.is_empty() {
        return matched;
    }
    let subs: Vec<bool> = filter.sub_filters.iter().map(|f| row_matches(row, columns, f)).collect();
    match filter.logic_op {
        Some(super::LogicOp::Or) => matched || subs.into_iter().any(|b| b),
        _ => matched && subs.into_iter().all(|b| b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::DataSource;
    use crate::value::Value;

    fn col(name: &str) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            nullable: true,
            mysql_type: 3,
        }
    }

    #[tokio::test]
    async fn insert_persists_and_reloads() {
        let dir = std::env::temp_dir().join(format!("gateway-core-test-{}", uuid::Uuid::new_v4()));
        let src = PersistentSource::new(&dir);
        src.connect().await.unwrap();
        src.create_table("t", vec![col("id")]).await.unwrap();
        src.insert("t", vec![vec![Value::Int(42)]]).await.unwrap();

        let reloaded = PersistentSource::new(&dir);
        reloaded.connect().await.unwrap();
        reloaded.load_table("t").await.unwrap();
        let result = reloaded.query("t", &QueryOptions::default()).await.unwrap();
        assert_eq!(result.rows, vec![vec![Value::Int(42)]]);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
