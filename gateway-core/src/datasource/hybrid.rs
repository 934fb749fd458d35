use super::{memory::MemorySource, persistent::PersistentSource, DataSource, Filter, QueryOptions, QueryResult};
use crate::error::{CoreError, Result};
use crate::value::{ColumnDef, Row};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub persistent: bool,
    pub sync_on_write: bool,
    pub cache_in_memory: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            persistent: false,
            sync_on_write: false,
            cache_in_memory: true,
        }
    }
}

/// Owns a memory source and a KV source plus per-table routing config
/// (§4.4 "Hybrid router"). `dual_write` tables are written to both
/// (memory first, KV second; the first error wins; the reported inserted
/// count always comes from the memory write).
pub struct HybridSource {
    memory: MemorySource,
    kv: PersistentSource,
    table_config: DashMap<String, HybridConfig>,
    dual_write_tables: DashMap<String, bool>,
}

impl HybridSource {
    pub fn new(kv_data_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            memory: MemorySource::new(),
            kv: PersistentSource::new(kv_data_dir),
            table_config: DashMap::new(),
            dual_write_tables: DashMap::new(),
        }
    }

    pub fn set_table_config(&self, table: &str, config: HybridConfig) {
        self.table_config.insert(table.to_string(), config);
    }

    pub fn mark_dual_write(&self, table: &str, enabled: bool) {
        self.dual_write_tables.insert(table.to_string(), enabled);
    }

    fn config_for(&self, table: &str) -> HybridConfig {
        self.table_config.get(table).map(|c| c.clone()).unwrap_or_default()
    }

    fn is_dual_write(&self, table: &str) -> bool {
        self.dual_write_tables.get(table).map(|v| *v).unwrap_or(false)
    }

    fn write_source(&self, table: &str) -> &dyn DataSource {
        if self.config_for(table).persistent {
            &self.kv
        } else {
            &self.memory
        }
    }

    fn read_source(&self, table: &str) -> &dyn DataSource {
        self.write_source(table)
    }

    /// Copies schema + rows from memory to the KV side and flips the
    /// table's persistence flag (§4.4).
    pub async fn memory_to_persistent(&self, table: &str) -> Result<()> {
        let info = self.memory.table_info(table).await?;
        let rows = self
            .memory
            .query(table, &QueryOptions::default())
            .await?
            .rows;
        if self.kv.table_info(table).await.is_err() {
            self.kv.create_table(table, info.columns).await?;
        }
        self.kv.truncate_table(table).await?;
        self.kv.insert(table, rows).await?;
        let mut config = self.config_for(table);
        config.persistent = true;
        self.set_table_config(table, config);
        Ok(())
    }

    /// The inverse migration: KV -> memory, flips persistence flag off.
    pub async fn persistent_to_memory(&self, table: &str) -> Result<()> {
        let info = self.kv.table_info(table).await?;
        let rows = self.kv.query(table, &QueryOptions::default()).await?.rows;
        if self.memory.table_info(table).await.is_err() {
            self.memory.create_table(table, info.columns).await?;
        }
        self.memory.truncate_table(table).await?;
        self.memory.insert(table, rows).await?;
        let mut config = self.config_for(table);
        config.persistent = false;
        self.set_table_config(table, config);
        Ok(())
    }
}

#[async_trait]
impl DataSource for HybridSource {
    async fn connect(&self) -> Result<()> {
        self.memory.connect().await?;
        self.kv.connect().await
    }

    async fn close(&self) -> Result<()> {
        self.memory.close().await?;
        self.kv.close().await
    }

    fn is_connected(&self) -> bool {
        self.memory.is_connected() && self.kv.is_connected()
    }

    fn is_writable(&self) -> bool {
        true
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut tables = self.memory.list_tables().await?;
        for t in self.kv.list_tables().await? {
            if !tables.contains(&t) {
                tables.push(t);
            }
        }
        Ok(tables)
    }

    async fn table_info(&self, table: &str) -> Result<super::TableInfo> {
        match self.read_source(table).table_info(table).await {
            Ok(info) => Ok(info),
            Err(_) if self.config_for(table).persistent => self.memory.table_info(table).await,
            Err(e) => Err(e),
        }
    }

    async fn query(&self, table: &str, options: &QueryOptions) -> Result<QueryResult> {
        match self.read_source(table).query(table, options).await {
            Ok(result) => Ok(result),
            Err(e) if self.config_for(table).persistent => {
                warn!(table, error = %e, "KV read failed, falling back to memory");
                self.memory.query(table, options).await
            }
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<usize> {
        if self.is_dual_write(table) {
            let count = self.memory.insert(table, rows.clone()).await?;
            if let Err(e) = self.kv.insert(table, rows).await {
                return Err(CoreError::PartialWrite {
                    applied: count,
                    source: Box::new(e),
                });
            }
            return Ok(count);
        }
        self.write_source(table).insert(table, rows).await
    }

    async fn update(&self, table: &str, filters: &[Filter], values: Row) -> Result<usize> {
        if self.is_dual_write(table) {
            let count = self.memory.update(table, filters, values.clone()).await?;
            if let Err(e) = self.kv.update(table, filters, values).await {
                return Err(CoreError::PartialWrite {
                    applied: count,
                    source: Box::new(e),
                });
            }
            return Ok(count);
        }
        self.write_source(table).update(table, filters, values).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        if self.is_dual_write(table) {
            let count = self.memory.delete(table, filters).await?;
            if let Err(e) = self.kv.delete(table, filters).await {
                return Err(CoreError::PartialWrite {
                    applied: count,
                    source: Box::new(e),
                });
            }
            return Ok(count);
        }
        self.write_source(table).delete(table, filters).await
    }

    async fn create_table(&self, table: &str, columns: Vec<ColumnDef>) -> Result<()> {
        self.memory.create_table(table, columns.clone()).await?;
        if self.config_for(table).persistent || self.is_dual_write(table) {
            self.kv.create_table(table, columns).await?;
        }
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mem = self.memory.drop_table(table).await;
        let kv = self.kv.drop_table(table).await;
        mem.or(kv)
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        self.write_source(table).truncate_table(table).await
    }

    async fn execute(&self, raw_sql: &str) -> Result<QueryResult> {
        Err(CoreError::Runtime(format!(
            "hybrid source cannot execute raw SQL directly: {raw_sql}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn col(name: &str) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            nullable: true,
            mysql_type: 3,
        }
    }

    #[tokio::test]
    async fn dual_write_writes_both_sides_and_counts_from_memory() {
        let dir = std::env::temp_dir().join(format!("hybrid-test-{}", uuid::Uuid::new_v4()));
        let hybrid = HybridSource::new(&dir);
        hybrid.connect().await.unwrap();
        hybrid.create_table("t", vec![col("id")]).await.unwrap();
        hybrid.mark_dual_write("t", true);

        let count = hybrid.insert("t", vec![vec![Value::Int(1)]]).await.unwrap();
        assert_eq!(count, 1);

        let mem_rows = hybrid.memory.query("t", &QueryOptions::default()).await.unwrap();
        let kv_rows = hybrid.kv.query("t", &QueryOptions::default()).await.unwrap();
        assert_eq!(mem_rows.rows.len(), 1);
        assert_eq!(kv_rows.rows.len(), 1);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn kv_failure_mid_dual_write_reports_partial_count() {
        let dir = std::env::temp_dir().join(format!("hybrid-partial-{}", uuid::Uuid::new_v4()));
        let hybrid = HybridSource::new(&dir);
        hybrid.connect().await.unwrap();
        hybrid.create_table("t", vec![col("id")]).await.unwrap();
        hybrid.mark_dual_write("t", true);
        hybrid.insert("t", vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]])
            .await
            .unwrap();

        // Force the KV side to fail on the next write.
        hybrid.kv.drop_table("t").await.unwrap();

        let err = hybrid.insert("t", vec![vec![Value::Int(4)]]).await.unwrap_err();
        match err {
            CoreError::PartialWrite { applied, .. } => assert_eq!(applied, 1),
            other => panic!("expected PartialWrite, got {other:?}"),
        }

        let mem_rows = hybrid.memory.query("t", &QueryOptions::default()).await.unwrap();
        assert_eq!(mem_rows.rows.len(), 4);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn migration_flips_persistence_flag() {
        let dir = std::env::temp_dir().join(format!("hybrid-migrate-{}", uuid::Uuid::new_v4()));
        let hybrid = HybridSource::new(&dir);
        hybrid.connect().await.unwrap();
        hybrid.create_table("t", vec![col("id")]).await.unwrap();
        hybrid.memory.insert("t", vec![vec![Value::Int(7)]]).await.unwrap();

        hybrid.memory_to_persistent("t").await.unwrap();
        assert!(hybrid.config_for("t").persistent);
        let result = hybrid.query("t", &QueryOptions::default()).await.unwrap();
        assert_eq!(result.rows, vec![vec![Value::Int(7)]]);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
