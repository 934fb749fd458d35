//! Ambient table catalog (SPEC_FULL §4.11): resolves a table name to its
//! backing [`DataSource`], column list, and the statistics/full-text
//! handles a query against it may consult.

use crate::datasource::DataSource;
use crate::error::{CoreError, Result};
use crate::fulltext::InvertedIndex;
use crate::optimizer::{FeedbackStore, StatisticsStore};
use crate::value::{ColumnDef, ColumnDescriptor};
use dashmap::DashMap;
use std::sync::Arc;

struct TableEntry {
    source: Arc<dyn DataSource>,
    columns: Vec<ColumnDef>,
    fulltext: Option<Arc<InvertedIndex>>,
}

/// Process-wide registry of tables, shared statistics/feedback stores, and
/// per-table full-text indexes (§3 "Session: a handle to the underlying
/// data-source catalog").
pub struct Catalog {
    tables: DashMap<String, TableEntry>,
    default_source: parking_lot::RwLock<Option<Arc<dyn DataSource>>>,
    pub stats: StatisticsStore,
    pub feedback: FeedbackStore,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            default_source: parking_lot::RwLock::new(None),
            stats: StatisticsStore::new(),
            feedback: FeedbackStore::new(),
        }
    }

    /// The backend new `CREATE TABLE` statements land on when no source is
    /// named explicitly. Set once at startup from `database.enabled_sources[0]`.
    pub fn set_default_source(&self, source: Arc<dyn DataSource>) {
        *self.default_source.write() = Some(source);
    }

    pub fn default_source(&self) -> Option<Arc<dyn DataSource>> {
        self.default_source.read().clone()
    }

    pub fn register_table(&self, table: &str, source: Arc<dyn DataSource>, columns: Vec<ColumnDef>) {
        self.tables.insert(
            table.to_string(),
            TableEntry {
                source,
                columns,
                fulltext: None,
            },
        );
    }

    pub fn attach_fulltext(&self, table: &str, index: Arc<InvertedIndex>) {
        if let Some(mut entry) = self.tables.get_mut(table) {
            entry.fulltext = Some(index);
        }
    }

    pub fn fulltext(&self, table: &str) -> Option<Arc<InvertedIndex>> {
        self.tables.get(table).and_then(|e| e.fulltext.clone())
    }

    pub fn source_for(&self, table: &str) -> Option<Arc<dyn DataSource>> {
        self.tables.get(table).map(|e| e.source.clone())
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.tables.iter().map(|e| e.key().clone()).collect()
    }

    /// Resolves a table's column list into MySQL column-definition
    /// descriptors, for `PhysicalPlan::annotate` and `FIELD_LIST`/
    /// `INIT_DB`-style introspection.
    pub fn table_schema(&self, table: &str) -> Vec<ColumnDescriptor> {
        self.tables
            .get(table)
            .map(|e| {
                e.columns
                    .iter()
                    .map(|c| ColumnDescriptor::new(c.name.clone(), table, c.mysql_type))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn columns_of(&self, table: &str) -> Vec<ColumnDef> {
        self.tables.get(table).map(|e| e.columns.clone()).unwrap_or_else(Vec::new)
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn resolve(&self, table: &str) -> Result<Arc<dyn DataSource>> {
        self.source_for(table)
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {table}")))
    }

    /// Closure form handed to `PhysicalPlan::annotate`.
    pub fn table_schema_resolver(self: &Arc<Self>) -> impl Fn(&str) -> Vec<ColumnDescriptor> {
        let catalog = Arc::clone(self);
        move |table: &str| catalog.table_schema(table)
    }

    /// Closure form handed to `exec::build_operator`.
    pub fn source_resolver(self: &Arc<Self>) -> Arc<dyn Fn(&str) -> Option<Arc<dyn DataSource>> + Send + Sync> {
        let catalog = Arc::clone(self);
        Arc::new(move |table: &str| catalog.source_for(table))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MemorySource;

    #[tokio::test]
    async fn register_then_resolve() {
        let catalog = Catalog::new();
        let source: Arc<dyn DataSource> = Arc::new(MemorySource::new());
        catalog.register_table(
            "t",
            source,
            vec![ColumnDef {
                name: "id".into(),
                nullable: false,
                mysql_type: 3,
            }],
        );
        assert!(catalog.table_exists("t"));
        assert_eq!(catalog.table_schema("t").len(), 1);
        assert!(catalog.resolve("t").is_ok());
        assert!(catalog.resolve("missing").is_err());
    }
}
