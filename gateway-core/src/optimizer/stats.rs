use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-column statistics consumed read-only by the cost model; mutated
/// only by a stats collector or by feedback (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnStats {
    pub ndv: u64,
    pub null_count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub null_fraction: f64,
    pub avg_width: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableStats {
    pub row_count: u64,
    pub columns: HashMap<String, ColumnStats>,
}

/// Process-wide statistics store, per-table, guarded by a read/write lock
/// (readers never block readers, per §5).
#[derive(Default)]
pub struct StatisticsStore {
    tables: parking_lot::RwLock<HashMap<String, TableStats>>,
}

impl StatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_table_stats(&self, table: &str, stats: TableStats) {
        self.tables.write().insert(table.to_string(), stats);
    }

    pub fn table_stats(&self, table: &str) -> Option<TableStats> {
        self.tables.read().get(table).cloned()
    }

    pub fn column_stats(&self, table: &str, column: &str) -> Option<ColumnStats> {
        self.tables
            .read()
            .get(table)
            .and_then(|t| t.columns.get(column).cloned())
    }

    pub fn row_count(&self, table: &str) -> Option<u64> {
        self.tables.read().get(table).map(|t| t.row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_read_round_trips() {
        let store = StatisticsStore::new();
        let mut stats = TableStats {
            row_count: 100,
            columns: HashMap::new(),
        };
        stats.columns.insert(
            "id".into(),
            ColumnStats {
                ndv: 100,
                null_count: 0,
                min: Some(1.0),
                max: Some(100.0),
                null_fraction: 0.0,
                avg_width: 8.0,
            },
        );
        store.set_table_stats("t", stats);
        assert_eq!(store.row_count("t"), Some(100));
        assert_eq!(store.column_stats("t", "id").unwrap().ndv, 100);
    }
}
