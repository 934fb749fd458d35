//! On-disk schema/index sidecar (§4.10): `FileMeta` is written next to a
//! file-backed table as `<data>.<ext>_meta`, bincode-encoded, length-prefixed
//! the way the teacher's WAL frames entries (`storage/wal.rs`) — here a
//! whole-snapshot frame rather than an append-only log, since a gateway
//! table has no log to replay.

use crate::error::{CoreError, Result};
use crate::value::{ColumnDef, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Row>,
}

/// Index kind tag (§6 `indexes[].type`). Only `Fulltext` is ever produced
/// by this gateway today (C12); the others are carried so a sidecar
/// written by a future index type round-trips instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Btree,
    Hash,
    Fulltext,
    SpatialRtree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub table: String,
    pub kind: IndexKind,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// Schema + index metadata persisted alongside a file-backed table (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexMeta>,
}

fn meta_path(data_path: &Path) -> std::path::PathBuf {
    let mut p = data_path.as_os_str().to_owned();
    p.push("_meta");
    p.into()
}

pub async fn save_table_snapshot(path: &Path, snapshot: &TableSnapshot) -> Result<()> {
    let bytes = bincode::serialize(snapshot)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_u64(bytes.len() as u64).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// A missing sidecar for a file-backed table is a `StorageError`, not a
/// panic (§4.4/§4.10).
pub async fn load_table_snapshot(path: &Path) -> Result<TableSnapshot> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| CoreError::Storage(format!("missing sidecar data at {}: {e}", path.display())))?;
    let len = file.read_u64().await.map_err(|e| {
        CoreError::Storage(format!("corrupt sidecar length at {}: {e}", path.display()))
    })?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await.map_err(|e| {
        CoreError::Storage(format!("truncated sidecar data at {}: {e}", path.display()))
    })?;
    let snapshot: TableSnapshot = bincode::deserialize(&buf)?;
    Ok(snapshot)
}

pub async fn save_file_meta(data_path: &Path, meta: &FileMeta) -> Result<()> {
    let bytes = bincode::serialize(meta)?;
    tokio::fs::write(meta_path(data_path), bytes).await?;
    Ok(())
}

pub async fn load_file_meta(data_path: &Path) -> Result<FileMeta> {
    let path = meta_path(data_path);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| CoreError::Storage(format!("missing sidecar meta at {}: {e}", path.display())))?;
    let meta = bincode::deserialize(&bytes)?;
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("sidecar-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("t.kv");
        let snapshot = TableSnapshot {
            columns: vec![ColumnDef {
                name: "id".into(),
                nullable: false,
                mysql_type: 3,
            }],
            rows: vec![vec![Value::Int(1)]],
        };
        save_table_snapshot(&path, &snapshot).await.unwrap();
        let loaded = load_table_snapshot(&path).await.unwrap();
        assert_eq!(loaded.rows, snapshot.rows);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn file_meta_round_trips_index_descriptors() {
        let dir = std::env::temp_dir().join(format!("sidecar-meta-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let data_path = dir.join("t.kv");
        let meta = FileMeta {
            table_name: "t".into(),
            columns: vec![ColumnDef {
                name: "body".into(),
                nullable: true,
                mysql_type: 0xfc,
            }],
            indexes: vec![IndexMeta {
                name: "t_body_fts".into(),
                table: "t".into(),
                kind: IndexKind::Fulltext,
                unique: false,
                columns: vec!["body".into()],
            }],
        };
        save_file_meta(&data_path, &meta).await.unwrap();
        let loaded = load_file_meta(&data_path).await.unwrap();
        assert_eq!(loaded.table_name, "t");
        assert_eq!(loaded.indexes.len(), 1);
        assert_eq!(loaded.indexes[0].kind, IndexKind::Fulltext);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_sidecar_is_storage_error_not_panic() {
        let path = std::env::temp_dir().join("definitely-does-not-exist.kv");
        let result = load_table_snapshot(&path).await;
        assert!(matches!(result, Err(CoreError::Storage(_))));
    }
}
