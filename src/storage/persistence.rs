//! Snapshot persistence for the memory store

use crate::core::{DocError, Document, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub next_id: i64,
    pub documents: Vec<Document>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub collections: HashMap<String, CollectionSnapshot>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: i64,
    /// Connection URL (password masked) of the store that wrote it.
    #[serde(default)]
    pub source: String,
    pub document_count: usize,
    pub collection_count: usize,
}

impl StoreSnapshot {
    pub fn new(collections: HashMap<String, CollectionSnapshot>, source: impl Into<String>) -> Self {
        let document_count = collections.values().map(|c| c.documents.len()).sum();
        let collection_count = collections.len();

        Self {
            version: SNAPSHOT_VERSION,
            collections,
            metadata: SnapshotMetadata {
                created_at: chrono::Utc::now().timestamp_millis(),
                source: source.into(),
                document_count,
                collection_count,
            },
        }
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Write to a sibling temp file, then rename it over the snapshot.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let bytes = rmp_serde::to_vec(snapshot)
            .map_err(|e| DocError::Serialization(format!("snapshot encode: {}", e)))?;

        if let Some(dir) = self.snapshot_path.parent() {
            fs::create_dir_all(dir).map_err(io_error("create snapshot directory", dir))?;
        }
        let staging = self.snapshot_path.with_extension("tmp");
        {
            let mut out = BufWriter::new(File::create(&staging).map_err(io_error("create", &staging))?);
            out.write_all(&bytes).map_err(io_error("write", &staging))?;
            out.flush().map_err(io_error("flush", &staging))?;
            out.get_ref().sync_all().map_err(io_error("sync", &staging))?;
        }
        fs::rename(&staging, &self.snapshot_path).map_err(io_error("rename", &staging))
    }

    /// Read the snapshot, `None` when none was written yet.
    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.snapshot_path).map_err(io_error("read", &self.snapshot_path))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&bytes)
            .map_err(|e| DocError::Serialization(format!("snapshot decode: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(DocError::Serialization(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

fn io_error<'a>(action: &'a str, path: &'a Path) -> impl FnOnce(std::io::Error) -> DocError + 'a {
    move |e| DocError::Io(format!("{} {}: {}", action, path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().join("db.snapshot"));
        assert!(manager.load().unwrap().is_none());

        let mut collections = HashMap::new();
        collections.insert(
            "tests".to_string(),
            CollectionSnapshot {
                next_id: 3,
                documents: vec![
                    json!({"id": 1, "meta": "onigiri", "multi": [{"id": "a", "taiga": 1}]})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ],
            },
        );
        manager
            .save(&StoreSnapshot::new(collections, "memodoc://localhost:27017/db"))
            .unwrap();
        assert!(manager.exists());

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.metadata.document_count, 1);
        assert_eq!(loaded.metadata.source, "memodoc://localhost:27017/db");
        let tests = &loaded.collections["tests"];
        assert_eq!(tests.next_id, 3);
        assert_eq!(tests.documents[0]["multi"][0]["taiga"], json!(1));
    }
}
