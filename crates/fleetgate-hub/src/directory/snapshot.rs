//! Directory snapshot persistence.
//!
//! The directory is an in-memory structure; durability comes from rewriting
//! one JSON document (two maps, both keyed by the composite key) on every
//! mutation. Stores therefore only need wholesale load/save, and the write
//! rate is bounded by the fleet's connection rate, not by request volume.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ConnectionDetail, MachineIdentity};

/// Snapshot persistence errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized form of the whole directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub machines: HashMap<String, MachineIdentity>,
    pub details: HashMap<String, ConnectionDetail>,
}

/// Where directory snapshots are read from and written to.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last snapshot, or `None` when none exists yet.
    async fn load(&self) -> Result<Option<DirectorySnapshot>, SnapshotError>;

    /// Persist the snapshot wholesale, replacing whatever was there.
    async fn save(&self, snapshot: &DirectorySnapshot) -> Result<(), SnapshotError>;
}

/// JSON file store used in production.
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self) -> Result<Option<DirectorySnapshot>, SnapshotError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &DirectorySnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}
