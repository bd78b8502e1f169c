//! Append-only audit store backing the model audit trail and the prediction ledger.
//!
//! The store is built once at startup and its collections are handed to the
//! lifecycle manager and the ledger. Two backends: in-memory (a lock-guarded
//! vector) and sled (one tree per collection, keyed by big-endian
//! `Db::generate_id()` so key order is append order).

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::ledger::PredictionEntry;
use crate::manager::ModelRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("record codec error: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self { Self::Codec(e.to_string()) }
}

const MODELS_TREE: &str = "models";
const PREDICTIONS_TREE: &str = "predictions";

/// The two collections of the audit store.
#[derive(Clone)]
pub struct AuditStore {
    pub models: Collection<ModelRecord>,
    pub predictions: Collection<PredictionEntry>,
}

impl AuditStore {
    pub fn in_memory() -> Self {
        Self { models: Collection::memory(), predictions: Collection::memory() }
    }

    /// Open (or create) a persistent store under `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// Persistent store removed when dropped; for tests.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let models = Collection::sled(db.clone(), db.open_tree(MODELS_TREE)?);
        let predictions = Collection::sled(db.clone(), db.open_tree(PREDICTIONS_TREE)?);
        Ok(Self { models, predictions })
    }

    pub fn is_persistent(&self) -> bool { matches!(self.models.backend, Backend::Sled { .. }) }
}

enum Backend<T> {
    Memory(Arc<RwLock<Vec<T>>>),
    Sled { db: sled::Db, tree: sled::Tree },
    /// Reads come back empty and every append fails.
    #[cfg(test)]
    Unavailable,
}

impl<T> Clone for Backend<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Memory(items) => Self::Memory(Arc::clone(items)),
            Self::Sled { db, tree } => Self::Sled { db: db.clone(), tree: tree.clone() },
            #[cfg(test)]
            Self::Unavailable => Self::Unavailable,
        }
    }
}

/// Insertion-ordered, append-only collection. Clones share the same storage.
pub struct Collection<T> {
    backend: Backend<T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self { Self { backend: self.backend.clone() } }
}

impl<T> Collection<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    fn memory() -> Self { Self { backend: Backend::Memory(Arc::new(RwLock::new(Vec::new()))) } }

    fn sled(db: sled::Db, tree: sled::Tree) -> Self { Self { backend: Backend::Sled { db, tree } } }

    #[cfg(test)]
    pub(crate) fn unavailable() -> Self { Self { backend: Backend::Unavailable } }

    /// Append one record. Persistent appends are flushed before returning.
    pub fn append(&self, item: &T) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(items) => items.write().push(item.clone()),
            Backend::Sled { db, tree } => {
                let bytes = serde_json::to_vec(item)?;
                let key = db.generate_id()?.to_be_bytes();
                tree.insert(key, bytes)?;
                tree.flush()?;
            }
            #[cfg(test)]
            Backend::Unavailable => return Err(StoreError::Sled(sled::Error::Unsupported("store offline".into()))),
        }
        Ok(())
    }

    /// All records, oldest first.
    pub fn scan(&self) -> Result<Vec<T>, StoreError> {
        self.range(0, usize::MAX)
    }

    /// Up to `limit` records starting at position `offset`, oldest first.
    pub fn range(&self, offset: usize, limit: usize) -> Result<Vec<T>, StoreError> {
        match &self.backend {
            Backend::Memory(items) => Ok(items.read().iter().skip(offset).take(limit).cloned().collect()),
            Backend::Sled { tree, .. } => tree
                .iter()
                .values()
                .skip(offset)
                .take(limit)
                .map(|v| -> Result<T, StoreError> { Ok(serde_json::from_slice(&v?)?) })
                .collect(),
            #[cfg(test)]
            Backend::Unavailable => Ok(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Memory(items) => items.read().len(),
            Backend::Sled { tree, .. } => tree.len(),
            #[cfg(test)]
            Backend::Unavailable => 0,
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Drop every record. Only for test isolation; production paths never delete.
    pub fn clear(&self) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(items) => items.write().clear(),
            Backend::Sled { tree, .. } => {
                tree.clear()?;
                tree.flush()?;
            }
            #[cfg(test)]
            Backend::Unavailable => {}
        }
        Ok(())
    }
}
