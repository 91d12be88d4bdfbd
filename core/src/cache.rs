use crate::types::{DocId, Document};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Narrow key-value contract backing the sparse engine.
///
/// Both operations fail soft: a failed `get` is indistinguishable from a
/// genuine miss, and a failed `set` logs and reports `false`. Neither ever
/// raises to the caller. Backends may evict; a document disappearing
/// between build and query is a normal miss, not a bug.
#[async_trait]
pub trait DocumentCache: Send + Sync {
    async fn get(&self, doc_id: DocId) -> Option<Document>;
    async fn set(&self, doc_id: DocId, document: &Document) -> bool;
}

/// Sled-backed document cache. Values are bincode-encoded documents keyed
/// by the big-endian doc id.
pub struct SledCache {
    tree: sled::Db,
}

impl SledCache {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            tree: sled::open(path)?,
        })
    }
}

#[async_trait]
impl DocumentCache for SledCache {
    async fn get(&self, doc_id: DocId) -> Option<Document> {
        let bytes = match self.tree.get(doc_id.to_be_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(doc_id, %err, "cache read failed, treating as miss");
                return None;
            }
        };
        match bincode::deserialize(&bytes) {
            Ok(document) => Some(document),
            Err(err) => {
                warn!(doc_id, %err, "cache entry undecodable, treating as miss");
                None
            }
        }
    }

    async fn set(&self, doc_id: DocId, document: &Document) -> bool {
        let bytes = match bincode::serialize(document) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(doc_id, %err, "cache encode failed");
                return false;
            }
        };
        match self.tree.insert(doc_id.to_be_bytes(), bytes) {
            Ok(_) => true,
            Err(err) => {
                warn!(doc_id, %err, "cache write failed");
                false
            }
        }
    }
}

/// In-memory cache for tests and ephemeral indexes.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<DocId, Document>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop one entry, as an evicting backend would.
    pub fn evict(&self, doc_id: DocId) {
        self.entries.write().remove(&doc_id);
    }
}

#[async_trait]
impl DocumentCache for MemoryCache {
    async fn get(&self, doc_id: DocId) -> Option<Document> {
        self.entries.read().get(&doc_id).cloned()
    }

    async fn set(&self, doc_id: DocId, document: &Document) -> bool {
        self.entries.write().insert(doc_id, document.clone());
        true
    }
}
