use crate::bm25::{Bm25Config, Bm25Index};
use crate::cache::DocumentCache;
use crate::persist;
use crate::tokenizer::{tokenize, PipelineConfig};
use crate::types::{DocId, Document, ScoredDocument, ScoredHit};
use anyhow::Result;
use futures::future::join_all;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct EngineState {
    index: Bm25Index,
    pipeline: PipelineConfig,
    loaded: bool,
}

/// The sparse retrieval engine: builds, persists, loads, and queries one
/// BM25 index, resolving hits against the document cache.
///
/// One engine instance governs one persisted index. Once a build or load
/// has completed, `search` may run concurrently from many tasks; builds
/// against the same store path must be serialized by the caller — nothing
/// here locks the file.
pub struct SparseEngine {
    cache: Arc<dyn DocumentCache>,
    bm25: Bm25Config,
    state: RwLock<EngineState>,
}

impl SparseEngine {
    pub fn new(cache: Arc<dyn DocumentCache>) -> Self {
        Self::with_bm25_config(cache, Bm25Config::default())
    }

    /// An engine whose builds use non-default ranking parameters. Loaded
    /// indexes carry their own persisted parameters; this config applies
    /// to builds only.
    pub fn with_bm25_config(cache: Arc<dyn DocumentCache>, bm25: Bm25Config) -> Self {
        Self {
            cache,
            bm25,
            state: RwLock::new(EngineState {
                index: Bm25Index::new(),
                pipeline: PipelineConfig::default(),
                loaded: false,
            }),
        }
    }

    /// Build a fresh index over `documents`, assigning each the id of its
    /// position in the slice. Every document is also written to the cache;
    /// a failed cache write is logged and skipped, never fatal. The record
    /// at `store_path` is fully overwritten. Returns only after indexing,
    /// consolidation, cache writes, and the store write have all
    /// completed, leaving the engine loaded and searchable.
    ///
    /// Building over zero documents is valid and produces an index that
    /// always returns empty results.
    pub async fn build_index(
        &self,
        documents: &[Document],
        store_path: &Path,
        pipeline: PipelineConfig,
    ) -> Result<()> {
        let mut index = Bm25Index::new();
        index.configure(self.bm25)?;
        for (i, document) in documents.iter().enumerate() {
            let doc_id = i as DocId;
            let tokens = tokenize(&document.text, &pipeline);
            index.add_document(doc_id, &tokens)?;
            if !self.cache.set(doc_id, document).await {
                warn!(doc_id, "document not cached; it will be missing from search results");
            }
        }
        index.consolidate()?;
        info!(
            num_docs = index.num_docs(),
            num_terms = index.num_terms(),
            "index consolidation complete"
        );

        let state = index.export()?;
        persist::save_state(store_path, &state)?;
        info!(store_path = %store_path.display(), "index written");

        let mut guard = self.state.write();
        guard.index = index;
        guard.pipeline = pipeline;
        guard.loaded = true;
        Ok(())
    }

    /// Load a previously persisted index. Idempotent: once loaded, later
    /// calls are no-ops returning `true`. A missing or undecodable record
    /// yields `false` rather than an error, and the engine stays unloaded.
    ///
    /// The pipeline configuration is not part of the persisted record and
    /// must be supplied explicitly here; it has to match the one used at
    /// build time for scores to be comparable.
    pub fn load_index(&self, store_path: &Path, pipeline: PipelineConfig) -> bool {
        let mut guard = self.state.write();
        if guard.loaded {
            return true;
        }
        let state = match persist::load_state(store_path) {
            Ok(state) => state,
            Err(err) => {
                warn!(store_path = %store_path.display(), %err, "index not loaded");
                return false;
            }
        };
        let index = match Bm25Index::import(state) {
            Ok(index) => index,
            Err(err) => {
                warn!(store_path = %store_path.display(), %err, "index not loaded");
                return false;
            }
        };
        guard.index = index;
        guard.pipeline = pipeline;
        guard.loaded = true;
        true
    }

    pub fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }

    /// BM25 search over the loaded index, then parallel cache resolution
    /// of every hit. Returns an empty list when no index is loaded — a
    /// defined outcome, not an error. A cache miss silently drops its hit,
    /// so the result may hold fewer than `limit` documents.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<ScoredDocument> {
        let hits: Vec<ScoredHit> = {
            let guard = self.state.read();
            if !guard.loaded {
                warn!("search called before an index was loaded");
                return Vec::new();
            }
            let tokens = tokenize(query, &guard.pipeline);
            guard.index.search(&tokens, limit)
        };

        let lookups = join_all(hits.iter().map(|hit| self.cache.get(hit.doc_id))).await;
        hits.into_iter()
            .zip(lookups)
            .filter_map(|(hit, document)| match document {
                Some(document) => Some(ScoredDocument {
                    document,
                    score: hit.score as f64,
                }),
                None => {
                    debug!(doc_id = hit.doc_id, "dropping hit missing from cache");
                    None
                }
            })
            .collect()
    }
}
