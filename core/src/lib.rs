//! Hybrid retrieval: a persisted BM25 index plus content-hash fusion of
//! sparse and dense result lists.
//!
//! Build-time, documents flow through the [`tokenizer`] pipeline into a
//! [`bm25::Bm25Index`], the persisted index record, and the
//! [`cache::DocumentCache`]. Query-time, the [`engine::SparseEngine`] and
//! an external [`hybrid::DenseRetriever`] run concurrently and their
//! ranked lists are deduplicated and fused by [`fusion`].
//!
//! One [`engine::SparseEngine`] governs one persisted index; construct it
//! explicitly and share it behind an `Arc` — there is no process-global
//! instance.

pub mod bm25;
pub mod cache;
pub mod cancel;
pub mod engine;
pub mod fusion;
pub mod hybrid;
pub mod persist;
pub mod tokenizer;
pub mod types;

pub use bm25::{Bm25Config, SparseIndexState};
pub use cache::{DocumentCache, MemoryCache, SledCache};
pub use cancel::CancellationToken;
pub use engine::SparseEngine;
pub use fusion::FusionMode;
pub use hybrid::{
    DenseRetriever, HybridRetriever, RetrievalConfig, RetrievalError, SparseRetriever,
};
pub use tokenizer::PipelineConfig;
pub use types::{DenseHit, DocId, Document, ScoredDocument, ScoredHit};
