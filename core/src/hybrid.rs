use crate::cancel::CancellationToken;
use crate::engine::SparseEngine;
use crate::fusion::{self, FusionMode, RrfOptions};
use crate::types::{DenseHit, ScoredDocument};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

pub const MAX_PRE_RERANK_K: usize = 1000;

/// Request-fatal failures. Everything else — a source erroring, cache
/// misses, an unloaded index — degrades the result instead of failing the
/// request.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("retrieval cancelled")]
    Cancelled,
}

/// The sparse leg of a hybrid query. Implemented by [`SparseEngine`];
/// kept as a seam so orchestration is testable against stand-ins.
#[async_trait]
pub trait SparseRetriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredDocument>>;
}

/// The external dense (vector) retriever. Opaque beyond this contract:
/// an ordered list of text + metadata rows for a query.
#[async_trait]
pub trait DenseRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<DenseHit>>;
}

#[async_trait]
impl SparseRetriever for SparseEngine {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredDocument>> {
        Ok(SparseEngine::search(self, query, k).await)
    }
}

/// Options recognized by the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Result rows returned to the caller.
    pub final_k: usize,
    /// Rows requested from each source before fusion. At most
    /// [`MAX_PRE_RERANK_K`].
    pub pre_rerank_k: usize,
    pub fusion: FusionMode,
    /// Dense weight for weighted fusion, within `[0, 1]`.
    pub alpha: f64,
    pub rrf_constant: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_k: 3,
            pre_rerank_k: 10,
            fusion: FusionMode::Rrf,
            alpha: 0.5,
            rrf_constant: 60.0,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.final_k == 0 {
            return Err(RetrievalError::InvalidConfig(
                "final_k must be at least 1".to_string(),
            ));
        }
        if self.pre_rerank_k == 0 || self.pre_rerank_k > MAX_PRE_RERANK_K {
            return Err(RetrievalError::InvalidConfig(format!(
                "pre_rerank_k must be within 1..={MAX_PRE_RERANK_K}, got {}",
                self.pre_rerank_k
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(RetrievalError::InvalidConfig(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Coordinates one hybrid query: the sparse and dense retrievals fan out
/// concurrently, the ranked lists are deduplicated by content hash, and
/// the configured fusion produces the final ordering.
pub struct HybridRetriever {
    sparse: Arc<dyn SparseRetriever>,
    dense: Arc<dyn DenseRetriever>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    /// Rejects an invalid configuration up front; nothing else about
    /// construction can fail.
    pub fn new(
        sparse: Arc<dyn SparseRetriever>,
        dense: Arc<dyn DenseRetriever>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        Ok(Self {
            sparse,
            dense,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Run one query. Both legs are issued concurrently; a failing leg is
    /// logged and replaced with an empty list so the survivor still
    /// produces results, and an empty pair yields an empty result. The
    /// token aborts both legs and surfaces [`RetrievalError::Cancelled`].
    pub async fn retrieve(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let k = self.config.pre_rerank_k;

        let legs = async {
            tokio::join!(
                self.sparse.search(query, k),
                self.dense.retrieve(query, k)
            )
        };
        let (sparse_result, dense_result) = tokio::select! {
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            results = legs => results,
        };

        let sparse = sparse_result.unwrap_or_else(|err| {
            warn!(%err, "sparse retrieval failed, continuing with dense results only");
            Vec::new()
        });
        let dense = dense_result.unwrap_or_else(|err| {
            warn!(%err, "dense retrieval failed, continuing with sparse results only");
            Vec::new()
        });

        let candidates = fusion::merge_candidates(&dense, &sparse);
        let fused = match self.config.fusion {
            FusionMode::Rrf => fusion::rrf_fuse(
                &candidates,
                &RrfOptions {
                    constant: self.config.rrf_constant,
                    absent_rank: k,
                },
                self.config.final_k,
            ),
            FusionMode::Weighted => {
                fusion::weighted_fuse(&candidates, self.config.alpha, k, self.config.final_k)
            }
        };
        Ok(fused)
    }
}
