use crate::types::{DenseHit, Document, ScoredDocument};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Dedup key: SHA-256 of the exact document text, lowercase hex. Two
/// documents are the same iff their hashes match, regardless of which
/// source returned them or in what order.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Which fusion algorithm the orchestrator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    Rrf,
    Weighted,
}

/// A document seen by one or both retrieval sources, keyed by content
/// hash. `None` means the source did not return the document, which is
/// distinct from any rank or score value; defaults are applied only inside
/// the fusion computations, never at merge time.
#[derive(Debug, Clone)]
pub struct FusionCandidate {
    pub document: Document,
    pub dense_rank: Option<usize>,
    pub dense_score: Option<f64>,
    pub sparse_rank: Option<usize>,
    pub sparse_score: Option<f64>,
}

/// Merge the two ranked lists into deduplicated candidates. The dense list
/// is walked first, then the sparse list; ranks are list positions. The
/// document payload is kept from whichever source saw the hash first —
/// later sources contribute only their rank/score fields. Output order is
/// first-seen order, which the fusion sorts use as the deterministic
/// tie-break.
pub fn merge_candidates(dense: &[DenseHit], sparse: &[ScoredDocument]) -> Vec<FusionCandidate> {
    let mut by_hash: HashMap<String, usize> = HashMap::new();
    let mut candidates: Vec<FusionCandidate> = Vec::new();

    for (rank, hit) in dense.iter().enumerate() {
        let hash = content_hash(&hit.text);
        if by_hash.contains_key(&hash) {
            // Duplicate text within the dense list itself: the earlier,
            // better rank stands.
            continue;
        }
        by_hash.insert(hash, candidates.len());
        candidates.push(FusionCandidate {
            document: Document {
                text: hit.text.clone(),
                source_ref: hit.source_ref(),
            },
            dense_rank: Some(rank),
            dense_score: None,
            sparse_rank: None,
            sparse_score: None,
        });
    }

    for (rank, hit) in sparse.iter().enumerate() {
        let hash = content_hash(&hit.document.text);
        if let Some(&i) = by_hash.get(&hash) {
            let candidate = &mut candidates[i];
            if candidate.sparse_rank.is_none() {
                candidate.sparse_rank = Some(rank);
                candidate.sparse_score = Some(hit.score);
            }
        } else {
            by_hash.insert(hash, candidates.len());
            candidates.push(FusionCandidate {
                document: hit.document.clone(),
                dense_rank: None,
                dense_score: None,
                sparse_rank: Some(rank),
                sparse_score: Some(hit.score),
            });
        }
    }

    candidates
}

/// Options for reciprocal rank fusion.
#[derive(Debug, Clone, Copy)]
pub struct RrfOptions {
    /// Smoothing constant k in `1/(k + rank)`.
    pub constant: f64,
    /// Rank charged to a source that did not return the document. The
    /// orchestrator sets this to `pre_rerank_k`, treating the document as
    /// ranked just outside the retrieved window. A value of 0 reproduces
    /// the rank-0 default some engines apply, which inflates single-source
    /// hits.
    pub absent_rank: usize,
}

/// Reciprocal rank fusion: `1/(k + dense_rank) + 1/(k + sparse_rank)`,
/// with absent ranks substituted per [`RrfOptions::absent_rank`]. Sorted
/// by descending fused score; ties keep first-seen candidate order (the
/// sort is stable), so output is deterministic across runs. Truncated to
/// `final_k`.
pub fn rrf_fuse(
    candidates: &[FusionCandidate],
    opts: &RrfOptions,
    final_k: usize,
) -> Vec<ScoredDocument> {
    let contribution =
        |rank: Option<usize>| 1.0 / (opts.constant + rank.unwrap_or(opts.absent_rank) as f64);
    let mut fused: Vec<ScoredDocument> = candidates
        .iter()
        .map(|c| ScoredDocument {
            document: c.document.clone(),
            score: contribution(c.dense_rank) + contribution(c.sparse_rank),
        })
        .collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(final_k);
    fused
}

/// Weighted score fusion over rank-derived proxies. True relevance
/// magnitudes are not assumed available from either source, so each
/// source scores a document `pre_rerank_k - rank`, 0 when the source
/// missed it, blended as `alpha * dense + (1 - alpha) * sparse`.
/// `alpha = 1` reduces to pure dense ordering, `alpha = 0` to pure sparse
/// ordering. Truncated to `final_k`.
pub fn weighted_fuse(
    candidates: &[FusionCandidate],
    alpha: f64,
    pre_rerank_k: usize,
    final_k: usize,
) -> Vec<ScoredDocument> {
    let proxy = |rank: Option<usize>| match rank {
        Some(rank) => pre_rerank_k.saturating_sub(rank) as f64,
        None => 0.0,
    };
    let mut fused: Vec<ScoredDocument> = candidates
        .iter()
        .map(|c| ScoredDocument {
            document: c.document.clone(),
            score: alpha * proxy(c.dense_rank) + (1.0 - alpha) * proxy(c.sparse_rank),
        })
        .collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(final_k);
    fused
}
