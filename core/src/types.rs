use serde::{Deserialize, Serialize};

pub type DocId = u32;

/// A cached document: the exact text that was indexed plus a reference to
/// where it came from (file path, URL, chunk label).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub source_ref: String,
}

/// Raw sparse hit, before cache resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredHit {
    pub doc_id: DocId,
    pub score: f32,
}

/// A document with its retrieval score. Sparse search yields BM25 scores;
/// the hybrid orchestrator yields fused scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f64,
}

/// One result row from the external dense retriever. The metadata is
/// opaque here except for an optional `source_ref` string, which is lifted
/// into the fusion payload when the dense list is the first to see a
/// document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseHit {
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DenseHit {
    pub fn source_ref(&self) -> String {
        self.metadata
            .get("source_ref")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}
