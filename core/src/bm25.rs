use crate::types::{DocId, ScoredHit};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TermId = u32;

pub const STATE_VERSION: u32 = 1;

/// BM25 ranking parameters plus the weight of the single text field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Config {
    pub k1: f32,
    pub b: f32,
    pub field_weight: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            field_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

/// The fully exported index: everything query-time scoring needs, with no
/// reference back to the original documents. The tokenizer pipeline
/// configuration is intentionally absent (see
/// [`crate::tokenizer::PipelineConfig`]); callers re-supply it on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseIndexState {
    pub version: u32,
    pub created_at: String,
    pub config: Bm25Config,
    pub dictionary: HashMap<String, TermId>,
    pub doc_freqs: Vec<u32>,
    pub idf: Vec<f32>,
    pub postings: HashMap<TermId, Vec<Posting>>,
    pub doc_lens: Vec<u32>,
    pub avg_doc_len: f32,
    pub num_docs: u32,
}

/// In-memory BM25 index behind a narrow surface: `configure`,
/// `add_document`, `consolidate`, `search`, `export`, `import`. The
/// internal layout is private; the persisted [`SparseIndexState`] record
/// is the only contract.
#[derive(Debug)]
pub struct Bm25Index {
    config: Bm25Config,
    dictionary: HashMap<String, TermId>,
    doc_freqs: Vec<u32>,
    idf: Vec<f32>,
    postings: HashMap<TermId, Vec<Posting>>,
    doc_lens: Vec<u32>,
    avg_doc_len: f32,
    num_docs: u32,
    consolidated: bool,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Index {
    pub fn new() -> Self {
        Self {
            config: Bm25Config::default(),
            dictionary: HashMap::new(),
            doc_freqs: Vec::new(),
            idf: Vec::new(),
            postings: HashMap::new(),
            doc_lens: Vec::new(),
            avg_doc_len: 0.0,
            num_docs: 0,
            consolidated: false,
        }
    }

    /// Set ranking parameters. Only valid on a fresh index.
    pub fn configure(&mut self, config: Bm25Config) -> Result<()> {
        if self.num_docs > 0 || self.consolidated {
            bail!("configure must precede add_document and consolidate");
        }
        self.config = config;
        Ok(())
    }

    /// Add a tokenized document. Ids must be assigned sequentially from 0,
    /// in input order; they stay stable only for this index generation.
    pub fn add_document(&mut self, doc_id: DocId, tokens: &[String]) -> Result<()> {
        if self.consolidated {
            bail!("add_document after consolidate");
        }
        if doc_id != self.num_docs {
            bail!("document ids must be sequential: expected {}, got {doc_id}", self.num_docs);
        }

        let mut tf_counts: HashMap<TermId, u32> = HashMap::new();
        for term in tokens {
            let next_id = self.dictionary.len() as TermId;
            let tid = *self.dictionary.entry(term.clone()).or_insert(next_id);
            if tid as usize >= self.doc_freqs.len() {
                self.doc_freqs.push(0);
            }
            *tf_counts.entry(tid).or_insert(0) += 1;
        }
        for (tid, tf) in tf_counts {
            self.doc_freqs[tid as usize] += 1;
            // Sequential adds keep each posting list sorted by doc_id.
            self.postings.entry(tid).or_default().push(Posting { doc_id, tf });
        }

        self.doc_lens.push(tokens.len() as u32);
        self.num_docs += 1;
        Ok(())
    }

    /// Freeze term statistics. Must run exactly once, after all documents
    /// are added and before any search. Zero documents is valid and yields
    /// an index that always returns empty results.
    pub fn consolidate(&mut self) -> Result<()> {
        if self.consolidated {
            bail!("consolidate called twice");
        }
        let n = self.num_docs as f32;
        self.idf = self
            .doc_freqs
            .iter()
            .map(|&df| (1.0 + (n - df as f32 + 0.5) / (df as f32 + 0.5)).ln())
            .collect();
        let total: u64 = self.doc_lens.iter().map(|&l| l as u64).sum();
        self.avg_doc_len = if self.num_docs > 0 {
            total as f32 / self.num_docs as f32
        } else {
            0.0
        };
        self.consolidated = true;
        Ok(())
    }

    /// Score all matching documents against the tokenized query and return
    /// the top `limit` by descending BM25 score, ties broken by ascending
    /// doc id. Empty before consolidation and for queries with no known
    /// terms.
    pub fn search(&self, tokens: &[String], limit: usize) -> Vec<ScoredHit> {
        if !self.consolidated || limit == 0 || self.num_docs == 0 {
            return Vec::new();
        }

        let mut query_tf: HashMap<TermId, u32> = HashMap::new();
        for term in tokens {
            if let Some(&tid) = self.dictionary.get(term) {
                *query_tf.entry(tid).or_insert(0) += 1;
            }
        }
        if query_tf.is_empty() {
            return Vec::new();
        }

        let k1 = self.config.k1;
        let b = self.config.b;
        let mut scores: HashMap<DocId, f32> = HashMap::new();
        for (tid, qtf) in query_tf {
            let idf = self.idf[tid as usize];
            let Some(postings) = self.postings.get(&tid) else {
                continue;
            };
            for posting in postings {
                let tf = posting.tf as f32;
                let len_norm =
                    1.0 - b + b * self.doc_lens[posting.doc_id as usize] as f32 / self.avg_doc_len;
                let contrib = idf * self.config.field_weight * (tf * (k1 + 1.0))
                    / (tf + k1 * len_norm);
                *scores.entry(posting.doc_id).or_insert(0.0) += qtf as f32 * contrib;
            }
        }

        let mut scored: Vec<ScoredHit> = scores
            .into_iter()
            .map(|(doc_id, score)| ScoredHit { doc_id, score })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.doc_id.cmp(&b.doc_id))
        });
        scored.truncate(limit);
        scored
    }

    /// Export the consolidated state as a self-contained record.
    pub fn export(&self) -> Result<SparseIndexState> {
        if !self.consolidated {
            bail!("export before consolidate");
        }
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "".into());
        Ok(SparseIndexState {
            version: STATE_VERSION,
            created_at,
            config: self.config,
            dictionary: self.dictionary.clone(),
            doc_freqs: self.doc_freqs.clone(),
            idf: self.idf.clone(),
            postings: self.postings.clone(),
            doc_lens: self.doc_lens.clone(),
            avg_doc_len: self.avg_doc_len,
            num_docs: self.num_docs,
        })
    }

    /// Rebuild a searchable index from an exported record.
    pub fn import(state: SparseIndexState) -> Result<Self> {
        if state.version != STATE_VERSION {
            bail!("unsupported index version {}", state.version);
        }
        Ok(Self {
            config: state.config,
            dictionary: state.dictionary,
            doc_freqs: state.doc_freqs,
            idf: state.idf,
            postings: state.postings,
            doc_lens: state.doc_lens,
            avg_doc_len: state.avg_doc_len,
            num_docs: state.num_docs,
            consolidated: true,
        })
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn num_terms(&self) -> usize {
        self.dictionary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn small_index() -> Bm25Index {
        let mut index = Bm25Index::new();
        index.add_document(0, &toks(&["wire", "gauge", "chart"])).unwrap();
        index.add_document(1, &toks(&["breaker", "panel", "wire", "wire"])).unwrap();
        index.add_document(2, &toks(&["rain", "barrel", "overflow"])).unwrap();
        index.consolidate().unwrap();
        index
    }

    #[test]
    fn ranks_heavier_term_frequency_higher() {
        let index = small_index();
        let hits = index.search(&toks(&["wire"]), 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, 1);
        assert_eq!(hits[1].doc_id, 0);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn rare_terms_outweigh_common_ones() {
        let mut index = Bm25Index::new();
        index.add_document(0, &toks(&["solar", "panel"])).unwrap();
        index.add_document(1, &toks(&["solar", "inverter"])).unwrap();
        index.add_document(2, &toks(&["solar", "charge"])).unwrap();
        index.consolidate().unwrap();
        let hits = index.search(&toks(&["solar", "inverter"]), 10);
        assert_eq!(hits[0].doc_id, 1);
    }

    #[test]
    fn bounded_and_ordered_output() {
        let index = small_index();
        for limit in 0..5 {
            let hits = index.search(&toks(&["wire", "rain"]), limit);
            assert!(hits.len() <= limit);
            for pair in hits.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
        }
    }

    #[test]
    fn empty_index_always_empty() {
        let mut index = Bm25Index::new();
        index.consolidate().unwrap();
        assert!(index.search(&toks(&["anything"]), 10).is_empty());
    }

    #[test]
    fn search_before_consolidate_is_empty() {
        let mut index = Bm25Index::new();
        index.add_document(0, &toks(&["wire"])).unwrap();
        assert!(index.search(&toks(&["wire"]), 10).is_empty());
    }

    #[test]
    fn consolidate_twice_fails() {
        let mut index = small_index();
        assert!(index.consolidate().is_err());
    }

    #[test]
    fn add_after_consolidate_fails() {
        let mut index = small_index();
        assert!(index.add_document(3, &toks(&["late"])).is_err());
    }

    #[test]
    fn configure_after_add_fails() {
        let mut index = Bm25Index::new();
        index.add_document(0, &toks(&["wire"])).unwrap();
        assert!(index.configure(Bm25Config::default()).is_err());
    }

    #[test]
    fn ids_must_be_sequential() {
        let mut index = Bm25Index::new();
        assert!(index.add_document(5, &toks(&["wire"])).is_err());
    }

    #[test]
    fn export_import_round_trip() {
        let index = small_index();
        let state = index.export().unwrap();
        let imported = Bm25Index::import(state).unwrap();
        let before = index.search(&toks(&["wire", "barrel"]), 10);
        let after = imported.search(&toks(&["wire", "barrel"]), 10);
        assert_eq!(before, after);
    }

    #[test]
    fn import_rejects_unknown_version() {
        let index = small_index();
        let mut state = index.export().unwrap();
        state.version = 99;
        assert!(Bm25Index::import(state).is_err());
    }
}
