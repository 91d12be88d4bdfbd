use async_trait::async_trait;
use rankfuse_core::{
    DocId, Document, DocumentCache, MemoryCache, PipelineConfig, SledCache, SparseEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn corpus() -> Vec<Document> {
    let entries = [
        ("docs/wiring.md", "Smoke detector placement: one per bedroom, one per hallway, interconnected."),
        ("docs/water.md", "Rain barrel overflow routing keeps the foundation dry during storms."),
        ("docs/power.md", "Size the solar charge controller to the panel array, not the battery bank."),
        ("docs/garden.md", "Row covers protect seedlings from a late frost without trapping heat."),
    ];
    entries
        .iter()
        .map(|(source_ref, text)| Document {
            text: text.to_string(),
            source_ref: source_ref.to_string(),
        })
        .collect()
}

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("sparse.idx")
}

#[tokio::test]
async fn round_trip_matches_in_memory_search() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(MemoryCache::new());

    let engine = SparseEngine::new(cache.clone());
    engine
        .build_index(&corpus(), &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();
    let built = engine.search("smoke detector placement", 4).await;
    assert!(!built.is_empty());

    let fresh = SparseEngine::new(cache);
    assert!(fresh.load_index(&store_path(&dir), PipelineConfig::default()));
    let loaded = fresh.search("smoke detector placement", 4).await;

    assert_eq!(built.len(), loaded.len());
    for (a, b) in built.iter().zip(&loaded) {
        assert_eq!(a.document, b.document);
        assert!((a.score - b.score).abs() < 1e-9);
    }
}

#[tokio::test]
async fn search_before_load_is_empty() {
    let engine = SparseEngine::new(Arc::new(MemoryCache::new()));
    assert!(engine.search("anything", 5).await.is_empty());
    assert!(!engine.is_loaded());
}

#[tokio::test]
async fn load_missing_file_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SparseEngine::new(Arc::new(MemoryCache::new()));
    assert!(!engine.load_index(&store_path(&dir), PipelineConfig::default()));
    assert!(engine.search("anything", 5).await.is_empty());
}

#[tokio::test]
async fn load_corrupt_file_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(store_path(&dir), b"definitely not bincode").unwrap();
    let engine = SparseEngine::new(Arc::new(MemoryCache::new()));
    assert!(!engine.load_index(&store_path(&dir), PipelineConfig::default()));
}

#[tokio::test]
async fn load_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(MemoryCache::new());
    let builder = SparseEngine::new(cache.clone());
    builder
        .build_index(&corpus(), &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();

    let engine = SparseEngine::new(cache);
    assert!(engine.load_index(&store_path(&dir), PipelineConfig::default()));
    assert!(engine.load_index(&store_path(&dir), PipelineConfig::default()));
    assert!(engine.is_loaded());
}

#[tokio::test]
async fn rebuild_overwrites_prior_index() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(MemoryCache::new());
    let engine = SparseEngine::new(cache.clone());
    engine
        .build_index(&corpus(), &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();

    let replacement = vec![Document {
        text: "Chainsaw chain tensioning and bar oil schedule.".to_string(),
        source_ref: "docs/tools.md".to_string(),
    }];
    engine
        .build_index(&replacement, &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();

    let fresh = SparseEngine::new(cache);
    assert!(fresh.load_index(&store_path(&dir), PipelineConfig::default()));
    let hits = fresh.search("chainsaw bar oil", 5).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.source_ref, "docs/tools.md");
}

#[tokio::test]
async fn bounded_and_ordered_for_all_limits() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SparseEngine::new(Arc::new(MemoryCache::new()));
    engine
        .build_index(&corpus(), &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();

    for limit in 0..6 {
        let results = engine.search("solar panel frost overflow", limit).await;
        assert!(results.len() <= limit);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

#[tokio::test]
async fn zero_document_build_yields_empty_searches() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SparseEngine::new(Arc::new(MemoryCache::new()));
    engine
        .build_index(&[], &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();
    assert!(engine.search("anything at all", 10).await.is_empty());

    let fresh = SparseEngine::new(Arc::new(MemoryCache::new()));
    assert!(fresh.load_index(&store_path(&dir), PipelineConfig::default()));
    assert!(fresh.search("anything at all", 10).await.is_empty());
}

#[tokio::test]
async fn cache_miss_drops_hit_without_raising() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(MemoryCache::new());
    let engine = SparseEngine::new(cache.clone());
    engine
        .build_index(&corpus(), &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();

    let full = engine.search("smoke detector placement", 4).await;
    assert!(!full.is_empty());
    let top_hit = &full[0].document;
    assert_eq!(top_hit.source_ref, "docs/wiring.md");

    // Simulate the backing store evicting the best document.
    cache.evict(0);
    let degraded = engine.search("smoke detector placement", 4).await;
    assert_eq!(degraded.len(), full.len() - 1);
    assert!(degraded.iter().all(|r| r.document.source_ref != "docs/wiring.md"));
}

/// A cache whose writes always fail, as a down backend would.
struct RejectingCache;

#[async_trait]
impl DocumentCache for RejectingCache {
    async fn get(&self, _doc_id: DocId) -> Option<Document> {
        None
    }

    async fn set(&self, _doc_id: DocId, _document: &Document) -> bool {
        false
    }
}

#[tokio::test]
async fn cache_write_failures_do_not_fail_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SparseEngine::new(Arc::new(RejectingCache));
    engine
        .build_index(&corpus(), &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();

    // Every resolution misses, so results are empty — but nothing raised.
    assert!(engine.search("smoke detector placement", 4).await.is_empty());
}

#[tokio::test]
async fn sled_backed_engine_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SledCache::open(&dir.path().join("cache")).unwrap());
    let engine = SparseEngine::new(cache);
    engine
        .build_index(&corpus(), &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();

    let hits = engine.search("rain barrel overflow", 3).await;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].document.source_ref, "docs/water.md");
}

#[tokio::test]
async fn concurrent_searches_share_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(SparseEngine::new(Arc::new(MemoryCache::new())));
    engine
        .build_index(&corpus(), &store_path(&dir), PipelineConfig::default())
        .await
        .unwrap();

    let queries = ["smoke detector", "rain barrel", "solar charge", "late frost"];
    let handles: Vec<_> = queries
        .iter()
        .map(|q| {
            let engine = engine.clone();
            let query = q.to_string();
            tokio::spawn(async move { engine.search(&query, 2).await })
        })
        .collect();
    for handle in handles {
        let results = handle.await.unwrap();
        assert!(!results.is_empty());
    }
}
