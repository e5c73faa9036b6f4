//! Search engine behavior over an in-memory catalog.

use cupola::vector::{EmbeddingGenerator, HashingEmbedder, VectorDimension, VectorError};
use cupola::{ImageRecord, InMemoryCatalog, SearchEngine, SearchError, config::SearchConfig};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn hashing() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(VectorDimension::new(256).unwrap()))
}

fn scenario_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new(vec![
        ImageRecord::new("A", "astronaut in cupola viewing earth"),
        ImageRecord::new("B", "underwater EVA training"),
        ImageRecord::new("C", "aurora from orbit"),
    ])
}

fn rich_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new(vec![
        ImageRecord::new("iss040e090540", "Aurora australis seen from the cupola")
            .with_keywords(["aurora", "cupola", "night"])
            .with_category("Cupola Images")
            .with_source("NASA Image Library")
            .with_image_url("https://images.nasa.gov/iss040e090540.jpg"),
        ImageRecord::new("iss064e011234", "Astronaut photographs Earth through cupola windows")
            .with_keywords(["astronaut", "earth"])
            .with_category("Cupola Images")
            .with_image_url("https://images.nasa.gov/iss064e011234.jpg"),
        ImageRecord::new("jsc2019e040001", "Spacewalk training in the Neutral Buoyancy Lab pool")
            .with_keywords(["NBL", "EVA"])
            .with_category("NBL Training Images")
            .with_image_url("https://images.nasa.gov/jsc2019e040001.jpg"),
        ImageRecord::new("iss059e000777", "City lights of Europe at night")
            .with_category("Earth Observation"),
        ImageRecord::new("iss066e012345", "Sunrise over the Pacific from orbit"),
    ])
}

fn engine_with(catalog: &InMemoryCatalog) -> SearchEngine {
    let engine = SearchEngine::new(hashing(), SearchConfig::default()).unwrap();
    engine.load(catalog).unwrap();
    engine
}

#[test]
fn test_astronaut_query_ranks_cupola_image_first() {
    let engine = engine_with(&scenario_catalog());

    let results = engine
        .search("astronaut viewing earth from space", 2)
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].record.nasa_id, "A");
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[1].rank, 2);
    assert_ne!(results[1].record.nasa_id, "A");
    assert!(results[0].similarity_score > results[1].similarity_score);
}

#[test]
fn test_result_shape_holds_for_every_top_k() {
    let engine = engine_with(&rich_catalog());
    let total = engine.stats().total;

    for query in ["aurora", "astronaut earth", "EVA pool training", "night", "zzz"] {
        for top_k in 1..=engine.max_top_k() {
            let results = engine.search(query, top_k).unwrap();

            assert_eq!(results.len(), top_k.min(total), "query {query} top_k {top_k}");
            let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
            assert_eq!(ranks, (1..=results.len()).collect::<Vec<_>>());
            assert!(
                results
                    .windows(2)
                    .all(|w| w[0].similarity_score >= w[1].similarity_score)
            );
        }
    }
}

#[test]
fn test_top_k_above_total_returns_everything() {
    let engine = engine_with(&scenario_catalog());
    let results = engine.search("earth", 20).unwrap();
    assert_eq!(results.len(), 3);

    let ids: HashSet<&str> = results.iter().map(|r| r.record.nasa_id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["A", "B", "C"]));
}

#[test]
fn test_top_k_out_of_bounds_is_invalid() {
    let engine = engine_with(&scenario_catalog());
    for top_k in [0, engine.max_top_k() + 1, usize::MAX] {
        assert!(matches!(
            engine.search("earth", top_k),
            Err(SearchError::InvalidArgument { .. })
        ));
    }
}

#[test]
fn test_argument_errors_win_over_not_ready() {
    let engine = SearchEngine::new(hashing(), SearchConfig::default()).unwrap();
    assert!(matches!(
        engine.search("  ", 3),
        Err(SearchError::InvalidArgument { .. })
    ));
    assert!(matches!(
        engine.search("earth", 0),
        Err(SearchError::InvalidArgument { .. })
    ));
    assert!(matches!(
        engine.search("earth", 3),
        Err(SearchError::NotReady)
    ));
}

struct CountingEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
}

impl EmbeddingGenerator for CountingEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate_embeddings(texts)
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn model_name(&self) -> String {
        "counting".to_string()
    }
}

#[test]
fn test_load_embeds_in_one_batch_and_blank_query_skips_provider() {
    let embedder = Arc::new(CountingEmbedder {
        inner: HashingEmbedder::default(),
        calls: AtomicUsize::new(0),
    });
    let engine = SearchEngine::new(embedder.clone(), SearchConfig::default()).unwrap();

    engine.load(&rich_catalog()).unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

    assert!(engine.search("", 5).is_err());
    assert!(engine.search(" \t ", 5).is_err());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

    engine.search("aurora", 5).unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_get_by_id_round_trips_every_field() {
    let catalog = rich_catalog();
    let engine = engine_with(&catalog);

    for original in cupola::CatalogSource::fetch(&catalog).unwrap().records {
        let fetched = engine.get_by_id(&original.nasa_id).unwrap();
        assert_eq!(fetched, original);
    }
    assert!(engine.get_by_id("does-not-exist").is_none());
}

#[test]
fn test_read_accessors_are_idempotent() {
    let engine = engine_with(&rich_catalog());

    let stats = engine.stats();
    let categories = engine.list_categories();
    let record = engine.get_by_id("iss040e090540");

    for _ in 0..3 {
        assert_eq!(engine.stats(), stats);
        assert_eq!(engine.list_categories(), categories);
        assert_eq!(engine.get_by_id("iss040e090540"), record);
    }

    assert_eq!(stats.total, 5);
    assert!(stats.ready);
    assert_eq!(
        categories,
        vec!["Cupola Images", "Earth Observation", "NBL Training Images"]
    );
}

#[test]
fn test_mutating_results_leaves_index_untouched() {
    let engine = engine_with(&scenario_catalog());

    let mut results = engine.search("aurora", 1).unwrap();
    results[0].record.description = "overwritten".to_string();
    results[0].record.keywords.push("tampered".to_string());

    let again = engine.search("aurora", 1).unwrap();
    assert_eq!(again[0].record.description, "aurora from orbit");
    assert!(again[0].record.keywords.is_empty());
    assert_eq!(
        engine.get_by_id("C").unwrap().description,
        "aurora from orbit"
    );
}

#[test]
fn test_search_during_reload_sees_one_whole_catalog() {
    let engine = Arc::new(engine_with(&scenario_catalog()));
    let first: HashSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
    let second_catalog = rich_catalog();
    let second: HashSet<String> = cupola::CatalogSource::fetch(&second_catalog)
        .unwrap()
        .records
        .into_iter()
        .map(|r| r.nasa_id)
        .collect();

    std::thread::scope(|scope| {
        let loader = engine.clone();
        scope.spawn(move || {
            for i in 0..20 {
                if i % 2 == 0 {
                    loader.load(&second_catalog).unwrap();
                } else {
                    loader.load(&scenario_catalog()).unwrap();
                }
            }
        });

        for _ in 0..4 {
            let reader = engine.clone();
            let (first, second) = (&first, &second);
            scope.spawn(move || {
                for _ in 0..50 {
                    let results = reader.search("earth at night", 20).unwrap();
                    let ids: HashSet<String> =
                        results.into_iter().map(|r| r.record.nasa_id).collect();
                    assert!(ids == *first || ids == *second, "mixed catalog: {ids:?}");
                }
            });
        }
    });
}

#[test]
#[ignore = "Downloads 86MB model - run with --ignored for semantic tests"]
fn test_astronaut_query_with_fastembed() {
    let embedder = Arc::new(cupola::vector::FastEmbedGenerator::new().unwrap());
    let engine = SearchEngine::new(embedder, SearchConfig::default()).unwrap();
    engine.load(&scenario_catalog()).unwrap();

    let results = engine
        .search("astronaut viewing earth from space", 2)
        .unwrap();
    assert_eq!(results[0].record.nasa_id, "A");
    assert!(results[0].similarity_score > results[1].similarity_score);
}
