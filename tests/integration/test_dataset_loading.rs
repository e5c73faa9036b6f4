//! Loading the engine from settings and a dataset file on disk.

use cupola::{JsonCatalogSource, SearchEngine, SearchError, Settings};
use std::fs;
use tempfile::TempDir;

const ORGANIZED_DATASET: &str = r#"{
  "collection_info": {
    "total_images": 3,
    "categories": ["Cupola Images", "NBL Training Images"]
  },
  "cupola_images": [
    {
      "nasa_id": "iss040e090540",
      "description": "Aurora australis seen from the cupola",
      "keywords": ["aurora", "cupola"],
      "category": "Cupola Images",
      "source": "NASA Image Library",
      "image_url": "https://images.nasa.gov/iss040e090540.jpg",
      "date_created": "2014-07-15"
    },
    {
      "nasa_id": "iss064e011234",
      "description": "Astronaut photographs Earth through cupola windows",
      "category": "Cupola Images",
      "image_url": "https://images.nasa.gov/iss064e011234.jpg"
    }
  ],
  "nbl_training_images": [
    {
      "nasa_id": "jsc2019e040001",
      "description": "Spacewalk training in the Neutral Buoyancy Lab pool",
      "keywords": ["NBL", "EVA"],
      "category": "NBL Training Images",
      "image_url": "https://images.nasa.gov/jsc2019e040001.jpg"
    }
  ]
}"#;

fn write_settings(dir: &TempDir, dataset: &std::path::Path) -> std::path::PathBuf {
    let settings_path = dir.path().join("settings.toml");
    fs::write(
        &settings_path,
        format!(
            r#"
[data]
dataset_path = "{}"

[search]
default_top_k = 2
max_top_k = 10

[semantic_search]
model = "hashing"
dimension = 256
include_metadata = true
"#,
            dataset.display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();
    settings_path
}

#[test]
fn test_engine_from_settings_loads_organized_dataset() {
    let dir = TempDir::new().unwrap();
    let dataset = dir.path().join("iss_images_organized.json");
    fs::write(&dataset, ORGANIZED_DATASET).unwrap();

    let settings = Settings::load_from(write_settings(&dir, &dataset)).unwrap();
    settings.validate().unwrap();

    let engine = SearchEngine::from_settings(&settings).unwrap();
    assert_eq!(engine.default_top_k(), 2);
    assert_eq!(engine.max_top_k(), 10);

    let loaded = engine
        .load(&JsonCatalogSource::new(settings.dataset_path()))
        .unwrap();
    assert_eq!(loaded, 3);

    let stats = engine.stats();
    assert_eq!(stats.model, "hashing");
    assert_eq!(stats.dimension, Some(256));
    assert_eq!(
        engine.list_categories(),
        vec!["Cupola Images", "NBL Training Images"]
    );

    let record = engine.get_by_id("iss040e090540").unwrap();
    assert_eq!(record.keywords, vec!["aurora", "cupola"]);
    assert_eq!(record.source.as_deref(), Some("NASA Image Library"));
}

#[test]
fn test_metadata_text_makes_keywords_searchable() {
    let dir = TempDir::new().unwrap();
    let dataset = dir.path().join("iss_images_organized.json");
    fs::write(&dataset, ORGANIZED_DATASET).unwrap();

    let settings = Settings::load_from(write_settings(&dir, &dataset)).unwrap();
    let engine = SearchEngine::from_settings(&settings).unwrap();
    engine
        .load(&JsonCatalogSource::new(settings.dataset_path()))
        .unwrap();

    // "EVA" only appears in keywords
    let results = engine.search("EVA", 1).unwrap();
    assert_eq!(results[0].record.nasa_id, "jsc2019e040001");
    assert!(results[0].similarity_score > 0.0);
}

#[test]
fn test_missing_dataset_leaves_engine_not_ready() {
    let dir = TempDir::new().unwrap();
    let dataset = dir.path().join("missing.json");

    let settings = Settings::load_from(write_settings(&dir, &dataset)).unwrap();
    let engine = SearchEngine::from_settings(&settings).unwrap();

    let err = engine
        .load(&JsonCatalogSource::new(settings.dataset_path()))
        .unwrap_err();
    assert!(matches!(err, SearchError::Internal { .. }));
    assert!(!engine.is_ready());
    assert!(!engine.stats().ready);
}

#[test]
fn test_duplicate_ids_fail_load() {
    let dir = TempDir::new().unwrap();
    let dataset = dir.path().join("dupes.json");
    fs::write(
        &dataset,
        r#"[
            {"nasa_id": "x", "description": "first", "image_url": "u1"},
            {"nasa_id": "x", "description": "second", "image_url": "u2"}
        ]"#,
    )
    .unwrap();

    let settings = Settings::load_from(write_settings(&dir, &dataset)).unwrap();
    let engine = SearchEngine::from_settings(&settings).unwrap();
    let err = engine.load(&JsonCatalogSource::new(&dataset)).unwrap_err();
    assert!(err.to_string().contains("Duplicate nasa_id"));
}

#[test]
fn test_invalid_search_bounds_rejected() {
    let mut settings = Settings::default();
    settings.semantic_search.model = "hashing".to_string();
    settings.search.default_top_k = 50;

    assert!(settings.validate().is_err());
    assert!(matches!(
        SearchEngine::from_settings(&settings),
        Err(SearchError::InvalidArgument { .. })
    ));
}

#[test]
fn test_unknown_model_is_internal_error() {
    let mut settings = Settings::default();
    settings.semantic_search.model = "word2vec".to_string();
    assert!(matches!(
        SearchEngine::from_settings(&settings),
        Err(SearchError::Internal { .. })
    ));
}
