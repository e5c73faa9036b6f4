//! Dataset ingestion for the search engine.
//!
//! A [`CatalogSource`] yields one immutable snapshot of records. The engine
//! pulls a snapshot per `load()` and never writes back.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CatalogError, CatalogResult};
use crate::types::ImageRecord;

/// Records plus any categories the dataset declares up front.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub records: Vec<ImageRecord>,
    pub declared_categories: BTreeSet<String>,
}

impl CatalogSnapshot {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self {
            records,
            declared_categories: BTreeSet::new(),
        }
    }

    /// Check the primary-key invariant: every `nasa_id` non-empty and unique.
    pub fn validate(&self) -> CatalogResult<()> {
        let mut seen = HashSet::with_capacity(self.records.len());
        for (position, record) in self.records.iter().enumerate() {
            if record.nasa_id.trim().is_empty() {
                return Err(CatalogError::EmptyId { position });
            }
            if !seen.insert(record.nasa_id.as_str()) {
                return Err(CatalogError::DuplicateId {
                    id: record.nasa_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Anything that can produce a catalog snapshot.
pub trait CatalogSource: Send + Sync {
    fn fetch(&self) -> CatalogResult<CatalogSnapshot>;

    /// Short label used in log lines.
    fn describe(&self) -> String;
}

/// Fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    snapshot: CatalogSnapshot,
}

impl InMemoryCatalog {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self {
            snapshot: CatalogSnapshot::new(records),
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.snapshot.declared_categories = categories.into_iter().map(Into::into).collect();
        self
    }
}

impl CatalogSource for InMemoryCatalog {
    fn fetch(&self) -> CatalogResult<CatalogSnapshot> {
        Ok(self.snapshot.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory catalog ({} records)", self.snapshot.records.len())
    }
}

/// JSON dataset on disk.
///
/// Two layouts are accepted:
/// - organized: `{"cupola_images": [...], "nbl_training_images": [...],
///   "collection_info": {"categories": [...]}}`
/// - flat: `[record, record, ...]`
#[derive(Debug, Clone)]
pub struct JsonCatalogSource {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct OrganizedDataset {
    #[serde(default)]
    cupola_images: Vec<ImageRecord>,
    #[serde(default)]
    nbl_training_images: Vec<ImageRecord>,
    #[serde(default)]
    collection_info: CollectionInfo,
}

#[derive(Debug, Default, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    categories: Vec<String>,
}

impl JsonCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a dataset document in either supported layout.
    pub fn parse(&self, contents: &str) -> CatalogResult<CatalogSnapshot> {
        let parse_err = |source: serde_json::Error| CatalogError::Parse {
            path: self.path.clone(),
            source,
        };

        let value: Value = serde_json::from_str(contents).map_err(parse_err)?;
        let organized =
            value.get("cupola_images").is_some() || value.get("nbl_training_images").is_some();

        match value {
            Value::Array(_) => {
                let records: Vec<ImageRecord> = serde_json::from_value(value).map_err(parse_err)?;
                Ok(CatalogSnapshot::new(records))
            }
            Value::Object(_) if organized => {
                let dataset: OrganizedDataset =
                    serde_json::from_value(value).map_err(parse_err)?;
                let mut records = dataset.cupola_images;
                records.extend(dataset.nbl_training_images);
                Ok(CatalogSnapshot {
                    records,
                    declared_categories: dataset.collection_info.categories.into_iter().collect(),
                })
            }
            _ => Err(CatalogError::UnsupportedLayout {
                reason: "expected an array of records or an object with cupola_images / nbl_training_images"
                    .to_string(),
            }),
        }
    }
}

impl CatalogSource for JsonCatalogSource {
    fn fetch(&self) -> CatalogResult<CatalogSnapshot> {
        let contents =
            std::fs::read_to_string(&self.path).map_err(|source| CatalogError::FileRead {
                path: self.path.clone(),
                source,
            })?;
        self.parse(&contents)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
