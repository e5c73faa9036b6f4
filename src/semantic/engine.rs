//! Search engine over an embedded image catalog.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::catalog::CatalogSource;
use crate::config::{SearchConfig, Settings};
use crate::error::{SearchError, SearchResult};
use crate::types::{EngineStats, ImageRecord, RankedImage};
use crate::vector::{EmbeddingGenerator, Position, VectorIndex, create_embedder};

/// Everything a single successful `load()` produced. Never mutated after
/// construction; replaced wholesale by the next load.
#[derive(Debug)]
struct LoadedCatalog {
    index: VectorIndex<ImageRecord>,
    by_id: HashMap<String, Position>,
    categories: BTreeSet<String>,
    sources: BTreeSet<String>,
}

/// Semantic search over a catalog of [`ImageRecord`]s.
///
/// The engine is an explicit instance: construct it once at startup and
/// share it behind an `Arc`. Reads clone the active catalog pointer, so
/// searches run in parallel and a concurrent `load()` is only ever seen
/// fully applied or not at all.
pub struct SearchEngine {
    embedder: Arc<dyn EmbeddingGenerator>,
    search: SearchConfig,
    include_metadata: bool,
    active: RwLock<Option<Arc<LoadedCatalog>>>,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("model", &self.embedder.model_name())
            .field("search", &self.search)
            .field("include_metadata", &self.include_metadata)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl SearchEngine {
    /// Create an engine with no catalog loaded.
    ///
    /// Fails with `InvalidArgument` unless `1 <= default_top_k <= max_top_k`.
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>, search: SearchConfig) -> SearchResult<Self> {
        check_bounds(&search)?;
        Ok(Self {
            embedder,
            search,
            include_metadata: false,
            active: RwLock::new(None),
        })
    }

    /// Embed id, keywords, category and source along with the description.
    pub fn with_include_metadata(mut self, include_metadata: bool) -> Self {
        self.include_metadata = include_metadata;
        self
    }

    /// Build an engine with the embedder and bounds named in `settings`.
    ///
    /// The catalog is not loaded; call [`load`](Self::load) afterwards.
    pub fn from_settings(settings: &Settings) -> SearchResult<Self> {
        // Before the model loads, which may download it
        check_bounds(&settings.search)?;
        let embedder = create_embedder(&settings.semantic_search)
            .map_err(|e| SearchError::internal("embedding model initialization", e))?;
        Ok(Self::new(embedder, settings.search.clone())?
            .with_include_metadata(settings.semantic_search.include_metadata))
    }

    /// Replace the active catalog with a fresh snapshot from `source`.
    ///
    /// The new index is built off to the side and swapped in only when
    /// complete. On failure the previous catalog, if any, stays active.
    /// Returns the number of records now searchable.
    pub fn load(&self, source: &dyn CatalogSource) -> SearchResult<usize> {
        let started = Instant::now();
        let label = source.describe();
        info!("Loading catalog from {label}");

        let result = self.build(source);
        let loaded = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Catalog load from {label} failed: {e}");
                return Err(e);
            }
        };

        let total = loaded.index.len();
        let categories = loaded.categories.len();
        *self.active.write() = Some(Arc::new(loaded));

        info!(
            "Catalog ready: {total} images, {categories} categories, model {} ({:.2?})",
            self.embedder.model_name(),
            started.elapsed()
        );
        Ok(total)
    }

    fn build(&self, source: &dyn CatalogSource) -> SearchResult<LoadedCatalog> {
        let snapshot = source
            .fetch()
            .map_err(|e| SearchError::internal("catalog ingestion", e))?;
        if snapshot.records.is_empty() {
            return Err(SearchError::internal(
                "catalog ingestion",
                "source yielded zero records",
            ));
        }
        snapshot
            .validate()
            .map_err(|e| SearchError::internal("catalog ingestion", e))?;

        let texts: Vec<String> = snapshot
            .records
            .iter()
            .map(|record| record.embedding_text(self.include_metadata))
            .collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        debug!("Embedding {} catalog texts in one batch", text_refs.len());
        let vectors = self
            .embedder
            .generate_embeddings(&text_refs)
            .map_err(|e| SearchError::internal("catalog embedding", e))?;

        let mut categories = snapshot.declared_categories;
        categories.extend(snapshot.records.iter().filter_map(|r| r.category.clone()));
        let sources = snapshot
            .records
            .iter()
            .filter_map(|r| r.source.clone())
            .collect();

        let by_id = snapshot
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| (record.nasa_id.clone(), Position::new(i)))
            .collect();

        let index = VectorIndex::build(snapshot.records, vectors)
            .map_err(|e| SearchError::internal("index build", e))?;

        Ok(LoadedCatalog {
            index,
            by_id,
            categories,
            sources,
        })
    }

    /// Rank catalog images against a natural-language query.
    ///
    /// Argument checks run before the readiness check and before the
    /// embedding provider is called.
    pub fn search(&self, query: &str, top_k: usize) -> SearchResult<Vec<RankedImage>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::invalid_argument("query must not be empty"));
        }
        if top_k == 0 || top_k > self.search.max_top_k {
            return Err(SearchError::invalid_argument(format!(
                "top_k must be between 1 and {}, got {top_k}",
                self.search.max_top_k
            )));
        }

        let catalog = self.snapshot().ok_or(SearchError::NotReady)?;

        let vector = self
            .embedder
            .generate_embeddings(&[query])
            .map_err(|e| SearchError::internal("query embedding", e))?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::internal("query embedding", "provider returned no vector"))?;

        let hits = catalog
            .index
            .query(&vector, top_k)
            .map_err(|e| SearchError::internal("index query", e))?;

        debug!("Search '{query}' (top_k={top_k}) matched {} images", hits.len());

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, (record, score))| RankedImage {
                record: record.clone(),
                similarity_score: score,
                rank: i + 1,
            })
            .collect())
    }

    /// Look a record up by `nasa_id`. `None` means not found.
    pub fn get_by_id(&self, nasa_id: &str) -> Option<ImageRecord> {
        let catalog = self.snapshot()?;
        let position = catalog.by_id.get(nasa_id)?;
        catalog.index.get(*position).cloned()
    }

    /// Sorted distinct categories seen at load time.
    pub fn list_categories(&self) -> Vec<String> {
        self.snapshot()
            .map(|c| c.categories.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted distinct sources seen at load time.
    pub fn list_sources(&self) -> Vec<String> {
        self.snapshot()
            .map(|c| c.sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Browse the catalog in load order.
    ///
    /// `category` and `source` must match exactly when given. At most
    /// `limit` records are returned. Empty before the first load.
    pub fn list_images(
        &self,
        category: Option<&str>,
        source: Option<&str>,
        limit: usize,
    ) -> Vec<ImageRecord> {
        let Some(catalog) = self.snapshot() else {
            return Vec::new();
        };
        catalog
            .index
            .records()
            .iter()
            .filter(|r| category.is_none_or(|c| r.category.as_deref() == Some(c)))
            .filter(|r| source.is_none_or(|s| r.source.as_deref() == Some(s)))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> EngineStats {
        let catalog = self.snapshot();
        EngineStats {
            total: catalog.as_ref().map_or(0, |c| c.index.len()),
            ready: catalog.is_some(),
            categories: catalog
                .as_ref()
                .map(|c| c.categories.clone())
                .unwrap_or_default(),
            sources: catalog
                .as_ref()
                .map(|c| c.sources.clone())
                .unwrap_or_default(),
            dimension: catalog.as_ref().map(|c| c.index.dimension().get()),
            model: self.embedder.model_name(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn max_top_k(&self) -> usize {
        self.search.max_top_k
    }

    pub fn default_top_k(&self) -> usize {
        self.search.default_top_k
    }

    fn snapshot(&self) -> Option<Arc<LoadedCatalog>> {
        self.active.read().clone()
    }
}

fn check_bounds(search: &SearchConfig) -> SearchResult<()> {
    search.validate().map_err(SearchError::invalid_argument)
}
