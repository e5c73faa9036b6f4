//! Catalog value types shared by the engine, dispatcher and transport.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One catalog image as ingested from the dataset snapshot.
///
/// Records are immutable once loaded. Search hands out clones wrapped in
/// [`RankedImage`], so nothing a caller does to a result reaches the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub nasa_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub image_url: String,
}

impl ImageRecord {
    pub fn new(nasa_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            nasa_id: nasa_id.into(),
            description: description.into(),
            keywords: Vec::new(),
            category: None,
            source: None,
            image_url: String::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = image_url.into();
        self
    }

    /// Text handed to the embedding model for this record.
    ///
    /// Plain mode embeds the description alone. Metadata mode appends the id,
    /// keywords, category and source so that queries naming them match too.
    pub fn embedding_text(&self, include_metadata: bool) -> String {
        if !include_metadata {
            return self.description.clone();
        }

        let mut parts = Vec::with_capacity(5);
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        parts.push(format!("NASA ID: {}", self.nasa_id));
        if !self.keywords.is_empty() {
            parts.push(format!("Keywords: {}", self.keywords.join(", ")));
        }
        if let Some(category) = &self.category {
            parts.push(format!("Category: {category}"));
        }
        if let Some(source) = &self.source {
            parts.push(format!("Source: {source}"));
        }
        parts.join(" ")
    }
}

/// A search hit: a copy of the record plus its score and 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedImage {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub similarity_score: f32,
    pub rank: usize,
}

/// Readiness and catalog summary used by health, stats and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total: usize,
    pub ready: bool,
    pub categories: BTreeSet<String>,
    pub sources: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    pub model: String,
}
