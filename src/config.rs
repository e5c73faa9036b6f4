//! Configuration module for the image search service.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CUPOLA_` and use double underscores
//! to separate nested levels:
//! - `CUPOLA_SEARCH__MAX_TOP_K=50` sets `search.max_top_k`
//! - `CUPOLA_SERVER__BIND=127.0.0.1:8080` sets `server.bind`
//! - `CUPOLA_SEMANTIC_SEARCH__MODEL=hashing` sets `semantic_search.model`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the settings file, searched for from the working
/// directory upwards.
pub const CONFIG_DIR: &str = ".cupola";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .cupola is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Dataset settings
    #[serde(default)]
    pub data: DataConfig,

    /// Query bounds
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding model settings
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    /// HTTP transport settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DataConfig {
    /// JSON dataset snapshot loaded at startup
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// Result count used when a tool call does not name one
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Upper bound accepted for `top_k`
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SemanticSearchConfig {
    /// Model to use for embeddings ("hashing" selects the offline embedder)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector dimension for the hashing embedder (fastembed models report their own)
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Embed id, keywords, category and source along with the description
    #[serde(default = "default_false")]
    pub include_metadata: bool,

    /// Show a progress bar while a model downloads
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// HTTP server bind address
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Interval between SSE keep-alive comments (seconds)
    #[serde(default = "default_keep_alive")]
    pub sse_keep_alive_secs: u64,

    /// Origins allowed by CORS; empty allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset, e.g. "info" or "cupola=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/iss_images_organized.json")
}
fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    20
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_bind_address() -> String {
    "0.0.0.0:5002".to_string()
}
fn default_keep_alive() -> u64 {
    15
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
    ]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            data: DataConfig::default(),
            search: SearchConfig::default(),
            semantic_search: SemanticSearchConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
        }
    }
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_dimension(),
            include_metadata: false,
            show_download_progress: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            sse_keep_alive_secs: default_keep_alive(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SearchConfig {
    /// Check the bounds are usable: `max_top_k >= 1` and
    /// `default_top_k` within `[1, max_top_k]`.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_top_k == 0 {
            return Err("search.max_top_k must be at least 1".to_string());
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(format!(
                "search.default_top_k ({}) must be between 1 and search.max_top_k ({})",
                self.default_top_k, self.max_top_k
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .cupola directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("CUPOLA_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        self.search.validate()?;
        if self.server.sse_keep_alive_secs == 0 {
            return Err("server.sse_keep_alive_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Find the workspace root by looking for .cupola directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .cupola is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Resolve the dataset path against the workspace root when relative.
    pub fn dataset_path(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) if self.data.dataset_path.is_relative() => {
                root.join(&self.data.dataset_path)
            }
            _ => self.data.dataset_path.clone(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = r#"# Cupola Configuration File

# Version of the configuration schema
version = 1

[data]
# JSON dataset snapshot (relative paths resolve against the workspace root)
dataset_path = "data/iss_images_organized.json"

[search]
# Result count used when a tool call does not name one
default_top_k = 5

# Largest top_k accepted by search
max_top_k = 20

[semantic_search]
# Embedding model: a fastembed model name such as "AllMiniLML6V2",
# or "hashing" for the offline bag-of-words embedder
model = "AllMiniLML6V2"

# Vector dimension, only used by the hashing embedder
dimension = 384

# Embed NASA id, keywords, category and source together with the description
include_metadata = false

show_download_progress = true

[server]
# HTTP server bind address
bind = "0.0.0.0:5002"

# Seconds between SSE keep-alive comments
sse_keep_alive_secs = 15

# Allowed CORS origins (empty list allows any origin)
cors_origins = ["http://localhost:3000", "http://localhost:3001"]

[logging]
# Default filter when RUST_LOG is not set
level = "info"
"#;

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Ok(config_path)
    }
}
