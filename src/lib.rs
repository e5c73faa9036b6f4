//! The main library module for cupola
//!
//! Semantic search over a fixed image catalog plus real-time fan-out of
//! results to connected viewers.

pub mod catalog;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod logging;
pub mod semantic;
pub mod server;
pub mod tools;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use catalog::{CatalogSnapshot, CatalogSource, InMemoryCatalog, JsonCatalogSource};
pub use config::Settings;
pub use error::{CatalogError, CatalogResult, SearchError, SearchResult};
pub use events::{ConnectionId, ConnectionState, Event, EventBroadcaster, EventKind, Subscription};
pub use semantic::SearchEngine;
pub use tools::{ToolCallRequest, ToolDispatcher, ToolName, ToolOutput, ToolStatus};
pub use types::{EngineStats, ImageRecord, RankedImage};
