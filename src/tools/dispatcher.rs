//! Tool-call handling: validate, search, publish, acknowledge.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{SearchError, SearchResult};
use crate::events::{Event, EventBroadcaster};
use crate::semantic::SearchEngine;
use crate::types::RankedImage;

/// `source` tag on images events triggered by a tool call.
pub const TOOL_CALL_SOURCE: &str = "tavus_tool_call";

/// `source` tag on images events triggered by a manual search.
pub const MANUAL_SOURCE: &str = "manual";

/// The closed set of tools the dispatcher recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    FetchRelevantImage,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchRelevantImage => "fetch_relevant_image",
        }
    }
}

impl FromStr for ToolName {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch_relevant_image" => Ok(Self::FetchRelevantImage),
            other => Err(SearchError::invalid_argument(format!(
                "unknown tool '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound tool call, normalized from either accepted payload shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub tool_params: Map<String, Value>,
    pub connection_id: String,
}

impl ToolCallRequest {
    /// Accepts the webhook shape
    /// `{"type": "tool_call", "tool_call": {"name", "parameters"}, "conversation_id"}`
    /// and the direct shape `{"tool_name", "tool_params", "connection_id"}`.
    pub fn from_payload(payload: &Value) -> SearchResult<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| SearchError::invalid_argument("tool call payload must be an object"))?;

        if object.get("type").and_then(Value::as_str) == Some("tool_call") {
            let call = object
                .get("tool_call")
                .and_then(Value::as_object)
                .ok_or_else(|| SearchError::invalid_argument("missing 'tool_call' object"))?;
            return Ok(Self {
                tool_name: string_field(call, "name")?,
                tool_params: object_field(call, "parameters"),
                connection_id: optional_string(object, "conversation_id"),
            });
        }

        if object.contains_key("tool_name") {
            return Ok(Self {
                tool_name: string_field(object, "tool_name")?,
                tool_params: object_field(object, "tool_params"),
                connection_id: optional_string(object, "connection_id"),
            });
        }

        Err(SearchError::invalid_argument(
            "unrecognized tool call payload: expected 'tool_call' or 'tool_name'",
        ))
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> SearchResult<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SearchError::invalid_argument(format!("missing string field '{key}'")))
}

fn object_field(object: &Map<String, Value>, key: &str) -> Map<String, Value> {
    object
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn optional_string(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Acknowledgment returned to the direct caller of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub status: ToolStatus,
    pub message: String,
    pub images_found: usize,
}

impl ToolOutput {
    pub fn success(images_found: usize, query: &str) -> Self {
        Self {
            status: ToolStatus::Success,
            message: format!("Fetched {images_found} images for '{query}'"),
            images_found,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: message.into(),
            images_found: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Runs tools against the search engine and pushes results to viewers.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    engine: Arc<SearchEngine>,
    broadcaster: EventBroadcaster,
}

impl ToolDispatcher {
    pub fn new(engine: Arc<SearchEngine>, broadcaster: EventBroadcaster) -> Self {
        Self {
            engine,
            broadcaster,
        }
    }

    pub fn engine(&self) -> &Arc<SearchEngine> {
        &self.engine
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Run a tool and fold any failure into an error acknowledgment.
    ///
    /// Nothing is published when the call fails.
    pub fn handle(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
        connection_id: &str,
    ) -> ToolOutput {
        self.try_handle(tool_name, params, connection_id)
            .unwrap_or_else(|e| {
                warn!("Tool call '{tool_name}' from '{connection_id}' failed: {e}");
                ToolOutput::error(e.to_string())
            })
    }

    pub fn handle_request(&self, request: &ToolCallRequest) -> ToolOutput {
        self.handle(
            &request.tool_name,
            &request.tool_params,
            &request.connection_id,
        )
    }

    /// Typed variant of [`handle`](Self::handle).
    pub fn try_handle(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
        connection_id: &str,
    ) -> SearchResult<ToolOutput> {
        let tool: ToolName = tool_name.parse()?;
        info!("Tool call {tool} from '{connection_id}'");

        match tool {
            ToolName::FetchRelevantImage => {
                let query = required_query(params)?;
                let top_k = self.requested_top_k(params)?;
                let images = self.search_and_publish(query, top_k, TOOL_CALL_SOURCE)?;
                Ok(ToolOutput::success(images.len(), query))
            }
        }
    }

    /// Search and push the results to every viewer as an `images` event.
    ///
    /// The result is returned whether or not anyone was listening.
    pub fn search_and_publish(
        &self,
        query: &str,
        top_k: usize,
        source: &str,
    ) -> SearchResult<Vec<RankedImage>> {
        let images = self.engine.search(query, top_k)?;
        let delivered = self
            .broadcaster
            .publish(Event::images(&images, query, source));
        debug!(
            "Pushed {} images for '{query}' ({source}) to {delivered} viewers",
            images.len()
        );
        Ok(images)
    }

    /// Publish a `test` event. Returns the number of viewers reached.
    pub fn publish_test(&self, message: &str) -> usize {
        self.broadcaster.publish(Event::test(message))
    }

    /// `top_k` from tool parameters: default when absent, clamped to
    /// `[1, max_top_k]` when present, rejected when not an integer.
    fn requested_top_k(&self, params: &Map<String, Value>) -> SearchResult<usize> {
        let max = self.engine.max_top_k();
        match params.get("top_k") {
            None | Some(Value::Null) => Ok(self.engine.default_top_k().clamp(1, max)),
            Some(Value::Number(n)) => {
                if let Some(value) = n.as_u64() {
                    Ok(usize::try_from(value).unwrap_or(usize::MAX).clamp(1, max))
                } else if n.as_i64().is_some() {
                    Ok(1)
                } else {
                    Err(SearchError::invalid_argument(format!(
                        "top_k must be an integer, got {n}"
                    )))
                }
            }
            Some(other) => Err(SearchError::invalid_argument(format!(
                "top_k must be an integer, got {other}"
            ))),
        }
    }
}

fn required_query(params: &Map<String, Value>) -> SearchResult<&str> {
    match params.get("query").and_then(Value::as_str).map(str::trim) {
        Some(query) if !query.is_empty() => Ok(query),
        _ => Err(SearchError::invalid_argument(
            "missing required parameter 'query'",
        )),
    }
}
