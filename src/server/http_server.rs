//! HTTP transport for the image search service
//!
//! Exposes the tool-call webhook, manual search, catalog browsing, stats and
//! health routes, plus a Server-Sent Events stream that relays every
//! published event to connected viewers.

#[cfg(feature = "http-server")]
mod imp {
    use std::convert::Infallible;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::rejection::QueryRejection;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderValue, Method, StatusCode};
    use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
    use axum::response::{IntoResponse, Json, Response};
    use axum::routing::{get, post};
    use futures::Stream;
    use serde::Deserialize;
    use serde_json::{Value, json};
    use tower_http::cors::{AllowOrigin, Any, CorsLayer};
    use tracing::{debug, error, info, warn};

    use crate::config::{ServerConfig, Settings};
    use crate::error::SearchError;
    use crate::tools::{MANUAL_SOURCE, ToolCallRequest, ToolDispatcher, ToolOutput};

    /// Page size for `/api/images` when no `limit` is given.
    const DEFAULT_LIST_LIMIT: usize = 50;

    #[derive(Clone)]
    pub(crate) struct AppState {
        pub(crate) dispatcher: ToolDispatcher,
        pub(crate) keep_alive: Duration,
    }

    /// Build the router over a dispatcher. Separated from [`serve_http`] so
    /// it can be exercised without binding a socket.
    pub fn router(dispatcher: ToolDispatcher, server: &ServerConfig) -> Router {
        let state = AppState {
            dispatcher,
            keep_alive: Duration::from_secs(server.sse_keep_alive_secs.max(1)),
        };

        Router::new()
            .route("/events", get(events))
            .route("/api/tool-call", post(tool_call))
            .route("/api/search", post(search))
            .route("/api/images", get(list_images))
            .route("/api/images/{nasa_id}", get(get_image))
            .route("/api/categories", get(categories))
            .route("/api/stats", get(stats))
            .route("/api/health", get(health))
            .route("/api/test-sse", post(test_sse))
            .layer(cors_layer(&server.cors_origins))
            .with_state(state)
    }

    fn cors_layer(origins: &[String]) -> CorsLayer {
        let base = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);

        if origins.is_empty() {
            return base.allow_origin(Any);
        }

        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Ignoring invalid CORS origin '{origin}': {e}");
                    None
                }
            })
            .collect();
        base.allow_origin(AllowOrigin::list(parsed))
    }

    /// Start the server and run until Ctrl+C.
    pub async fn serve_http(
        settings: Settings,
        dispatcher: ToolDispatcher,
        bind: String,
    ) -> anyhow::Result<()> {
        let broadcaster = dispatcher.broadcaster().clone();
        let app = router(dispatcher, &settings.server);

        let listener = tokio::net::TcpListener::bind(&bind).await?;
        info!("HTTP server listening on http://{bind}");
        info!("SSE endpoint: http://{bind}/events");
        info!("Tool-call endpoint: http://{bind}/api/tool-call");
        info!("Health check: http://{bind}/api/health");
        eprintln!("Press Ctrl+C to stop the server");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                info!("Shutting down HTTP server...");
                // Ends every open SSE stream so graceful shutdown can finish
                broadcaster.shutdown();
            })
            .await?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    async fn shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    }

    pub(crate) async fn events(
        State(state): State<AppState>,
    ) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
        let subscription = state.dispatcher.broadcaster().subscribe();
        info!(
            "Viewer {} connected ({} total)",
            subscription.connection_id(),
            state.dispatcher.broadcaster().subscriber_count()
        );

        // Dropping the stream on disconnect drops the subscription with it
        let stream = futures::stream::unfold(subscription, |mut subscription| async move {
            let event = subscription.recv().await?;
            let frame = SseEvent::default()
                .event(event.kind().as_str())
                .data(event.to_json().to_string());
            Some((Ok(frame), subscription))
        });

        Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive))
    }

    /// Malformed bodies still get a `tool_output` error, not a bare rejection.
    pub(crate) async fn tool_call(State(state): State<AppState>, body: Bytes) -> Response {
        let payload: Value = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Rejected tool call with invalid JSON body: {e}");
                return tool_output_response(ToolOutput::error(format!(
                    "invalid JSON body: {e}"
                )));
            }
        };
        debug!("Tool call payload: {payload}");

        let request = match ToolCallRequest::from_payload(&payload) {
            Ok(request) => request,
            Err(e) => return tool_output_response(ToolOutput::error(e.to_string())),
        };

        let dispatcher = state.dispatcher.clone();
        match tokio::task::spawn_blocking(move || dispatcher.handle_request(&request)).await {
            Ok(output) => tool_output_response(output),
            Err(e) => {
                error!("Tool call task failed: {e}");
                tool_output_response(ToolOutput::error(format!("tool call failed: {e}")))
            }
        }
    }

    fn tool_output_response(output: ToolOutput) -> Response {
        let status = if output.is_success() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(json!({ "tool_output": output }))).into_response()
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct SearchRequest {
        query: String,
        top_k: Option<usize>,
    }

    pub(crate) async fn search(
        State(state): State<AppState>,
        Json(request): Json<SearchRequest>,
    ) -> Response {
        let dispatcher = state.dispatcher.clone();
        let top_k = request
            .top_k
            .unwrap_or_else(|| dispatcher.engine().default_top_k());

        let result = tokio::task::spawn_blocking(move || {
            dispatcher.search_and_publish(&request.query, top_k, MANUAL_SOURCE)
        })
        .await;

        match result {
            Ok(Ok(images)) => Json(json!({
                "success": true,
                "data": { "total": images.len(), "images": images },
            }))
            .into_response(),
            Ok(Err(e)) => error_response(&e),
            Err(e) => error_response(&SearchError::internal("search task", e)),
        }
    }

    pub(crate) async fn get_image(
        State(state): State<AppState>,
        Path(nasa_id): Path<String>,
    ) -> Response {
        match state.dispatcher.engine().get_by_id(&nasa_id) {
            Some(record) => Json(json!({ "success": true, "data": record })).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "success": false,
                    "error": format!("Image '{nasa_id}' not found"),
                })),
            )
                .into_response(),
        }
    }

    #[derive(Debug, Default, Deserialize)]
    pub(crate) struct ListParams {
        category: Option<String>,
        source: Option<String>,
        limit: Option<usize>,
    }

    pub(crate) async fn list_images(
        State(state): State<AppState>,
        params: Result<Query<ListParams>, QueryRejection>,
    ) -> Response {
        let Query(params) = match params {
            Ok(params) => params,
            Err(e) => {
                return error_response(&SearchError::invalid_argument(format!(
                    "invalid query parameters: {}",
                    e.body_text()
                )));
            }
        };

        // Empty filters mean no filter
        let category = params.category.filter(|c| !c.is_empty());
        let source = params.source.filter(|s| !s.is_empty());
        let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);

        let engine = state.dispatcher.engine();
        let images = engine.list_images(category.as_deref(), source.as_deref(), limit);

        Json(json!({
            "success": true,
            "data": {
                "total": images.len(),
                "filters": { "category": category, "source": source, "limit": limit },
                "images": images,
            },
        }))
        .into_response()
    }

    pub(crate) async fn categories(State(state): State<AppState>) -> Response {
        let engine = state.dispatcher.engine();
        Json(json!({
            "success": true,
            "data": {
                "categories": engine.list_categories(),
                "sources": engine.list_sources(),
                "total_images": engine.stats().total,
            },
        }))
        .into_response()
    }

    pub(crate) async fn stats(State(state): State<AppState>) -> Response {
        let stats = state.dispatcher.engine().stats();
        Json(json!({
            "success": true,
            "data": stats,
            "connected_clients": state.dispatcher.broadcaster().subscriber_count(),
        }))
        .into_response()
    }

    pub(crate) async fn health(State(state): State<AppState>) -> Response {
        let stats = state.dispatcher.engine().stats();
        let (status, label) = if stats.ready {
            (StatusCode::OK, "healthy")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
        };
        (
            status,
            Json(json!({
                "status": label,
                "index_ready": stats.ready,
                "total_images": stats.total,
                "categories": stats.categories,
                "connected_clients": state.dispatcher.broadcaster().subscriber_count(),
            })),
        )
            .into_response()
    }

    #[derive(Debug, Default, Deserialize)]
    struct TestRequest {
        message: Option<String>,
    }

    pub(crate) async fn test_sse(State(state): State<AppState>, body: Bytes) -> Response {
        let request: TestRequest = if body.is_empty() {
            TestRequest::default()
        } else {
            match serde_json::from_slice(&body) {
                Ok(request) => request,
                Err(e) => {
                    return error_response(&SearchError::invalid_argument(format!(
                        "invalid JSON body: {e}"
                    )));
                }
            }
        };

        let message = request
            .message
            .unwrap_or_else(|| "Test event from server".to_string());
        let delivered = state.dispatcher.publish_test(&message);

        Json(json!({
            "success": true,
            "message": message,
            "delivered": delivered,
        }))
        .into_response()
    }

    fn error_response(err: &SearchError) -> Response {
        let status = match err {
            SearchError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            SearchError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            SearchError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(json!({
                "success": false,
                "error": err.to_string(),
                "code": err.status_code(),
                "suggestions": err.recovery_suggestions(),
            })),
        )
            .into_response()
    }

}

#[cfg(feature = "http-server")]
pub use imp::{router, serve_http};

#[cfg(not(feature = "http-server"))]
pub async fn serve_http(
    _config: crate::Settings,
    _dispatcher: crate::tools::ToolDispatcher,
    _bind: String,
) -> anyhow::Result<()> {
    eprintln!("HTTP server support is not compiled in.");
    eprintln!("Please rebuild with: cargo build --features http-server");
    std::process::exit(1);
}
