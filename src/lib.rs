use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod database;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;

use mcp::{
    dispatcher::Dispatcher,
    registry::{Capabilities, HandlerContext},
    sessions::SessionDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionDirectory>,
    pub capabilities: Arc<Capabilities>,
    pub context: HandlerContext,
    pub dispatcher: Arc<Dispatcher>,
    pub session_buffer: usize,
}

impl AppState {
    pub fn new(
        capabilities: Capabilities,
        context: HandlerContext,
        session_buffer: usize,
        max_inflight_per_session: usize,
    ) -> Self {
        let capabilities = Arc::new(capabilities);
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&capabilities), context.clone()));
        Self {
            sessions: Arc::new(SessionDirectory::new(max_inflight_per_session)),
            capabilities,
            context,
            dispatcher,
            session_buffer: session_buffer.max(1),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/diagnostic", get(http::handlers::diagnostic))
        .route(
            "/sse",
            get(http::sse::sse_endpoint).post(http::sse::sse_endpoint),
        )
        .route("/messages", post(http::handlers::messages_endpoint))
        .route("/tools", get(http::handlers::list_tools))
        .route("/tools/call", post(http::handlers::call_tool))
        .route("/resources", get(http::handlers::list_resources))
        .route("/prompts", get(http::handlers::list_prompts))
        .route("/query-results", get(http::handlers::list_query_results))
        .route(
            "/query-results/{uuid}",
            get(http::handlers::get_query_result),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
