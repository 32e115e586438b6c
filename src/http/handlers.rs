//! Axum HTTP handlers for the web server
//!
//! Provides the JSON-RPC request endpoint, capability listings, direct tool
//! invocation, stored query results and service metadata endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::domain::query_results::QueryResultRecord;
use crate::errors::AppError;
use crate::mcp::dispatcher::invoke;
use crate::mcp::registry::Registry;
use crate::mcp::rpc::RpcRequest;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct QueryResultPaths {
    pub list: &'static str,
    pub detail: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPaths {
    pub sse: &'static str,
    pub messages: &'static str,
    pub tools: &'static str,
    pub tool_call: &'static str,
    pub resources: &'static str,
    pub prompts: &'static str,
    pub diagnostics: &'static str,
    pub query_results: QueryResultPaths,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub name: &'static str,
    pub transport: &'static str,
    pub endpoints: EndpointPaths,
    pub active_sessions: usize,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct QueryResultsResponse {
    pub results: Vec<QueryResultRecord>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn diagnostic(State(state): State<AppState>) -> Json<DiagnosticResponse> {
    Json(DiagnosticResponse {
        status: "ok",
        message: "MCP Server is running",
        name: env!("CARGO_PKG_NAME"),
        transport: "http/sse",
        endpoints: EndpointPaths {
            sse: "/sse",
            messages: "/messages",
            tools: "/tools",
            tool_call: "/tools/call",
            resources: "/resources",
            prompts: "/prompts",
            diagnostics: "/diagnostic",
            query_results: QueryResultPaths {
                list: "/query-results",
                detail: "/query-results/{uuid}",
            },
        },
        active_sessions: state.sessions.len(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Submits a JSON-RPC request whose response is delivered on the push stream
/// of the session named in `sessionId`.
pub async fn messages_endpoint(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "invalid JSON submitted to messages endpoint");
            return Json(json!({ "error": "Invalid JSON" }));
        }
    };

    let request = RpcRequest::from_payload(payload);
    let Some(session) = request
        .session_id
        .as_deref()
        .and_then(|id| state.sessions.lookup(id))
    else {
        warn!(
            session_id = request.session_id.as_deref().unwrap_or_default(),
            "missing or invalid sessionId"
        );
        return Json(json!({ "error": "Missing or invalid sessionId" }));
    };

    debug!(
        session_id = %session.id,
        method = request.method.as_deref().unwrap_or_default(),
        "request dispatched"
    );
    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move { dispatcher.dispatch(session, request).await });

    Json(json!({ "status": "dispatched" }))
}

fn listing(key: &str, registry: &Registry) -> Json<Value> {
    let entries = registry.list();
    let mut body = Map::new();
    body.insert("count".to_string(), json!(entries.len()));
    body.insert(key.to_string(), json!(entries));
    Json(Value::Object(body))
}

pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    listing("tools", &state.capabilities.tools)
}

pub async fn list_resources(State(state): State<AppState>) -> Json<Value> {
    listing("resources", &state.capabilities.resources)
}

pub async fn list_prompts(State(state): State<AppState>) -> Json<Value> {
    listing("prompts", &state.capabilities.prompts)
}

/// Invokes a tool directly and answers on the same connection.
pub async fn call_tool(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::bad_request("invalid_json", "request body must be valid JSON"))?;
    let request = RpcRequest::from_payload(json!({ "params": payload }));

    let name = request.capability_name().ok_or_else(|| {
        AppError::bad_request("missing_name", "request body must contain a string name")
    })?;

    let Some(tool) = state.capabilities.tools.get(name) else {
        return Err(AppError::not_found(format!("Tool not found: {name}")));
    };

    match invoke(tool, state.context.clone(), request.arguments()).await {
        Ok(result) => Ok(Json(json!({ "result": result }))),
        Err(err) => {
            warn!(tool = %name, error = %err, "direct tool call failed");
            Ok(Json(json!({ "error": err.to_string() })))
        }
    }
}

pub async fn list_query_results(State(state): State<AppState>) -> Json<QueryResultsResponse> {
    Json(QueryResultsResponse {
        results: state.context.query_results.list(),
    })
}

pub async fn get_query_result(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<QueryResultRecord>, AppError> {
    state
        .context
        .query_results
        .get(&uuid)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Result with UUID {uuid} not found")))
}
