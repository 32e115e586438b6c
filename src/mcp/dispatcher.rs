//! JSON-RPC method dispatch
//!
//! [`Dispatcher::handle`] turns a request into a response envelope.
//! [`Dispatcher::dispatch`] does the same on behalf of a session and enqueues
//! the envelope on that session's push queue; it never sees the HTTP
//! connection the request arrived on.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::HandlerError;
use crate::mcp::registry::{Capabilities, CapabilityEntry, HandlerContext, Registry};
use crate::mcp::rpc::{
    is_json_rpc_error, json_rpc_error, json_rpc_result, RpcRequest, HANDLER_FAILED,
    METHOD_NOT_FOUND,
};
use crate::mcp::sessions::SessionHandle;

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct Dispatcher {
    capabilities: Arc<Capabilities>,
    context: HandlerContext,
}

impl Dispatcher {
    pub fn new(capabilities: Arc<Capabilities>, context: HandlerContext) -> Self {
        Self {
            capabilities,
            context,
        }
    }

    pub async fn handle(&self, request: &RpcRequest) -> Value {
        let id = request.id.clone();
        let method = request.method.as_deref().unwrap_or_default();
        let audit_params = redact_audit_params(Some(&request.params));

        let response = match method {
            "initialize" => json_rpc_result(id, initialize_result()),
            "tools/call" => self.call_capability(&self.capabilities.tools, request).await,
            "resources/read" => {
                self.call_capability(&self.capabilities.resources, request)
                    .await
            }
            "prompts/get" => self.call_capability(&self.capabilities.prompts, request).await,
            other => json_rpc_error(id, METHOD_NOT_FOUND, &format!("Method not found: {other}")),
        };

        info!(
            method = %method,
            params = %audit_params,
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp action audited"
        );

        response
    }

    /// Handles `request` and enqueues the response on the session's queue.
    ///
    /// A session that detached in the meantime only costs a log line.
    pub async fn dispatch(&self, session: SessionHandle, request: RpcRequest) {
        let Ok(_permit) = Arc::clone(&session.permits).acquire_owned().await else {
            warn!(session_id = %session.id, "session permits closed; dropping request");
            return;
        };

        let response = self.handle(&request).await;
        if session.sink.send(response).await.is_err() {
            warn!(
                session_id = %session.id,
                method = request.method.as_deref().unwrap_or_default(),
                "session closed before response was delivered; dropping response"
            );
        }
    }

    async fn call_capability(&self, registry: &Registry, request: &RpcRequest) -> Value {
        let id = request.id.clone();
        let name = request.capability_name().unwrap_or_default();
        let Some(entry) = registry.get(name) else {
            return json_rpc_error(
                id,
                METHOD_NOT_FOUND,
                &format!("{} not found: {name}", registry.kind()),
            );
        };

        match invoke(entry, self.context.clone(), request.arguments()).await {
            Ok(result) => json_rpc_result(id, result),
            Err(err) => {
                warn!(capability = %name, error = %err, "capability handler failed");
                json_rpc_error(id, HANDLER_FAILED, &err.to_string())
            }
        }
    }
}

/// Runs a handler on its own task so that a panic surfaces as an error
/// instead of tearing down the caller.
pub async fn invoke(
    entry: Arc<CapabilityEntry>,
    ctx: HandlerContext,
    args: Value,
) -> Result<Value, HandlerError> {
    let task = tokio::spawn(async move { entry.handler.call(&ctx, args).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, "capability handler task aborted");
            Err(HandlerError::Panicked)
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": SUPPORTED_PROTOCOL_VERSION,
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false },
            "prompts": { "listChanged": false }
        },
        "message": "MCP Server initialized"
    })
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey" | "connection_string"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::{mpsc, Semaphore};

    use super::*;
    use crate::database::SqliteDatabase;
    use crate::domain::query_results::QueryResultStore;
    use crate::mcp::registry::{CapabilityHandler, FnHandler};

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CapabilityHandler for CountingHandler {
        async fn call(&self, _ctx: &HandlerContext, args: Value) -> Result<Value, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(args)
        }
    }

    fn context() -> HandlerContext {
        HandlerContext {
            database: Arc::new(SqliteDatabase::open_in_memory().expect("in-memory database")),
            query_results: Arc::new(QueryResultStore::new()),
            max_rows: 100,
        }
    }

    fn dispatcher_with(calls: Arc<AtomicUsize>) -> Dispatcher {
        let capabilities = Capabilities::new();
        capabilities
            .tools
            .register("echo", json!({}), Arc::new(CountingHandler { calls }));
        capabilities.tools.register(
            "fail",
            json!({}),
            Arc::new(FnHandler::new(|_args| async {
                Err::<Value, _>(HandlerError::failed("table is locked"))
            })),
        );
        capabilities.tools.register(
            "explode",
            json!({}),
            Arc::new(FnHandler::new(|_args| async {
                if true {
                    panic!("handler bug");
                }
                Ok::<_, HandlerError>(Value::Null)
            })),
        );
        capabilities.resources.register(
            "mcp_SQL_tables",
            json!({"uriPattern": "/tables"}),
            Arc::new(FnHandler::new(|_args| async {
                Ok::<_, HandlerError>(json!({"tables": ["users"]}))
            })),
        );
        capabilities.prompts.register(
            "greet",
            json!({"who": "string"}),
            Arc::new(FnHandler::new(|args: Value| async move {
                Ok::<_, HandlerError>(json!({"text": format!("hello {}", args["who"])}))
            })),
        );
        Dispatcher::new(Arc::new(capabilities), context())
    }

    fn request(value: Value) -> RpcRequest {
        RpcRequest::from_payload(value)
    }

    #[tokio::test]
    async fn tools_call_returns_handler_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(Arc::clone(&calls));

        let response = dispatcher
            .handle(&request(json!({
                "id": 1,
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {"x": 1}}
            })))
            .await;

        assert_eq!(response["jsonrpc"], json!("2.0"));
        assert_eq!(response["id"], json!(1));
        assert_eq!(response["result"], json!({"x": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found_and_invokes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(Arc::clone(&calls));

        let response = dispatcher
            .handle(&request(json!({
                "id": "a",
                "method": "tools/call",
                "params": {"name": "missing", "arguments": {}}
            })))
            .await;

        assert_eq!(response["id"], json!("a"));
        assert_eq!(response["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(response["error"]["message"], json!("Tool not found: missing"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_failure_carries_message() {
        let dispatcher = dispatcher_with(Arc::new(AtomicUsize::new(0)));
        let response = dispatcher
            .handle(&request(json!({
                "id": 2,
                "method": "tools/call",
                "params": {"name": "fail"}
            })))
            .await;

        assert_eq!(response["error"]["code"], json!(HANDLER_FAILED));
        assert_eq!(response["error"]["message"], json!("table is locked"));
    }

    #[tokio::test]
    async fn handler_panic_becomes_handler_failure() {
        let dispatcher = dispatcher_with(Arc::new(AtomicUsize::new(0)));
        let response = dispatcher
            .handle(&request(json!({
                "id": 3,
                "method": "tools/call",
                "params": {"name": "explode"}
            })))
            .await;

        assert_eq!(response["error"]["code"], json!(HANDLER_FAILED));
        assert_eq!(response["error"]["message"], json!("handler panicked"));
    }

    #[tokio::test]
    async fn resources_and_prompts_resolve_through_their_registries() {
        let dispatcher = dispatcher_with(Arc::new(AtomicUsize::new(0)));

        let resource = dispatcher
            .handle(&request(json!({
                "id": 4,
                "method": "resources/read",
                "params": {"name": "mcp_tables"}
            })))
            .await;
        assert_eq!(resource["result"], json!({"tables": ["users"]}));

        let prompt = dispatcher
            .handle(&request(json!({
                "id": 5,
                "method": "prompts/get",
                "params": {"name": "greet", "arguments": {"who": "ada"}}
            })))
            .await;
        assert_eq!(prompt["result"], json!({"text": "hello \"ada\""}));

        let missing = dispatcher
            .handle(&request(json!({
                "id": 6,
                "method": "prompts/get",
                "params": {"name": "echo"}
            })))
            .await;
        assert_eq!(missing["error"]["message"], json!("Prompt not found: echo"));
    }

    #[tokio::test]
    async fn missing_name_is_not_found_and_invokes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(Arc::clone(&calls));

        let resource = dispatcher
            .handle(&request(json!({"id": 7, "method": "resources/read", "params": {}})))
            .await;
        assert_eq!(resource["id"], json!(7));
        assert_eq!(resource["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(resource["error"]["message"], json!("Resource not found: "));

        let tool = dispatcher
            .handle(&request(json!({"id": 8, "method": "tools/call", "params": {"name": 5}})))
            .await;
        assert_eq!(tool["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(tool["error"]["message"], json!("Tool not found: "));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn initialize_always_succeeds() {
        let dispatcher = dispatcher_with(Arc::new(AtomicUsize::new(0)));
        let response = dispatcher
            .handle(&request(json!({"id": 8, "method": "initialize"})))
            .await;

        assert_eq!(response["result"]["protocolVersion"], json!(SUPPORTED_PROTOCOL_VERSION));
        assert_eq!(response["result"]["serverInfo"]["name"], json!(env!("CARGO_PKG_NAME")));
        assert!(response["result"]["capabilities"]["prompts"].is_object());
    }

    #[tokio::test]
    async fn unknown_method_is_named_in_error() {
        let dispatcher = dispatcher_with(Arc::new(AtomicUsize::new(0)));
        let response = dispatcher
            .handle(&request(json!({"id": 9, "method": "tools/destroy"})))
            .await;

        assert_eq!(response["error"]["code"], json!(METHOD_NOT_FOUND));
        assert_eq!(response["error"]["message"], json!("Method not found: tools/destroy"));
    }

    #[tokio::test]
    async fn dispatch_enqueues_on_session_sink() {
        let dispatcher = dispatcher_with(Arc::new(AtomicUsize::new(0)));
        let (sink, mut rx) = mpsc::channel(4);
        let session = SessionHandle {
            id: "s-1".to_string(),
            sink,
            attached_at: chrono::Utc::now(),
            permits: Arc::new(Semaphore::new(1)),
        };

        dispatcher
            .dispatch(
                session.clone(),
                request(json!({
                    "id": 10,
                    "method": "tools/call",
                    "params": {"name": "echo", "arguments": {"y": 2}}
                })),
            )
            .await;

        let delivered = rx.recv().await.expect("response delivered");
        assert_eq!(delivered["id"], json!(10));
        assert_eq!(delivered["result"], json!({"y": 2}));
        assert_eq!(session.permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn dispatch_to_closed_session_is_dropped_quietly() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(Arc::clone(&calls));
        let (sink, rx) = mpsc::channel(1);
        drop(rx);
        let session = SessionHandle {
            id: "gone".to_string(),
            sink,
            attached_at: chrono::Utc::now(),
            permits: Arc::new(Semaphore::new(1)),
        };

        dispatcher
            .dispatch(
                session,
                request(json!({"id": 11, "method": "tools/call", "params": {"name": "echo"}})),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "mcp_execute_query",
            "arguments": {
                "sql": "SELECT 1",
                "password": "should-not-appear",
                "api_key": "should-not-appear",
                "nested": {
                    "secret": "should-not-appear"
                }
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["name"], json!("mcp_execute_query"));
        assert_eq!(redacted["arguments"]["sql"], json!("SELECT 1"));
        assert_eq!(redacted["arguments"]["password"], json!("[REDACTED]"));
        assert_eq!(redacted["arguments"]["api_key"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"]["secret"],
            json!("[REDACTED]")
        );
    }
}
