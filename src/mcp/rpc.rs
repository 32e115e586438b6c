//! JSON-RPC protocol representations and formatting utilities
//!
//! Envelopes are built with the MCP schema types and serialized to plain JSON
//! values, which is what travels over the push stream.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde_json::{json, Map, Value};

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const HANDLER_FAILED: i32 = -32000;

/// An inbound request as submitted on the request endpoint.
///
/// Fields are extracted leniently: anything missing or of the wrong type is
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcRequest {
    pub id: Option<Value>,
    pub method: Option<String>,
    pub params: Value,
    pub session_id: Option<String>,
}

impl RpcRequest {
    pub fn from_payload(payload: Value) -> Self {
        let Value::Object(mut object) = payload else {
            return Self::default();
        };

        Self {
            id: object.remove("id"),
            method: take_string(&mut object, "method"),
            params: object.remove("params").unwrap_or(Value::Null),
            session_id: take_string(&mut object, "sessionId").filter(|id| !id.is_empty()),
        }
    }

    /// `params.name` of a capability call.
    pub fn capability_name(&self) -> Option<&str> {
        self.params.get("name").and_then(Value::as_str)
    }

    /// `params.arguments`, defaulting to an empty object.
    pub fn arguments(&self) -> Value {
        match self.params.get("arguments") {
            Some(Value::Object(arguments)) => Value::Object(arguments.clone()),
            _ => Value::Object(Map::new()),
        }
    }
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

/// A server-initiated notification (no id).
pub fn json_rpc_notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
}

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let error = RpcError {
        code: i64::from(code),
        data,
        message: message.to_string(),
    };

    // Ids the schema type cannot hold are echoed as given.
    let Some(request_id) = id.as_ref().and_then(value_to_request_id) else {
        return json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": error
        });
    };

    let response = JsonrpcErrorResponse::new(error, Some(request_id));
    serde_json::to_value(response).expect("jsonrpc error response serialization")
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        if let Value::Object(extra) = result {
            let response =
                JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra: Some(extra) });
            return serde_json::to_value(response).expect("jsonrpc result response serialization");
        }

        return json!({
            "jsonrpc": "2.0",
            "id": request_id_to_value(request_id),
            "result": result
        });
    }

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

pub fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value),
        RequestId::Integer(value) => Value::Number(value.into()),
    }
}
