//! Push transport: one server-sent event stream per session
//!
//! Opening the stream attaches a session and queues the handshake sequence
//! ahead of the session's outbound queue, so the handshake is always
//! delivered before any dispatched response. The stream then idles with
//! periodic keepalive comments. Dropping the stream (client gone, write
//! failure or shutdown) detaches the session exactly once.

use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::info;

use crate::domain::tools::EXECUTE_QUERY;
use crate::mcp::rpc::json_rpc_notification;
use crate::mcp::sessions::SessionDirectory;
use crate::AppState;

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

const WELCOME_MESSAGE: &str = "Welcome to the MCP server";
const USAGE_MESSAGE: &str = "You are connected to the MCP server. Use tools/call, resources/read, \
or prompts/get via JSON-RPC on /messages with your sessionId. See /diagnostic for more info.";

pub async fn sse_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(PushStream::open(&state)).keep_alive(
        KeepAlive::new()
            .interval(KEEPALIVE_INTERVAL)
            .text("keepalive"),
    )
}

/// Detaches its session when dropped.
struct Attachment {
    sessions: Arc<SessionDirectory>,
    session_id: String,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.sessions.detach(&self.session_id);
        info!(session_id = %self.session_id, "push stream closed");
    }
}

pub struct PushStream {
    messages: Pin<Box<dyn Stream<Item = Value> + Send>>,
    attachment: Attachment,
}

impl PushStream {
    pub fn open(state: &AppState) -> Self {
        let (sink, outbound) = mpsc::channel(state.session_buffer);
        let session_id = state.sessions.attach(sink);
        let handshake = handshake_messages(state, &session_id);

        info!(session_id = %session_id, "push stream opened");
        let messages = tokio_stream::iter(handshake).chain(ReceiverStream::new(outbound));
        Self {
            messages: Box::pin(messages),
            attachment: Attachment {
                sessions: Arc::clone(&state.sessions),
                session_id,
            },
        }
    }

    pub fn session_id(&self) -> &str {
        &self.attachment.session_id
    }
}

impl Stream for PushStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.messages
            .as_mut()
            .poll_next(cx)
            .map(|message| message.map(|message| Ok(frame(&message))))
    }
}

/// `event: message` with the JSON document as data.
fn frame(message: &Value) -> Event {
    Event::default().event("message").data(message.to_string())
}

/// Welcome, the three capability snapshots, then a usage notice.
pub fn handshake_messages(state: &AppState, session_id: &str) -> Vec<Value> {
    let capabilities = &state.capabilities;
    let tools = capabilities.tools.list();
    let example_tool = if capabilities.tools.get(EXECUTE_QUERY).is_some() {
        EXECUTE_QUERY.to_string()
    } else {
        tools
            .first()
            .map(|tool| tool.name.clone())
            .unwrap_or_else(|| EXECUTE_QUERY.to_string())
    };

    vec![
        json_rpc_notification(
            "mcp/handshake",
            json!({ "message": WELCOME_MESSAGE, "sessionId": session_id }),
        ),
        json_rpc_notification("tools/list", json!({ "tools": tools })),
        json_rpc_notification(
            "resources/list",
            json!({ "resources": capabilities.resources.list() }),
        ),
        json_rpc_notification(
            "prompts/list",
            json!({ "prompts": capabilities.prompts.list() }),
        ),
        json_rpc_notification(
            "server/usage",
            json!({
                "message": USAGE_MESSAGE,
                "example": {
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "tools/call",
                    "params": { "name": example_tool, "arguments": { "sql": "SELECT 1" } },
                    "sessionId": session_id
                }
            }),
        ),
    ]
}
