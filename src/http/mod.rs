//! HTTP transport layer for the Model Context Protocol
//!
//! Provides the push stream (`/sse`), the request endpoint (`/messages`) and the
//! plain request/response endpoints for listings, direct tool calls, stored
//! query results and diagnostics.

pub mod handlers;
pub mod sse;
