//! Model Context Protocol (MCP) core
//!
//! Provides JSON-RPC envelope handling, the capability registries, the session
//! directory that correlates push streams with requests, and method dispatch.

pub mod dispatcher;
pub mod registry;
pub mod rpc;
pub mod sessions;
