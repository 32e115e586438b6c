//! Built-in capabilities and the query result store
//!
//! Provides the SQL tools, database resources and prompt templates served over
//! the MCP protocol.

pub mod prompts;
pub mod query_results;
pub mod resources;
pub mod tools;

use crate::mcp::registry::Capabilities;

/// Registries pre-populated with every built-in tool, resource and prompt.
pub fn default_capabilities() -> Capabilities {
    let capabilities = Capabilities::new();
    tools::register(&capabilities.tools);
    resources::register(&capabilities.resources);
    prompts::register(&capabilities.prompts);
    capabilities
}
