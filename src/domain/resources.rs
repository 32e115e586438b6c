//! Model Context Protocol resources describing the connected database

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::query_results::rows_to_value;
use crate::domain::tools::{describe_table, list_tables};
use crate::errors::HandlerError;
use crate::mcp::registry::{CapabilityHandler, HandlerContext, Registry};

pub const SCHEMA_RESOURCE: &str = "schema";
pub const TABLES_RESOURCE: &str = "tables";

pub fn register(registry: &Registry) {
    registry.register(
        SCHEMA_RESOURCE,
        json!({ "uriPattern": "/schema" }),
        Arc::new(SchemaResource),
    );
    registry.register(
        TABLES_RESOURCE,
        json!({ "uriPattern": "/tables" }),
        Arc::new(TablesResource),
    );
}

fn table_names(tables: &[serde_json::Map<String, Value>]) -> Vec<String> {
    tables
        .iter()
        .filter_map(|table| table.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

pub struct SchemaResource;

#[async_trait]
impl CapabilityHandler for SchemaResource {
    async fn call(&self, ctx: &HandlerContext, _args: Value) -> Result<Value, HandlerError> {
        let tables = list_tables(ctx.database.as_ref()).await?;
        let mut schema = Vec::with_capacity(tables.len());
        for name in table_names(&tables) {
            let columns = describe_table(ctx.database.as_ref(), &name).await?;
            schema.push(json!({
                "table": name,
                "columns": rows_to_value(&columns),
            }));
        }

        Ok(json!({ "schema": schema }))
    }
}

pub struct TablesResource;

#[async_trait]
impl CapabilityHandler for TablesResource {
    async fn call(&self, ctx: &HandlerContext, _args: Value) -> Result<Value, HandlerError> {
        let tables = list_tables(ctx.database.as_ref()).await?;
        Ok(json!({ "tables": table_names(&tables) }))
    }
}
