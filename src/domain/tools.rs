//! SQL tools exposed via Model Context Protocol
//!
//! Every tool is registered under its `mcp_` name; callers using the
//! `mcp_SQL_` spelling reach the same handler through the registry alias.
//! Query-running tools record their rows in the query result store and return
//! the record's uuid alongside the rows.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::{Database, Row};
use crate::domain::query_results::{rows_to_value, QueryResultMetadata};
use crate::errors::HandlerError;
use crate::mcp::registry::{CapabilityHandler, HandlerContext, Registry};

pub const EXECUTE_QUERY: &str = "mcp_execute_query";
pub const PAGINATED_QUERY: &str = "mcp_paginated_query";
pub const TABLE_DETAILS: &str = "mcp_table_details";
pub const DISCOVER_TABLES: &str = "mcp_discover_tables";
pub const CURSOR_GUIDE: &str = "mcp_cursor_guide";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryParams {
    pub sql: Option<String>,
    pub max_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedQueryParams {
    pub sql: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDetailsParams {
    pub table_name: Option<String>,
}

pub fn register(registry: &Registry) {
    registry.register(
        EXECUTE_QUERY,
        json!({
            "sql": "string (required)",
            "maxRows": "int (optional, default 1000)"
        }),
        Arc::new(ExecuteQueryTool),
    );
    registry.register(
        PAGINATED_QUERY,
        json!({
            "sql": "string (required)",
            "page": "int (required)",
            "pageSize": "int (required)"
        }),
        Arc::new(PaginatedQueryTool),
    );
    registry.register(
        TABLE_DETAILS,
        json!({ "tableName": "string (required)" }),
        Arc::new(TableDetailsTool),
    );
    registry.register(DISCOVER_TABLES, json!({}), Arc::new(DiscoverTablesTool));
    registry.register(
        CURSOR_GUIDE,
        json!({ "random_string": "string?" }),
        Arc::new(CursorGuideTool),
    );
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, HandlerError> {
    serde_json::from_value(args)
        .map_err(|err| HandlerError::invalid_arguments(format!("invalid arguments: {err}")))
}

fn required_sql(sql: Option<String>) -> Result<String, HandlerError> {
    sql.map(|value| value.trim().trim_end_matches(';').trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| HandlerError::invalid_arguments("sql is required"))
}

/// Stores the rows and returns the new record's uuid.
fn record_result(ctx: &HandlerContext, query: &str, rows: &[Row]) -> String {
    let uuid = Uuid::new_v4().to_string();
    let metadata = QueryResultMetadata {
        uuid: uuid.clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        query: query.to_string(),
        row_count: rows.len(),
    };
    ctx.query_results.put(uuid.clone(), metadata, rows.to_vec());
    uuid
}

pub async fn list_tables(database: &dyn Database) -> Result<Vec<Row>, HandlerError> {
    Ok(database
        .query(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
            usize::MAX,
        )
        .await?)
}

pub async fn describe_table(database: &dyn Database, table: &str) -> Result<Vec<Row>, HandlerError> {
    if !IDENTIFIER.is_match(table) {
        return Err(HandlerError::invalid_arguments(format!(
            "invalid table name: {table}"
        )));
    }

    let columns = database
        .query(&format!("PRAGMA table_info(\"{table}\")"), usize::MAX)
        .await?;
    if columns.is_empty() {
        return Err(HandlerError::failed(format!("table not found: {table}")));
    }
    Ok(columns)
}

pub struct ExecuteQueryTool;

#[async_trait]
impl CapabilityHandler for ExecuteQueryTool {
    async fn call(&self, ctx: &HandlerContext, args: Value) -> Result<Value, HandlerError> {
        let params: ExecuteQueryParams = parse_args(args)?;
        let sql = required_sql(params.sql)?;
        let max_rows = match params.max_rows {
            None => ctx.max_rows,
            Some(0) => return Err(HandlerError::invalid_arguments("maxRows must be at least 1")),
            Some(requested) => requested.min(ctx.max_rows),
        };

        let rows = ctx.database.query(&sql, max_rows).await?;
        let uuid = record_result(ctx, &sql, &rows);

        Ok(json!({
            "uuid": uuid,
            "rowCount": rows.len(),
            "results": rows_to_value(&rows),
        }))
    }
}

pub struct PaginatedQueryTool;

#[async_trait]
impl CapabilityHandler for PaginatedQueryTool {
    async fn call(&self, ctx: &HandlerContext, args: Value) -> Result<Value, HandlerError> {
        let params: PaginatedQueryParams = parse_args(args)?;
        let sql = required_sql(params.sql)?;
        let page = params
            .page
            .filter(|page| *page >= 1)
            .ok_or_else(|| HandlerError::invalid_arguments("page must be at least 1"))?;
        let page_size = params
            .page_size
            .filter(|size| (1..=ctx.max_rows).contains(size))
            .ok_or_else(|| {
                HandlerError::invalid_arguments(format!(
                    "pageSize must be between 1 and {}",
                    ctx.max_rows
                ))
            })?;

        let offset = (page - 1).saturating_mul(page_size as u64);
        let paged_sql = format!("SELECT * FROM ({sql}) LIMIT {page_size} OFFSET {offset}");
        let rows = ctx.database.query(&paged_sql, page_size).await?;
        let uuid = record_result(ctx, &paged_sql, &rows);

        Ok(json!({
            "uuid": uuid,
            "page": page,
            "pageSize": page_size,
            "rowCount": rows.len(),
            "results": rows_to_value(&rows),
        }))
    }
}

pub struct TableDetailsTool;

#[async_trait]
impl CapabilityHandler for TableDetailsTool {
    async fn call(&self, ctx: &HandlerContext, args: Value) -> Result<Value, HandlerError> {
        let params: TableDetailsParams = parse_args(args)?;
        let table = params
            .table_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| HandlerError::invalid_arguments("tableName is required"))?;

        let columns = describe_table(ctx.database.as_ref(), &table).await?;
        Ok(json!({
            "tableName": table,
            "columns": rows_to_value(&columns),
        }))
    }
}

pub struct DiscoverTablesTool;

#[async_trait]
impl CapabilityHandler for DiscoverTablesTool {
    async fn call(&self, ctx: &HandlerContext, _args: Value) -> Result<Value, HandlerError> {
        let tables = list_tables(ctx.database.as_ref()).await?;
        Ok(json!({
            "count": tables.len(),
            "tables": rows_to_value(&tables),
        }))
    }
}

pub struct CursorGuideTool;

#[async_trait]
impl CapabilityHandler for CursorGuideTool {
    async fn call(&self, _ctx: &HandlerContext, _args: Value) -> Result<Value, HandlerError> {
        Ok(json!({
            "guide": [
                "1. Open GET /sse and read the sessionId from the mcp/handshake event.",
                "2. POST JSON-RPC requests to /messages with that sessionId in the body.",
                "3. Results arrive on the /sse stream, matched by the request id.",
                format!("4. Start with {DISCOVER_TABLES}, then {TABLE_DETAILS} for a table."),
                format!("5. Run SQL with {EXECUTE_QUERY} or {PAGINATED_QUERY}; results are kept under /query-results/{{uuid}}."),
            ],
            "aliases": "every mcp_ tool also answers to its mcp_SQL_ name",
        }))
    }
}
