//! Prompt templates for query authoring

use std::sync::Arc;

use serde_json::{json, Value};

use crate::errors::HandlerError;
use crate::mcp::registry::{FnHandler, Registry};

pub const GENERATE_QUERY: &str = "generate-query";
pub const EXPLAIN_QUERY: &str = "explain-query";

pub fn register(registry: &Registry) {
    registry.register(
        GENERATE_QUERY,
        json!({ "description": "string" }),
        Arc::new(FnHandler::new(|args: Value| async move { generate_query(&args) })),
    );
    registry.register(
        EXPLAIN_QUERY,
        json!({ "sql": "string" }),
        Arc::new(FnHandler::new(|args: Value| async move { explain_query(&args) })),
    );
}

fn required_text<'a>(args: &'a Value, key: &str) -> Result<&'a str, HandlerError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| HandlerError::invalid_arguments(format!("{key} is required")))
}

fn prompt(description: &str, text: String) -> Value {
    json!({
        "description": description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    })
}

fn generate_query(args: &Value) -> Result<Value, HandlerError> {
    let description = required_text(args, "description")?;
    Ok(prompt(
        "Write a SQL query from a description",
        format!(
            "Write a single SQLite query for the following request. \
             Use mcp_discover_tables and mcp_table_details to check table and column names first.\n\n\
             Request: {description}"
        ),
    ))
}

fn explain_query(args: &Value) -> Result<Value, HandlerError> {
    let sql = required_text(args, "sql")?;
    Ok(prompt(
        "Explain what a SQL query does",
        format!(
            "Explain step by step what the following SQLite query does, \
             which tables it reads and what its result looks like.\n\n```sql\n{sql}\n```"
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_query_embeds_description() {
        let result = generate_query(&json!({"description": "top customers"})).expect("prompt");
        assert_eq!(result["messages"][0]["role"], json!("user"));
        let text = result["messages"][0]["content"]["text"].as_str().expect("text");
        assert!(text.ends_with("Request: top customers"));
    }

    #[test]
    fn explain_query_requires_sql() {
        let err = explain_query(&json!({})).expect_err("missing sql");
        assert_eq!(err.to_string(), "sql is required");

        let result = explain_query(&json!({"sql": "SELECT 1"})).expect("prompt");
        assert!(result["messages"][0]["content"]["text"]
            .as_str()
            .expect("text")
            .contains("SELECT 1"));
    }
}
