//! In-memory store of executed query results
//!
//! Records are kept until the process exits. A second `put` under an existing
//! uuid replaces the earlier record.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::database::Row;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultMetadata {
    pub uuid: String,
    pub timestamp: String,
    pub query: String,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResultRecord {
    pub metadata: QueryResultMetadata,
    pub data: Vec<Row>,
}

#[derive(Default)]
pub struct QueryResultStore {
    records: DashMap<String, QueryResultRecord>,
}

impl QueryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, uuid: impl Into<String>, metadata: QueryResultMetadata, data: Vec<Row>) {
        self.records
            .insert(uuid.into(), QueryResultRecord { metadata, data });
    }

    pub fn get(&self, uuid: &str) -> Option<QueryResultRecord> {
        self.records.get(uuid).map(|record| record.value().clone())
    }

    /// All records, oldest first.
    pub fn list(&self) -> Vec<QueryResultRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .map(|record| record.value().clone())
            .collect();
        records.sort_by(|left, right| {
            left.metadata
                .timestamp
                .cmp(&right.metadata.timestamp)
                .then_with(|| left.metadata.uuid.cmp(&right.metadata.uuid))
        });
        records
    }
}

/// Rows as a JSON array, for embedding in tool results.
pub fn rows_to_value(rows: &[Row]) -> Value {
    Value::Array(rows.iter().cloned().map(Value::Object).collect())
}
