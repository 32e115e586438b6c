//! Database access consumed by the query tools
//!
//! The rest of the crate only sees the [`Database`] trait; [`SqliteDatabase`]
//! is the shipped implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{types::ValueRef, Connection};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database connection is unavailable")]
    Poisoned,
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Runs a single statement and returns at most `max_rows` rows.
    async fn query(&self, sql: &str, max_rows: usize) -> Result<Vec<Row>, DatabaseError>;
}

#[derive(Clone)]
pub struct SqliteDatabase {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    pub fn open(path: &str) -> Result<Self, DatabaseError> {
        let connection = Connection::open(path)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let connection = Connection::open_in_memory()?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs a batch of statements, discarding any rows.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        let connection = Arc::clone(&self.connection);
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || {
            let connection = connection.lock().map_err(|_| DatabaseError::Poisoned)?;
            connection.execute_batch(&sql)?;
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn query(&self, sql: &str, max_rows: usize) -> Result<Vec<Row>, DatabaseError> {
        let connection = Arc::clone(&self.connection);
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || {
            let connection = connection.lock().map_err(|_| DatabaseError::Poisoned)?;
            run_query(&connection, &sql, max_rows)
        })
        .await?
    }
}

fn run_query(connection: &Connection, sql: &str, max_rows: usize) -> Result<Vec<Row>, DatabaseError> {
    let mut statement = connection.prepare(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = statement.query([])?;
    let mut records = Vec::new();
    // Stepping at least once executes statements that return no rows.
    while let Some(row) = rows.next()? {
        if records.len() >= max_rows {
            break;
        }

        let mut record = Row::new();
        for (index, column) in columns.iter().enumerate() {
            record.insert(column.clone(), sql_value_to_json(row.get_ref(index)?));
        }
        records.push(record);
    }

    Ok(records)
}

fn sql_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::Number(number.into()),
        ValueRef::Real(number) => Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::String(bytes.iter().map(|byte| format!("{byte:02x}")).collect()),
    }
}
