//! Capability registries for tools, resources and prompts
//!
//! A registry maps a name to an immutable [`CapabilityEntry`]. Lookups that
//! miss retry once under the alternate naming convention, so clients that use
//! `mcp_SQL_` prefixed names reach the same handlers as those that use `mcp_`.

use std::{fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::{database::Database, domain::query_results::QueryResultStore, errors::HandlerError};

const SHORT_PREFIX: &str = "mcp_";
const LONG_PREFIX: &str = "mcp_SQL_";

/// Collaborators handed to every handler invocation.
#[derive(Clone)]
pub struct HandlerContext {
    pub database: Arc<dyn Database>,
    pub query_results: Arc<QueryResultStore>,
    pub max_rows: usize,
}

#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn call(&self, ctx: &HandlerContext, args: Value) -> Result<Value, HandlerError>;
}

/// Adapts an async closure that needs no context into a handler.
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn call(&self, _ctx: &HandlerContext, args: Value) -> Result<Value, HandlerError> {
        (self.func)(args).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tool => "Tool",
            Self::Resource => "Resource",
            Self::Prompt => "Prompt",
        })
    }
}

#[derive(Clone, Serialize)]
pub struct CapabilityEntry {
    pub name: String,
    pub schema: Value,
    #[serde(skip)]
    pub handler: Arc<dyn CapabilityHandler>,
    pub source: Source,
}

impl fmt::Debug for CapabilityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityEntry")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

pub struct Registry {
    kind: CapabilityKind,
    entries: DashMap<String, Arc<CapabilityEntry>>,
}

impl Registry {
    pub fn new(kind: CapabilityKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// Registers an internal capability, replacing any entry of the same name.
    pub fn register(
        &self,
        name: impl Into<String>,
        schema: Value,
        handler: Arc<dyn CapabilityHandler>,
    ) {
        self.register_with_source(name, schema, handler, Source::Internal);
    }

    pub fn register_with_source(
        &self,
        name: impl Into<String>,
        schema: Value,
        handler: Arc<dyn CapabilityHandler>,
        source: Source,
    ) {
        let name = name.into();
        let entry = Arc::new(CapabilityEntry {
            name: name.clone(),
            schema,
            handler,
            source,
        });
        self.entries.insert(name, entry);
    }

    pub fn get(&self, name: &str) -> Option<Arc<CapabilityEntry>> {
        if let Some(entry) = self.entries.get(name) {
            return Some(Arc::clone(entry.value()));
        }

        let alias = alias_name(name)?;
        self.entries.get(&alias).map(|entry| Arc::clone(entry.value()))
    }

    /// All entries, sorted by name.
    pub fn list(&self) -> Vec<Arc<CapabilityEntry>> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        entries.sort_by(|left, right| left.name.cmp(&right.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The single alternate spelling tried on a lookup miss.
pub fn alias_name(name: &str) -> Option<String> {
    if let Some(rest) = name.strip_prefix(LONG_PREFIX) {
        return Some(format!("{SHORT_PREFIX}{rest}"));
    }

    name.strip_prefix(SHORT_PREFIX)
        .map(|rest| format!("{LONG_PREFIX}{rest}"))
}

/// The three registries, constructed once at startup and shared by handle.
pub struct Capabilities {
    pub tools: Registry,
    pub resources: Registry,
    pub prompts: Registry,
}

impl Capabilities {
    pub fn new() -> Self {
        Self {
            tools: Registry::new(CapabilityKind::Tool),
            resources: Registry::new(CapabilityKind::Resource),
            prompts: Registry::new(CapabilityKind::Prompt),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new()
    }
}
