//! Data platform abstraction and the Snowflake implementation

mod snowflake;

#[cfg(test)]
pub(crate) mod fake;

pub use snowflake::SnowflakeSession;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to the data platform
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Platform returned error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited by the platform")]
    RateLimited,

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl PlatformError {
    /// True for both our own deadline and a transport-level timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            PlatformError::Timeout => true,
            PlatformError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// A SQL statement with positional text bindings (`?` placeholders)
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub statement: String,
    pub bindings: Vec<String>,
}

impl QueryRequest {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<String>) -> Self {
        self.bindings.push(value.into());
        self
    }
}

/// Tabular result of a statement: column names plus rows of nullable text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// Position of a column; exact match first, then case-insensitive
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// First column of the first row, if present and not null
    pub fn first_value(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

/// Fully qualified name of a managed search service
#[derive(Debug, Clone, PartialEq)]
pub struct SearchServiceRef {
    pub database: String,
    pub schema: String,
    pub service: String,
}

impl std::fmt::Display for SearchServiceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.service)
    }
}

/// Body of a search service query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub columns: Vec<String>,
    pub limit: usize,
}

/// Search service response, either already decoded or still a text payload
#[derive(Debug, Clone)]
pub enum SearchPayload {
    Json(Value),
    Text(String),
}

impl SearchPayload {
    pub fn into_value(self) -> Result<Value, serde_json::Error> {
        match self {
            SearchPayload::Json(value) => Ok(value),
            SearchPayload::Text(text) => serde_json::from_str(&text),
        }
    }
}

/// Health status of the platform session
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Remote capabilities the dashboard panels depend on
#[async_trait]
pub trait Platform: Send + Sync {
    /// Platform name for logging/identification
    fn name(&self) -> &str;

    /// Execute a SQL statement and return its full result set
    async fn run_query(&self, request: &QueryRequest) -> Result<QueryResult, PlatformError>;

    /// Query a managed search service
    async fn search(
        &self,
        service: &SearchServiceRef,
        request: &SearchRequest,
    ) -> Result<SearchPayload, PlatformError>;

    /// Run a hosted completion through the SQL-embedded COMPLETE function
    async fn run_completion(&self, model: &str, prompt: &str) -> Result<String, PlatformError> {
        let request = QueryRequest::new("SELECT SNOWFLAKE.CORTEX.COMPLETE(?, ?)")
            .bind(model)
            .bind(prompt);
        let result = self.run_query(&request).await?;

        result.first_value().map(str::to_string).ok_or_else(|| {
            PlatformError::MalformedResponse("completion returned no value".to_string())
        })
    }

    /// Check that the session is still usable
    async fn health_check(&self) -> HealthStatus;
}
