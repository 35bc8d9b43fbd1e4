//! Semantic search panel over a managed search service

use crate::platform::{Platform, PlatformError, SearchRequest, SearchServiceRef};
use crate::SearchConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the search panel
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Search service failed: {0}")]
    Platform(#[from] PlatformError),

    #[error("Search response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed search response: {0}")]
    Malformed(String),
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk: String,
    pub order_id: String,
}

/// Top-k search against the configured service
pub struct SearchPanel {
    platform: Arc<dyn Platform>,
    service: SearchServiceRef,
    text_column: String,
    id_column: String,
    limit: usize,
}

impl SearchPanel {
    pub fn new(platform: Arc<dyn Platform>, config: &SearchConfig) -> Self {
        let mut columns = config.columns.iter();
        let text_column = columns.next().cloned().unwrap_or_else(|| "CHUNK".to_string());
        let id_column = columns.next().cloned().unwrap_or_else(|| "order_id".to_string());

        Self {
            platform,
            service: SearchServiceRef {
                database: config.database.clone(),
                schema: config.schema.clone(),
                service: config.service.clone(),
            },
            text_column,
            id_column,
            limit: config.limit,
        }
    }

    pub fn service(&self) -> &SearchServiceRef {
        &self.service
    }

    /// Run a search. Blank queries are rejected before any remote call;
    /// anything else is sent as typed.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let request = SearchRequest {
            query: query.to_string(),
            columns: vec![self.text_column.clone(), self.id_column.clone()],
            limit: self.limit,
        };

        info!(service = %self.service, limit = self.limit, "Searching");
        let payload = self.platform.search(&self.service, &request).await?;
        let hits = parse_hits(
            payload.into_value()?,
            &self.text_column,
            &self.id_column,
            self.limit,
        )?;

        debug!(hits = hits.len(), "Search returned");
        Ok(hits)
    }
}

/// Extract hits from a decoded response, keeping remote order, at most `limit`
pub fn parse_hits(
    response: Value,
    text_column: &str,
    id_column: &str,
    limit: usize,
) -> Result<Vec<SearchHit>, SearchError> {
    let results = match response {
        Value::Object(mut map) => map
            .remove("results")
            .ok_or_else(|| SearchError::Malformed("missing `results` field".to_string()))?,
        _ => return Err(SearchError::Malformed("response is not an object".to_string())),
    };
    let Value::Array(results) = results else {
        return Err(SearchError::Malformed("`results` is not an array".to_string()));
    };

    results
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(rank, hit)| {
            let Value::Object(hit) = hit else {
                return Err(SearchError::Malformed(format!("hit {} is not an object", rank)));
            };
            let flat = flatten(hit);
            Ok(SearchHit {
                chunk: field_text(&flat, text_column, rank)?,
                order_id: field_text(&flat, id_column, rank)?,
            })
        })
        .collect()
}

/// Flatten nested objects into dotted keys ("a": {"b": 1} -> "a.b": 1)
fn flatten(object: Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, object);
    flat
}

fn flatten_into(out: &mut Map<String, Value>, prefix: Option<&str>, object: Map<String, Value>) {
    for (key, value) in object {
        let key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key,
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&key), inner),
            other => {
                out.insert(key, other);
            }
        }
    }
}

/// Text of a requested field; a hit without the field is malformed
fn field_text(flat: &Map<String, Value>, column: &str, rank: usize) -> Result<String, SearchError> {
    let value = flat.get(column).or_else(|| {
        flat.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    });

    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) => Ok(String::new()),
        Some(other) => Ok(other.to_string()),
        None => Err(SearchError::Malformed(format!("hit {} has no {}", rank, column))),
    }
}
