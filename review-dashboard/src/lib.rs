//! Review Insights Dashboard
//!
//! A three-tab web dashboard over a managed data platform:
//! - Sentiment explorer: grouped sentiment averages and a product filter
//! - Semantic search: top-k retrieval against a managed search service
//! - Q&A assistant: questions answered by a hosted completion model
//!
//! All SQL execution, search and inference happen on the platform; this crate
//! issues the requests, reshapes the results and serves the page.

pub mod api;
pub mod assistant;
pub mod cache;
pub mod chart;
pub mod platform;
pub mod reviews;
pub mod search;
pub mod table;

pub use assistant::{Answer, Assistant, CompletionError};
pub use platform::{Platform, PlatformError, SnowflakeSession};
pub use reviews::{QueryError, ReviewStore};
pub use search::{SearchError, SearchHit, SearchPanel};

use serde::Deserialize;

/// Configuration for the dashboard server
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Platform connection settings
    pub platform: PlatformConfig,

    /// Sentiment explorer settings
    #[serde(default)]
    pub reviews: ReviewsConfig,

    /// Semantic search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Q&A assistant settings
    #[serde(default)]
    pub assistant: AssistantConfig,
}

fn default_bind_addr() -> String { "0.0.0.0:8080".to_string() }

/// Connection settings for the data platform
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Account URL, e.g. "https://myorg-myaccount.snowflakecomputing.com"
    pub account_url: String,

    /// Bearer token (falls back to SNOWFLAKE_TOKEN)
    pub token: Option<String>,

    /// Token type header: "PROGRAMMATIC_ACCESS_TOKEN", "OAUTH" or "KEYPAIR_JWT"
    #[serde(default = "default_token_type")]
    pub token_type: String,

    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,

    /// Server-side statement timeout, also bounds async statement polling
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,

    /// HTTP request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_token_type() -> String { "PROGRAMMATIC_ACCESS_TOKEN".to_string() }
fn default_statement_timeout() -> u64 { 120 }
fn default_request_timeout() -> u64 { 300 }

/// Sentiment explorer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewsConfig {
    /// Table holding the scored reviews
    #[serde(default = "default_table")]
    pub table: String,

    /// How long a loaded dataset stays fresh (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached query results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_table() -> String { "REVIEWS_WITH_SENTIMENT".to_string() }
fn default_cache_ttl() -> u64 { 3600 }
fn default_cache_capacity() -> usize { 16 }

impl Default for ReviewsConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Semantic search configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_database")]
    pub database: String,

    #[serde(default = "default_search_schema")]
    pub schema: String,

    #[serde(default = "default_search_service")]
    pub service: String,

    /// Columns requested from the search service (text column first, id second)
    #[serde(default = "default_search_columns")]
    pub columns: Vec<String>,

    /// Top-k cap
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_database() -> String { "AVALANCHE_DB".to_string() }
fn default_search_schema() -> String { "AVALANCHE_SCHEMA".to_string() }
fn default_search_service() -> String { "AVALANCHE_SEARCH_SERVICE".to_string() }
fn default_search_columns() -> Vec<String> { vec!["CHUNK".to_string(), "order_id".to_string()] }
fn default_search_limit() -> usize { 3 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            database: default_search_database(),
            schema: default_search_schema(),
            service: default_search_service(),
            columns: default_search_columns(),
            limit: default_search_limit(),
        }
    }
}

/// Q&A assistant configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    /// Completion model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Upper bound on the assembled prompt, in characters
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

fn default_model() -> String { "claude-3-5-sonnet".to_string() }
fn default_max_prompt_chars() -> usize { 400_000 }

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: DashboardConfig = toml::from_str(
            r#"
            [platform]
            account_url = "https://acme.snowflakecomputing.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.platform.token_type, "PROGRAMMATIC_ACCESS_TOKEN");
        assert_eq!(config.reviews.table, "REVIEWS_WITH_SENTIMENT");
        assert_eq!(config.search.service, "AVALANCHE_SEARCH_SERVICE");
        assert_eq!(config.search.columns, vec!["CHUNK", "order_id"]);
        assert_eq!(config.search.limit, 3);
        assert_eq!(config.assistant.model, "claude-3-5-sonnet");
    }

    #[test]
    fn test_config_overrides() {
        let config: DashboardConfig = toml::from_str(
            r#"
            bind_addr = "127.0.0.1:9000"

            [platform]
            account_url = "https://acme.snowflakecomputing.com"
            warehouse = "COMPUTE_WH"
            token_type = "OAUTH"

            [reviews]
            cache_ttl_secs = 60

            [assistant]
            max_prompt_chars = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.platform.warehouse.as_deref(), Some("COMPUTE_WH"));
        assert_eq!(config.platform.token_type, "OAUTH");
        assert_eq!(config.reviews.cache_ttl_secs, 60);
        assert_eq!(config.reviews.cache_capacity, 16);
        assert_eq!(config.assistant.max_prompt_chars, 1000);
        assert_eq!(config.assistant.model, "claude-3-5-sonnet");
    }
}
