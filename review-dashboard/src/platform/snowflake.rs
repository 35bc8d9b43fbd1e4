//! Snowflake platform session
//!
//! Statements go through the SQL API v2 (`/api/v2/statements`), search goes
//! through the Cortex Search REST endpoint. Both authenticate with a bearer
//! token whose kind is announced in `X-Snowflake-Authorization-Token-Type`.

use super::{
    HealthStatus, Platform, PlatformError, QueryRequest, QueryResult, SearchPayload,
    SearchRequest, SearchServiceRef,
};
use crate::PlatformConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Code returned with HTTP 202 while a statement is still running
const STATEMENT_IN_PROGRESS: &str = "333334";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Authenticated session against one Snowflake account
pub struct SnowflakeSession {
    client: Client,
    base_url: String,
    token: String,
    token_type: String,
    warehouse: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    role: Option<String>,
    statement_timeout: Duration,
}

impl SnowflakeSession {
    /// Build a session without contacting the platform
    pub fn new(config: &PlatformConfig, token: impl Into<String>) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("review-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.account_url.trim_end_matches('/').to_string(),
            token: token.into(),
            token_type: config.token_type.clone(),
            warehouse: config.warehouse.clone(),
            database: config.database.clone(),
            schema: config.schema.clone(),
            role: config.role.clone(),
            statement_timeout: Duration::from_secs(config.statement_timeout_secs),
        })
    }

    /// Build a session and prove it works with a probe statement
    pub async fn connect(
        config: &PlatformConfig,
        token: impl Into<String>,
    ) -> Result<Self, PlatformError> {
        let session = Self::new(config, token)?;
        let probe = session
            .run_query(&QueryRequest::new("SELECT CURRENT_VERSION()"))
            .await
            .map_err(|e| PlatformError::Connection(e.to_string()))?;

        info!(
            account = %session.base_url,
            version = probe.first_value().unwrap_or("unknown"),
            "Connected to Snowflake"
        );
        Ok(session)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.token_type)
            .header("Accept", "application/json")
    }

    fn statement_body<'a>(&'a self, request: &'a QueryRequest) -> StatementRequest<'a> {
        let bindings = request
            .bindings
            .iter()
            .enumerate()
            .map(|(i, value)| {
                (
                    (i + 1).to_string(),
                    Binding {
                        kind: "TEXT",
                        value: value.as_str(),
                    },
                )
            })
            .collect();

        StatementRequest {
            statement: &request.statement,
            timeout: self.statement_timeout.as_secs(),
            warehouse: self.warehouse.as_deref(),
            database: self.database.as_deref(),
            schema: self.schema.as_deref(),
            role: self.role.as_deref(),
            bindings,
        }
    }

    /// Wait for an asynchronous statement to finish
    async fn poll(
        &self,
        handle: &str,
        status_url: Option<&str>,
    ) -> Result<StatementResponse, PlatformError> {
        let url = match status_url {
            Some(path) => format!("{}{}", self.base_url, path),
            None => format!("{}/api/v2/statements/{}", self.base_url, handle),
        };
        let deadline = Instant::now() + self.statement_timeout;

        loop {
            if Instant::now() >= deadline {
                return Err(PlatformError::Timeout);
            }
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = self.authorized(self.client.get(&url)).send().await?;
            let response = check_status(response).await?;
            let accepted = response.status() == StatusCode::ACCEPTED;
            let body: StatementResponse = response.json().await?;

            if !accepted && body.code.as_deref() != Some(STATEMENT_IN_PROGRESS) {
                return Ok(body);
            }
            debug!(handle, "Statement still running");
        }
    }

    async fn fetch_partition(
        &self,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Option<String>>>, PlatformError> {
        let url = format!("{}/api/v2/statements/{}", self.base_url, handle);
        let response = self
            .authorized(self.client.get(&url))
            .query(&[("partition", partition)])
            .send()
            .await?;
        let body: PartitionResponse = check_status(response).await?.json().await?;
        Ok(body.data)
    }
}

#[async_trait]
impl Platform for SnowflakeSession {
    fn name(&self) -> &str {
        "snowflake"
    }

    async fn run_query(&self, request: &QueryRequest) -> Result<QueryResult, PlatformError> {
        let url = format!("{}/api/v2/statements", self.base_url);
        let body = self.statement_body(request);
        let start = Instant::now();

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let accepted = response.status() == StatusCode::ACCEPTED;
        let mut statement: StatementResponse = response.json().await?;

        if accepted || statement.code.as_deref() == Some(STATEMENT_IN_PROGRESS) {
            let handle = statement.statement_handle.clone().ok_or_else(|| {
                PlatformError::MalformedResponse("async statement without handle".to_string())
            })?;
            statement = self
                .poll(&handle, statement.statement_status_url.as_deref())
                .await?;
        }

        let partitions = statement.partition_count();
        let handle = statement.statement_handle.clone();
        let mut result = statement.into_result()?;

        if partitions > 1 {
            let handle = handle.ok_or_else(|| {
                PlatformError::MalformedResponse("partitioned result without handle".to_string())
            })?;
            for partition in 1..partitions {
                let rows = self.fetch_partition(&handle, partition).await?;
                result.rows.extend(rows);
            }
        }

        debug!(
            rows = result.rows.len(),
            columns = result.columns.len(),
            partitions,
            duration_ms = start.elapsed().as_millis() as u64,
            "Statement finished"
        );
        Ok(result)
    }

    async fn search(
        &self,
        service: &SearchServiceRef,
        request: &SearchRequest,
    ) -> Result<SearchPayload, PlatformError> {
        let url = format!(
            "{}/api/v2/databases/{}/schemas/{}/cortex-search-services/{}:query",
            self.base_url, service.database, service.schema, service.service
        );

        let response = self
            .authorized(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        let text = check_status(response).await?.text().await?;

        debug!(service = %service, bytes = text.len(), "Search finished");
        Ok(SearchPayload::Text(text))
    }

    async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        match self.run_query(&QueryRequest::new("SELECT 1")).await {
            Ok(_) => HealthStatus {
                healthy: true,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => HealthStatus {
                healthy: false,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Map non-success HTTP statuses onto platform errors
async fn check_status(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PlatformError::Timeout,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::Connection(format!("HTTP {}: {}", status, body))
        }
        _ => api_error(status, &body),
    })
}

fn api_error(status: StatusCode, body: &str) -> PlatformError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            code: Some(code),
            message,
        }) => PlatformError::Api {
            code,
            message: message.unwrap_or_default(),
        },
        _ => PlatformError::Api {
            code: status.as_u16().to_string(),
            message: body.to_string(),
        },
    }
}

/// SQL API statement submission
#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, Binding<'a>>,
}

#[derive(Serialize)]
struct Binding<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

/// SQL API statement response (first partition inline)
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    statement_handle: Option<String>,
    statement_status_url: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<IgnoredAny>,
}

#[derive(Deserialize)]
struct RowType {
    name: String,
}

#[derive(Deserialize)]
struct PartitionResponse {
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl StatementResponse {
    fn partition_count(&self) -> usize {
        self.result_set_meta_data
            .as_ref()
            .map(|m| m.partition_info.len())
            .unwrap_or(0)
    }

    fn into_result(self) -> Result<QueryResult, PlatformError> {
        let meta = self.result_set_meta_data.ok_or_else(|| {
            PlatformError::MalformedResponse(
                "statement response has no result metadata".to_string(),
            )
        })?;
        let columns: Vec<String> = meta.row_type.into_iter().map(|r| r.name).collect();

        if let Some(row) = self.data.iter().find(|row| row.len() != columns.len()) {
            return Err(PlatformError::MalformedResponse(format!(
                "row has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }

        Ok(QueryResult {
            columns,
            rows: self.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> PlatformConfig {
        toml::from_str(
            r#"
            account_url = "https://acme.snowflakecomputing.com/"
            warehouse = "WH"
            role = "ANALYST"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_statement_body_numbers_bindings_from_one() {
        let session = SnowflakeSession::new(&config(), "tok").unwrap();
        let request = QueryRequest::new("SELECT ?, ?").bind("a").bind("b");
        let body = serde_json::to_value(session.statement_body(&request)).unwrap();

        assert_eq!(
            body,
            json!({
                "statement": "SELECT ?, ?",
                "timeout": 120,
                "warehouse": "WH",
                "role": "ANALYST",
                "bindings": {
                    "1": {"type": "TEXT", "value": "a"},
                    "2": {"type": "TEXT", "value": "b"}
                }
            })
        );
    }

    #[test]
    fn test_statement_body_omits_empty_bindings() {
        let session = SnowflakeSession::new(&config(), "tok").unwrap();
        let request = QueryRequest::new("SELECT 1");
        let body = serde_json::to_value(session.statement_body(&request)).unwrap();
        assert!(body.get("bindings").is_none());
        assert!(body.get("database").is_none());
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let session = SnowflakeSession::new(&config(), "tok").unwrap();
        assert_eq!(session.base_url, "https://acme.snowflakecomputing.com");
    }

    #[test]
    fn test_decode_statement_response() {
        let statement: StatementResponse = serde_json::from_value(json!({
            "resultSetMetaData": {
                "numRows": 2,
                "format": "jsonv2",
                "partitionInfo": [{"rowCount": 2, "uncompressedSize": 120}],
                "rowType": [
                    {"name": "PRODUCT", "type": "text", "nullable": true},
                    {"name": "SENTIMENT_SCORE", "type": "real", "nullable": true}
                ]
            },
            "data": [["Skis", "0.42"], ["Boots", null]],
            "code": "090001",
            "statementHandle": "01b2-handle",
            "message": "Statement executed successfully."
        }))
        .unwrap();

        assert_eq!(statement.partition_count(), 1);
        let result = statement.into_result().unwrap();
        assert_eq!(result.columns, vec!["PRODUCT", "SENTIMENT_SCORE"]);
        assert_eq!(result.rows[1], vec![Some("Boots".to_string()), None]);
    }

    #[test]
    fn test_decode_rejects_ragged_rows() {
        let statement: StatementResponse = serde_json::from_value(json!({
            "resultSetMetaData": {"rowType": [{"name": "A"}, {"name": "B"}]},
            "data": [["only one"]]
        }))
        .unwrap();
        assert!(matches!(
            statement.into_result(),
            Err(PlatformError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_decode_requires_metadata() {
        let statement: StatementResponse = serde_json::from_value(json!({
            "code": STATEMENT_IN_PROGRESS,
            "statementHandle": "h",
            "statementStatusUrl": "/api/v2/statements/h"
        }))
        .unwrap();
        assert_eq!(statement.partition_count(), 0);
        assert!(statement.into_result().is_err());
    }

    #[test]
    fn test_api_error_parsing() {
        let err = api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code": "002003", "message": "Object does not exist"}"#,
        );
        match err {
            PlatformError::Api { code, message } => {
                assert_eq!(code, "002003");
                assert_eq!(message, "Object does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = api_error(StatusCode::BAD_GATEWAY, "upstream down");
        match err {
            PlatformError::Api { code, message } => {
                assert_eq!(code, "502");
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
