//! Scripted in-process platform for tests

use super::{
    HealthStatus, Platform, PlatformError, QueryRequest, QueryResult, SearchPayload,
    SearchRequest, SearchServiceRef,
};
use async_trait::async_trait;
use std::sync::Mutex;

type QueryFn = Box<dyn Fn(&QueryRequest) -> Result<QueryResult, PlatformError> + Send + Sync>;
type SearchFn = Box<dyn Fn(&SearchRequest) -> Result<SearchPayload, PlatformError> + Send + Sync>;
type CompletionFn = Box<dyn Fn(&str, &str) -> Result<String, PlatformError> + Send + Sync>;

/// Platform double that answers from closures and records every call
pub(crate) struct FakePlatform {
    query: Option<QueryFn>,
    search: Option<SearchFn>,
    completion: Option<CompletionFn>,
    queries: Mutex<Vec<QueryRequest>>,
    searches: Mutex<Vec<(SearchServiceRef, SearchRequest)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            query: None,
            search: None,
            completion: None,
            queries: Mutex::new(Vec::new()),
            searches: Mutex::new(Vec::new()),
        }
    }

    /// Answer every statement with a clone of `result`
    pub fn with_table(self, result: QueryResult) -> Self {
        self.with_query(move |_| Ok(result.clone()))
    }

    pub fn with_query<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueryRequest) -> Result<QueryResult, PlatformError> + Send + Sync + 'static,
    {
        self.query = Some(Box::new(f));
        self
    }

    pub fn with_search<F>(mut self, f: F) -> Self
    where
        F: Fn(&SearchRequest) -> Result<SearchPayload, PlatformError> + Send + Sync + 'static,
    {
        self.search = Some(Box::new(f));
        self
    }

    /// Intercept COMPLETE statements; receives (model, prompt)
    pub fn with_completion<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, PlatformError> + Send + Sync + 'static,
    {
        self.completion = Some(Box::new(f));
        self
    }

    pub fn queries(&self) -> Vec<QueryRequest> {
        self.queries.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<(SearchServiceRef, SearchRequest)> {
        self.searches.lock().unwrap().clone()
    }

    /// Number of statements that were not completions
    pub fn table_queries(&self) -> usize {
        self.queries()
            .iter()
            .filter(|q| !q.statement.contains("CORTEX.COMPLETE"))
            .count()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run_query(&self, request: &QueryRequest) -> Result<QueryResult, PlatformError> {
        self.queries.lock().unwrap().push(request.clone());

        if request.statement.contains("CORTEX.COMPLETE")
            && let Some(completion) = &self.completion
        {
            let text = completion(&request.bindings[0], &request.bindings[1])?;
            return Ok(QueryResult {
                columns: vec!["COMPLETION".to_string()],
                rows: vec![vec![Some(text)]],
            });
        }

        match &self.query {
            Some(f) => f(request),
            None => Ok(QueryResult::default()),
        }
    }

    async fn search(
        &self,
        service: &SearchServiceRef,
        request: &SearchRequest,
    ) -> Result<SearchPayload, PlatformError> {
        self.searches
            .lock()
            .unwrap()
            .push((service.clone(), request.clone()));

        match &self.search {
            Some(f) => f(request),
            None => Ok(SearchPayload::Text(r#"{"results": []}"#.to_string())),
        }
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            latency_ms: Some(0),
            error: None,
        }
    }
}
