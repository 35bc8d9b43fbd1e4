//! HTTP surface: the dashboard page and one JSON endpoint per panel

use crate::assistant::{Assistant, CompletionError};
use crate::cache::CacheStats;
use crate::platform::{HealthStatus, Platform, PlatformError};
use crate::reviews::{ExplorerView, ProductFilter, QueryError, ReviewStore};
use crate::search::{SearchError, SearchHit, SearchPanel};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// API state shared by all handlers
pub struct ApiState {
    pub platform: Arc<dyn Platform>,
    pub reviews: Arc<ReviewStore>,
    pub search: SearchPanel,
    pub assistant: Assistant,
}

/// Query string of the explorer endpoint
#[derive(Debug, Deserialize)]
pub struct ReviewsParams {
    /// Selected product; absent or "All Products" means no filter
    #[serde(default)]
    pub product: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub service: String,
    pub hits: Vec<SearchHit>,
    /// True when the service returned no hits
    pub empty: bool,
}

#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub model: String,
    pub omitted_rows: usize,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// Whether a cached snapshot was dropped
    pub dropped: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub platform: String,
    pub platform_health: HealthStatus,
    pub review_cache: CacheStats,
}

/// Panel-scoped failure shown inline by the page
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

type PanelError = (StatusCode, Json<ErrorBody>);

fn panel_error(status: StatusCode, kind: &'static str, error: impl ToString) -> PanelError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            kind,
        }),
    )
}

fn platform_failure(err: &PlatformError) -> (StatusCode, &'static str) {
    match err {
        PlatformError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        e if e.is_timeout() => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        PlatformError::Connection(_) => (StatusCode::SERVICE_UNAVAILABLE, "connection"),
        _ => (StatusCode::BAD_GATEWAY, "upstream"),
    }
}

fn query_failure(err: QueryError) -> PanelError {
    warn!(error = %err, "Review query failed");
    let (status, kind) = match &err {
        QueryError::Platform(e) => platform_failure(e),
        QueryError::Table(_) => (StatusCode::BAD_GATEWAY, "malformed_result"),
    };
    panel_error(status, kind, err)
}

fn search_failure(err: SearchError) -> PanelError {
    let (status, kind) = match &err {
        SearchError::EmptyQuery => (StatusCode::BAD_REQUEST, "empty_query"),
        SearchError::Platform(e) => platform_failure(e),
        SearchError::Json(_) | SearchError::Malformed(_) => {
            (StatusCode::BAD_GATEWAY, "malformed_response")
        }
    };
    if status != StatusCode::BAD_REQUEST {
        warn!(error = %err, "Search failed");
    }
    panel_error(status, kind, err)
}

fn completion_failure(err: CompletionError) -> PanelError {
    let (status, kind) = match &err {
        CompletionError::EmptyQuestion => (StatusCode::BAD_REQUEST, "empty_question"),
        CompletionError::PromptTooLarge { .. } => {
            (StatusCode::PAYLOAD_TOO_LARGE, "prompt_too_large")
        }
        CompletionError::Data(QueryError::Platform(e)) => platform_failure(e),
        CompletionError::Data(QueryError::Table(_)) => {
            (StatusCode::BAD_GATEWAY, "malformed_result")
        }
        CompletionError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        CompletionError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        CompletionError::Malformed(_) => (StatusCode::BAD_GATEWAY, "malformed_response"),
        CompletionError::Platform(e) => platform_failure(e),
    };
    if status != StatusCode::BAD_REQUEST {
        warn!(error = %err, "Completion failed");
    }
    panel_error(status, kind, err)
}

/// Create the API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/health", get(health_check))
        .route("/api/reviews", get(explore_reviews))
        .route("/api/reviews/refresh", post(refresh_reviews))
        .route("/api/search", post(run_search))
        .route("/api/ask", post(ask_question))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let platform_health = state.platform.health_check().await;
    Json(HealthResponse {
        status: if platform_health.healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: state.platform.name().to_string(),
        platform_health,
        review_cache: state.reviews.cache_stats().await,
    })
}

/// Tab 1: charts and rows for a product selection
async fn explore_reviews(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ReviewsParams>,
) -> Result<Json<ExplorerView>, PanelError> {
    let filter = ProductFilter::from_selection(params.product.as_deref());
    state.reviews.explore(&filter).await.map(Json).map_err(query_failure)
}

/// Drop the cached review snapshot
async fn refresh_reviews(State(state): State<Arc<ApiState>>) -> Json<RefreshResponse> {
    Json(RefreshResponse {
        dropped: state.reviews.refresh().await,
    })
}

/// Tab 2: semantic search
async fn run_search(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, PanelError> {
    let hits = state.search.search(&body.query).await.map_err(search_failure)?;
    Ok(Json(SearchResponse {
        service: state.search.service().to_string(),
        empty: hits.is_empty(),
        hits,
    }))
}

/// Tab 3: question answering
async fn ask_question(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>, PanelError> {
    let answer = state.assistant.ask(&body.question).await.map_err(completion_failure)?;
    Ok(Json(AskResponse {
        answer: answer.text,
        model: answer.model,
        omitted_rows: answer.omitted_rows,
    }))
}

/// Dashboard page
async fn dashboard_page() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Review Insights</title>
    <style>
        :root {
            --bg: #1a1a2e;
            --card: #16213e;
            --accent: #0f3460;
            --highlight: #e94560;
            --text: #eee;
            --muted: #888;
            --error: #f87171;
        }
        * { box-sizing: border-box; margin: 0; padding: 0; }
        body {
            font-family: 'SF Mono', 'Consolas', monospace;
            background: var(--bg);
            color: var(--text);
            min-height: 100vh;
            padding: 20px;
        }
        .container { max-width: 1200px; margin: 0 auto; }
        h1 { font-size: 1.5rem; margin-bottom: 20px; color: var(--highlight); }
        h2 { font-size: 1.1rem; margin: 20px 0 10px; color: var(--highlight); }
        .tabs { display: flex; gap: 8px; margin-bottom: 20px; }
        .tab {
            background: var(--accent);
            color: var(--text);
            border: none;
            padding: 10px 20px;
            border-radius: 8px 8px 0 0;
            cursor: pointer;
            font-family: inherit;
        }
        .tab.active { background: var(--highlight); }
        .panel { display: none; background: var(--card); padding: 20px; border-radius: 12px; }
        .panel.active { display: block; }
        label { font-size: 0.85rem; color: var(--muted); display: block; margin-bottom: 5px; }
        input, select {
            width: 100%;
            max-width: 600px;
            background: var(--bg);
            border: 1px solid var(--accent);
            border-radius: 8px;
            padding: 10px;
            color: var(--text);
            font-family: inherit;
            margin-bottom: 10px;
        }
        button.run {
            background: var(--highlight);
            color: white;
            border: none;
            padding: 10px 24px;
            border-radius: 8px;
            cursor: pointer;
            font-weight: 600;
        }
        button.run:disabled { opacity: 0.5; cursor: not-allowed; }
        button.secondary { background: var(--accent); }
        .chart svg { background: #fff; border-radius: 8px; max-width: 100%; height: auto; }
        .chart text { font-size: 12px; fill: #222; }
        .chart text.empty { fill: var(--muted); font-size: 16px; }
        .chart line.zero { stroke: #444; }
        .table-wrap { max-height: 360px; overflow: auto; border: 1px solid var(--accent); border-radius: 8px; }
        table { border-collapse: collapse; width: 100%; font-size: 0.8rem; }
        th, td { padding: 6px 10px; border-bottom: 1px solid var(--accent); text-align: left; vertical-align: top; }
        th { position: sticky; top: 0; background: var(--accent); }
        td.null { color: var(--muted); }
        .hit { padding: 12px 0; border-bottom: 1px solid var(--accent); }
        .hit .chunk { font-weight: bold; white-space: pre-wrap; }
        .hit .caption { color: var(--muted); font-size: 0.8rem; margin-top: 6px; }
        .answer { white-space: pre-wrap; margin-top: 15px; line-height: 1.5; }
        .note { color: var(--muted); font-size: 0.8rem; margin-top: 10px; }
        .error {
            background: linear-gradient(135deg, #7f1d1d, #450a0a);
            color: var(--error);
            padding: 12px;
            border-radius: 8px;
            margin: 10px 0;
        }
        .hidden { display: none; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Review Insights</h1>
        <div class="tabs">
            <button class="tab active" data-tab="explorer">Data &amp; Plots</button>
            <button class="tab" data-tab="search">RAG App</button>
            <button class="tab" data-tab="assistant">Q&amp;A Chatbot</button>
        </div>

        <section id="explorer" class="panel active">
            <h2>Customer Sentiment and Delivery Analysis</h2>
            <div id="explorerError" class="error hidden"></div>
            <h2>Average Sentiment by Product</h2>
            <div id="productChart" class="chart"></div>
            <label for="productSelect">Choose a product</label>
            <select id="productSelect"></select>
            <button class="run secondary" id="refreshBtn">Reload data</button>
            <h2 id="rowsTitle">Reviews</h2>
            <div class="table-wrap"><table id="rows"></table></div>
            <h2 id="statusTitle">Average Sentiment by Delivery Status</h2>
            <div id="statusChart" class="chart"></div>
        </section>

        <section id="search" class="panel">
            <h2>RAG App</h2>
            <label for="searchInput">Enter your query:</label>
            <input id="searchInput" type="text" autocomplete="off">
            <button class="run" id="searchBtn" disabled>Run Query</button>
            <div id="searchError" class="error hidden"></div>
            <div id="searchResults"></div>
        </section>

        <section id="assistant" class="panel">
            <h2>Ask Questions About Your Data</h2>
            <label for="questionInput">Enter your question here:</label>
            <input id="questionInput" type="text" autocomplete="off">
            <button class="run" id="askBtn" disabled>Ask</button>
            <div id="askError" class="error hidden"></div>
            <div id="answer" class="answer"></div>
            <div id="answerNote" class="note"></div>
        </section>
    </div>
    <script>
        const $ = (id) => document.getElementById(id);

        document.querySelectorAll('.tab').forEach(tab => {
            tab.addEventListener('click', () => {
                document.querySelectorAll('.tab').forEach(t => t.classList.toggle('active', t === tab));
                document.querySelectorAll('.panel').forEach(p => p.classList.toggle('active', p.id === tab.dataset.tab));
            });
        });

        function showError(id, body) {
            const el = $(id);
            if (body) {
                el.textContent = body.error || String(body);
                el.classList.remove('hidden');
            } else {
                el.textContent = '';
                el.classList.add('hidden');
            }
        }

        async function callApi(url, options) {
            const response = await fetch(url, options);
            const body = await response.json().catch(() => ({ error: `HTTP ${response.status}` }));
            if (!response.ok) {
                throw body;
            }
            return body;
        }

        function postJson(url, payload) {
            return callApi(url, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(payload)
            });
        }

        // Tab 1
        function renderRows(columns, rows) {
            const table = $('rows');
            table.replaceChildren();
            const head = table.createTHead().insertRow();
            columns.forEach(c => {
                const th = document.createElement('th');
                th.textContent = c;
                head.appendChild(th);
            });
            const body = table.createTBody();
            rows.forEach(row => {
                const tr = body.insertRow();
                row.forEach(value => {
                    const td = tr.insertCell();
                    if (value === null) {
                        td.textContent = 'None';
                        td.className = 'null';
                    } else {
                        td.textContent = value;
                    }
                });
            });
        }

        async function loadExplorer(product) {
            const query = product ? `?product=${encodeURIComponent(product)}` : '';
            try {
                const view = await callApi(`/api/reviews${query}`);
                showError('explorerError', null);

                const select = $('productSelect');
                select.replaceChildren(...view.products.map(p => new Option(p, p, false, p === view.selected)));

                $('productChart').innerHTML = view.product_chart_svg;
                $('statusChart').innerHTML = view.status_chart_svg;
                $('rowsTitle').textContent = `Reviews for ${view.selected}`;
                $('statusTitle').textContent = view.status_chart.title;
                renderRows(view.columns, view.rows);
            } catch (err) {
                showError('explorerError', err);
            }
        }

        $('productSelect').addEventListener('change', (e) => loadExplorer(e.target.value));
        $('refreshBtn').addEventListener('click', async () => {
            try {
                await postJson('/api/reviews/refresh', {});
            } catch (err) {
                showError('explorerError', err);
            }
            loadExplorer($('productSelect').value);
        });

        // Tab 2
        $('searchInput').addEventListener('input', (e) => {
            $('searchBtn').disabled = e.target.value.trim() === '';
        });

        $('searchBtn').addEventListener('click', async () => {
            const btn = $('searchBtn');
            const results = $('searchResults');
            btn.disabled = true;
            btn.textContent = 'Searching...';
            try {
                const data = await postJson('/api/search', { query: $('searchInput').value });
                showError('searchError', null);
                results.replaceChildren();
                if (data.empty) {
                    const empty = document.createElement('p');
                    empty.className = 'note';
                    empty.textContent = 'No results found.';
                    results.appendChild(empty);
                }
                data.hits.forEach(hit => {
                    const div = document.createElement('div');
                    div.className = 'hit';
                    const chunk = document.createElement('div');
                    chunk.className = 'chunk';
                    chunk.textContent = hit.chunk;
                    const caption = document.createElement('div');
                    caption.className = 'caption';
                    caption.textContent = hit.order_id;
                    div.append(chunk, caption);
                    results.appendChild(div);
                });
            } catch (err) {
                showError('searchError', err);
            } finally {
                btn.textContent = 'Run Query';
                btn.disabled = $('searchInput').value.trim() === '';
            }
        });

        // Tab 3
        $('questionInput').addEventListener('input', (e) => {
            $('askBtn').disabled = e.target.value.trim() === '';
        });

        $('askBtn').addEventListener('click', async () => {
            const btn = $('askBtn');
            btn.disabled = true;
            btn.textContent = 'Thinking...';
            $('answer').textContent = '';
            $('answerNote').textContent = '';
            try {
                const data = await postJson('/api/ask', { question: $('questionInput').value });
                showError('askError', null);
                $('answer').textContent = data.answer;
                if (data.omitted_rows > 0) {
                    $('answerNote').textContent = `${data.omitted_rows} review rows were left out to fit the model's prompt limit.`;
                }
            } catch (err) {
                showError('askError', err);
            } finally {
                btn.textContent = 'Ask';
                btn.disabled = $('questionInput').value.trim() === '';
            }
        });

        loadExplorer(null);
    </script>
</body>
</html>
"##;
