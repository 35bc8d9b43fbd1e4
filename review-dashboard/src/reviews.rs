//! Sentiment explorer: dataset loading, grouping and product filtering

use crate::cache::{CacheConfig, CacheStats, QueryCache};
use crate::chart::BarChart;
use crate::platform::{Platform, PlatformError, QueryRequest};
use crate::table::{ReviewRecord, ReviewTable, TableError};
use crate::ReviewsConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Selector sentinel meaning "no product filter"
pub const ALL_PRODUCTS: &str = "All Products";

/// Errors loading or reading the review dataset
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query failed: {0}")]
    Platform(#[from] PlatformError),

    #[error("Unexpected result shape: {0}")]
    Table(#[from] TableError),
}

/// Column to group scores by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Product,
    Status,
}

impl GroupKey {
    fn value(self, record: &ReviewRecord) -> Option<&str> {
        match self {
            GroupKey::Product => record.product.as_deref(),
            GroupKey::Status => record.status.as_deref(),
        }
    }
}

/// Mean score of one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateEntry {
    pub category: String,
    pub mean_score: f64,
    /// Number of scored rows that contributed
    pub count: usize,
}

/// Per-category means, ascending by score
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateView {
    pub entries: Vec<AggregateEntry>,
}

impl AggregateView {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Group by `key` and average the sentiment score of each group.
///
/// Rows with a null key or null score do not contribute, so a category with
/// no scored rows is absent rather than zero. Equal means keep the order in
/// which their categories first appear.
pub fn aggregate_by(records: &[ReviewRecord], key: GroupKey) -> AggregateView {
    let mut groups: Vec<(String, f64, usize)> = Vec::new();

    for record in records {
        let (Some(category), Some(score)) = (key.value(record), record.sentiment_score) else {
            continue;
        };
        match groups.iter_mut().find(|(c, _, _)| c == category) {
            Some((_, sum, count)) => {
                *sum += score;
                *count += 1;
            }
            None => groups.push((category.to_string(), score, 1)),
        }
    }

    let mut entries: Vec<AggregateEntry> = groups
        .into_iter()
        .map(|(category, sum, count)| AggregateEntry {
            category,
            mean_score: sum / count as f64,
            count,
        })
        .collect();
    entries.sort_by(|a, b| a.mean_score.total_cmp(&b.mean_score));

    AggregateView { entries }
}

/// Product selection from the explorer's selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductFilter {
    All,
    Product(String),
}

impl ProductFilter {
    /// Parse a selector value; the sentinel and a missing value mean `All`
    pub fn from_selection(selection: Option<&str>) -> Self {
        match selection {
            None | Some(ALL_PRODUCTS) => ProductFilter::All,
            Some(product) => ProductFilter::Product(product.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ProductFilter::All => ALL_PRODUCTS,
            ProductFilter::Product(p) => p,
        }
    }
}

/// Rows matching the selection, in their original order
pub fn filter_by_product<'a>(
    records: &'a [ReviewRecord],
    filter: &ProductFilter,
) -> Vec<&'a ReviewRecord> {
    match filter {
        ProductFilter::All => records.iter().collect(),
        ProductFilter::Product(product) => records
            .iter()
            .filter(|r| r.product.as_deref() == Some(product.as_str()))
            .collect(),
    }
}

/// Selector choices: the sentinel, then distinct products in first-seen order
pub fn product_options(records: &[ReviewRecord]) -> Vec<String> {
    let mut options = vec![ALL_PRODUCTS.to_string()];
    for product in records.iter().filter_map(|r| r.product.as_deref()) {
        if !options[1..].iter().any(|p| p == product) {
            options.push(product.to_string());
        }
    }
    options
}

/// Everything the explorer tab shows for one selection
#[derive(Debug, Clone, Serialize)]
pub struct ExplorerView {
    pub selected: String,
    pub products: Vec<String>,
    pub product_chart: BarChart,
    pub product_chart_svg: String,
    pub status_chart: BarChart,
    pub status_chart_svg: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ExplorerView {
    pub fn build(table: &ReviewTable, filter: &ProductFilter) -> Self {
        let product_chart =
            BarChart::new("Average Sentiment by Product", "Sentiment Score", "Product")
                .with_color("skyblue")
                .with_aggregate(&aggregate_by(&table.records, GroupKey::Product));

        let filtered: Vec<ReviewRecord> = filter_by_product(&table.records, filter)
            .into_iter()
            .cloned()
            .collect();

        let status_chart = BarChart::new(
            format!("Average Sentiment by Delivery Status for {}", filter.label()),
            "Sentiment Score",
            "Delivery Status",
        )
        .with_color("slateblue")
        .with_aggregate(&aggregate_by(&filtered, GroupKey::Status));

        Self {
            selected: filter.label().to_string(),
            products: product_options(&table.records),
            product_chart_svg: product_chart.to_svg(),
            product_chart,
            status_chart_svg: status_chart.to_svg(),
            status_chart,
            columns: table.columns.clone(),
            rows: filtered.into_iter().map(|r| r.values).collect(),
        }
    }
}

/// Loads the review table through a shared cache
pub struct ReviewStore {
    platform: Arc<dyn Platform>,
    request: QueryRequest,
    cache: Mutex<QueryCache<ReviewTable>>,
}

impl ReviewStore {
    pub fn new(platform: Arc<dyn Platform>, config: &ReviewsConfig) -> Self {
        Self {
            platform,
            request: QueryRequest::new(format!("SELECT * FROM {}", config.table)),
            cache: Mutex::new(QueryCache::new(CacheConfig {
                capacity: config.cache_capacity,
                ttl: Duration::from_secs(config.cache_ttl_secs),
            })),
        }
    }

    /// Current snapshot of the review table.
    ///
    /// The cache lock is held across the remote call, so concurrent callers
    /// wait for one load instead of each issuing the query.
    pub async fn load_reviews(&self) -> Result<Arc<ReviewTable>, QueryError> {
        let mut cache = self.cache.lock().await;
        if let Some(table) = cache.get(&self.request) {
            return Ok(table);
        }

        info!(
            statement = %self.request.statement,
            platform = self.platform.name(),
            "Loading reviews"
        );
        let result = self.platform.run_query(&self.request).await?;
        let table = Arc::new(ReviewTable::from_query(result)?);
        debug!(rows = table.len(), columns = table.columns.len(), "Reviews loaded");

        cache.put(&self.request, Arc::clone(&table));
        Ok(table)
    }

    /// Explorer view for a product selection
    pub async fn explore(&self, filter: &ProductFilter) -> Result<ExplorerView, QueryError> {
        let table = self.load_reviews().await?;
        Ok(ExplorerView::build(&table, filter))
    }

    /// Forget the cached snapshot so the next load hits the platform
    pub async fn refresh(&self) -> bool {
        let dropped = self.cache.lock().await.invalidate(&self.request);
        info!(dropped, "Review cache refreshed");
        dropped
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }
}
