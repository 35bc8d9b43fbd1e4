//! Review dashboard server binary

use anyhow::{Context, Result};
use dashboard::api::{create_router, ApiState};
use dashboard::{Assistant, DashboardConfig, Platform, ReviewStore, SearchPanel, SnowflakeSession};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG overrides the default level
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting review dashboard v{}", env!("CARGO_PKG_VERSION"));

    // Load config from file
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "dashboard.toml".to_string());

    let config_contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    let config: DashboardConfig = toml::from_str(&config_contents)
        .with_context(|| format!("Failed to parse config file: {}", config_path))?;

    info!(
        config_path = config_path,
        account_url = config.platform.account_url,
        table = config.reviews.table,
        "Loaded configuration"
    );

    let token = config
        .platform
        .token
        .clone()
        .or_else(|| std::env::var("SNOWFLAKE_TOKEN").ok())
        .context("No platform token configured (set platform.token or SNOWFLAKE_TOKEN)")?;

    // Without a session nothing on the page can work, so this is fatal
    let session = SnowflakeSession::connect(&config.platform, token)
        .await
        .context("Failed to open a platform session")?;
    let platform: Arc<dyn Platform> = Arc::new(session);

    let reviews = Arc::new(ReviewStore::new(Arc::clone(&platform), &config.reviews));
    let state = Arc::new(ApiState {
        search: SearchPanel::new(Arc::clone(&platform), &config.search),
        assistant: Assistant::new(Arc::clone(&platform), Arc::clone(&reviews), &config.assistant),
        reviews,
        platform,
    });

    let app = create_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
