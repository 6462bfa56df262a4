use anyhow::Context;
use blob_storage::{BlobStore, InMemoryBlobStore, S3BlobStore, S3Config};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use orchestration_rs::{
    attachments::AttachmentResolver,
    config::{BlobType, Config, LedgerType},
    db,
    ledger::{InMemoryLedger, Ledger, PgLedger},
    routes,
    scraper::ScraperClient,
    services::{AdmissionService, DispatchService},
    sink::{DispatchSink, HttpDispatchSink},
    AppState, Gateways,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting orchestration service...");

    let config = Config::from_env()
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration from environment")?;

    tracing::info!(
        "Configuration loaded: host={}, port={}, ledger={:?}, blob={:?}",
        config.host,
        config.port,
        config.ledger_type,
        config.blob_type
    );

    let ledger: Arc<dyn Ledger> = match config.ledger_type {
        LedgerType::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when LEDGER_TYPE=postgres")?;

            tracing::info!("Connecting to database...");
            let pool = db::init_pool(database_url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Running migrations...");
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;

            Arc::new(PgLedger::new(pool))
        }
        LedgerType::InMemory => {
            tracing::warn!("Using InMemory ledger; records are lost on restart");
            Arc::new(InMemoryLedger::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = match config.blob_type {
        BlobType::S3 => {
            let s3_config = S3Config::from_env().context("Invalid blob store configuration")?;
            Arc::new(S3BlobStore::connect(s3_config).await)
        }
        BlobType::InMemory => {
            tracing::warn!("Using InMemory blob store");
            Arc::new(InMemoryBlobStore::new())
        }
    };

    let payments = Gateways::from_env(&config, ledger.clone()).into_service(ledger.clone());

    let scraper = match &config.scraper_url {
        Some(url) => Some(ScraperClient::new(url.as_str()).context("Invalid SCRAPER_URL")?),
        None => {
            tracing::warn!("SCRAPER_URL not set; admitted campaigns will not be forwarded");
            None
        }
    };
    let admission = AdmissionService::new(ledger.clone(), scraper);

    let sink: Option<Arc<dyn DispatchSink>> = match &config.dispatch_sink_url {
        Some(url) => Some(Arc::new(
            HttpDispatchSink::new(url.as_str()).context("Invalid DISPATCH_SINK_URL")?,
        )),
        None => {
            tracing::warn!("DISPATCH_SINK_URL not set; bulk sends are disabled");
            None
        }
    };
    let resolver = AttachmentResolver::new(blobs, config.blob_bucket.as_str())
        .context("Failed to build attachment resolver")?;
    let dispatch = DispatchService::new(resolver, sink);

    let state = AppState::new(
        ledger,
        payments,
        admission,
        dispatch,
        config.frontend_url.as_str(),
    );
    tracing::info!(providers = ?state.providers, "Payment providers enabled");

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("HOST and PORT must form a valid socket address")?;
    tracing::info!("Orchestration service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind address")?;

    axum::serve(listener, app).await.context("Server failed")?;

    Ok(())
}
