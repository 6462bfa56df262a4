mod common;

use axum::http::StatusCode;
use serde_json::json;
use serial_test::serial;

use common::{AppOptions, MockProvider};
use orchestration_rs::config::{BlobType, Config, LedgerType};

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_enabled_providers() {
    let provider = MockProvider::default();
    let app = common::app(AppOptions {
        gateway_a_url: Some(provider.start().await),
        gateway_b_url: Some(provider.start().await),
        ..Default::default()
    });

    let response = common::get(&app.router, "/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "orchestration-rs");
    assert_eq!(body["ledger"], "ok");
    assert_eq!(body["providers"], json!(["gateway_a", "gateway_b"]));
}

#[tokio::test]
async fn test_health_without_providers() {
    let app = common::app(AppOptions::default());

    let response = common::get(&app.router, "/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_json(response).await["providers"], json!([]));
}

#[tokio::test]
async fn test_unknown_provider_rejected() {
    let app = common::app(AppOptions::default());

    let response = common::post_json(
        &app.router,
        "/api/payments",
        common::initiate_body("gateway_z", "user-1", "10"),
    )
    .await;
    assert!(response.status().is_client_error());
    assert_eq!(app.ledger.payment_count(), 0);
}

// ============================================================================
// Configuration
// ============================================================================

const CONFIG_VARS: &[&str] = &[
    "HOST",
    "PORT",
    "LEDGER_TYPE",
    "DATABASE_URL",
    "BLOB_TYPE",
    "BLOB_BUCKET",
    "PUBLIC_BASE_URL",
    "FRONTEND_URL",
    "SCRAPER_URL",
    "DISPATCH_SINK_URL",
    "CONTINUATION_SIGNING_SECRET",
];

fn clear_config_env() {
    for name in CONFIG_VARS {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_config_defaults_require_database_url() {
    clear_config_env();

    let err = Config::from_env().unwrap_err();
    assert!(err.contains("DATABASE_URL"));

    std::env::set_var("DATABASE_URL", "postgres://localhost/orchestration");
    let config = Config::from_env().unwrap();
    assert_eq!(config.port, 8080);
    assert_eq!(config.ledger_type, LedgerType::Postgres);
    assert_eq!(config.blob_type, BlobType::S3);
    assert_eq!(config.blob_bucket, "documents");
    assert_eq!(config.frontend_url, "http://localhost:3000");
    assert_eq!(config.public_base_url, "http://localhost:8080");
    assert!(config.scraper_url.is_none());
    assert!(config.continuation_signing_secret.is_none());

    clear_config_env();
}

#[test]
#[serial]
fn test_config_inmemory_backends() {
    clear_config_env();
    std::env::set_var("LEDGER_TYPE", "InMemory");
    std::env::set_var("BLOB_TYPE", "inmemory");
    std::env::set_var("FRONTEND_URL", "https://app.example.com/");
    std::env::set_var("SCRAPER_URL", "  ");
    std::env::set_var("CONTINUATION_SIGNING_SECRET", "s3cret");

    let config = Config::from_env().unwrap();
    assert_eq!(config.ledger_type, LedgerType::InMemory);
    assert_eq!(config.blob_type, BlobType::InMemory);
    assert!(config.database_url.is_none());
    assert_eq!(config.frontend_url, "https://app.example.com");
    assert!(config.scraper_url.is_none());
    assert_eq!(config.continuation_signing_secret.as_deref(), Some("s3cret"));

    clear_config_env();
}

#[test]
#[serial]
fn test_config_rejects_invalid_values() {
    clear_config_env();
    std::env::set_var("LEDGER_TYPE", "inmemory");

    std::env::set_var("PORT", "not-a-port");
    assert!(Config::from_env().unwrap_err().contains("PORT"));
    std::env::remove_var("PORT");

    std::env::set_var("BLOB_TYPE", "ftp");
    assert!(Config::from_env().unwrap_err().contains("BLOB_TYPE"));

    clear_config_env();
}
