use std::env;

/// Ledger backend selected by `LEDGER_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerType {
    Postgres,
    InMemory,
}

/// Blob store backend selected by `BLOB_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobType {
    S3,
    InMemory,
}

/// Application configuration parsed from environment variables
///
/// Provider credentials are read separately by each gateway's config so a
/// missing provider only disables that provider.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub ledger_type: LedgerType,
    pub database_url: Option<String>,
    pub blob_type: BlobType,
    pub blob_bucket: String,
    /// Base URL providers use to reach this service's callbacks
    pub public_base_url: String,
    /// Base URL of the web app that payers are redirected back to
    pub frontend_url: String,
    pub scraper_url: Option<String>,
    pub dispatch_sink_url: Option<String>,
    pub continuation_signing_secret: Option<String>,
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let ledger_type = match env::var("LEDGER_TYPE")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => LedgerType::Postgres,
            "inmemory" => LedgerType::InMemory,
            other => {
                return Err(format!(
                    "Invalid LEDGER_TYPE: {}. Must be 'postgres' or 'inmemory'",
                    other
                ))
            }
        };

        let database_url = optional("DATABASE_URL");
        if ledger_type == LedgerType::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set when LEDGER_TYPE=postgres".to_string());
        }

        let blob_type = match env::var("BLOB_TYPE")
            .unwrap_or_else(|_| "s3".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => BlobType::S3,
            "inmemory" => BlobType::InMemory,
            other => {
                return Err(format!("Invalid BLOB_TYPE: {}. Must be 's3' or 'inmemory'", other))
            }
        };

        let blob_bucket = env::var("BLOB_BUCKET").unwrap_or_else(|_| "documents".to_string());

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let frontend_url = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            host,
            port,
            ledger_type,
            database_url,
            blob_type,
            blob_bucket,
            public_base_url,
            frontend_url,
            scraper_url: optional("SCRAPER_URL"),
            dispatch_sink_url: optional("DISPATCH_SINK_URL"),
            continuation_signing_secret: optional("CONTINUATION_SIGNING_SECRET"),
        })
    }
}
