//! Configuration module
//!
//! Environment-driven configuration for the API server and the stage
//! workers. Every value has a development default except the secrets,
//! which must be provided explicitly outside of the memory backends.

use std::env;

const DEFAULT_SERVER_PORT: u16 = 4000;
const DEFAULT_MAX_UPLOAD_MB: usize = 10;
const DEFAULT_SAS_TTL_SECS: u64 = 300;
const DEFAULT_SAFETY_TIMEOUT_SECS: u64 = 10;
const QUEUE_MAX_WORKERS: usize = 4;
const QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const QUEUE_MAX_RETRIES: i32 = 3;
const QUEUE_DEFAULT_TIMEOUT_SECS: i32 = 300;

/// Which persistence layer backs the status records and the job queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Which backend holds uploaded artifacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Memory,
}

/// Stage worker pool settings.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub max_retries: i32,
    pub default_timeout_seconds: i32,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,
    /// Bearer key required on /ingest. `None` disables auth (development only).
    pub master_api_key: Option<String>,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    /// Secret for HMAC-signed artifact access URLs.
    pub url_signing_secret: String,
    pub sas_ttl_seconds: u64,
    pub max_upload_bytes: usize,
    pub allowed_content_types: Vec<String>,
    pub queue: QueueConfig,
    /// Content safety service endpoint. `None` means classification is
    /// skipped and every clean artifact passes through.
    pub safety_endpoint: Option<String>,
    pub safety_api_key: Option<String>,
    pub safety_timeout_seconds: u64,
    /// Completion event webhook. `None` disables event publishing.
    pub webhook_endpoint: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "postgres" | "postgresql" => StoreBackend::Postgres,
            other => {
                return Err(anyhow::anyhow!(
                    "STORE_BACKEND must be 'postgres' or 'memory', got '{}'",
                    other
                ))
            }
        };

        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "local" => StorageBackend::Local,
            other => {
                return Err(anyhow::anyhow!(
                    "STORAGE_BACKEND must be 'local' or 'memory', got '{}'",
                    other
                ))
            }
        };

        let max_upload_mb = env::var("MAX_UPLOAD_MB")
            .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_MB.to_string())
            .parse::<usize>()
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);

        let allowed_content_types = env::var("ALLOWED_CONTENT_TYPES")
            .unwrap_or_else(|_| "image/png,image/jpeg".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .collect();

        let queue = QueueConfig {
            max_workers: env::var("QUEUE_MAX_WORKERS")
                .unwrap_or_else(|_| QUEUE_MAX_WORKERS.to_string())
                .parse()
                .unwrap_or(QUEUE_MAX_WORKERS),
            poll_interval_ms: env::var("QUEUE_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| QUEUE_POLL_INTERVAL_MS.to_string())
                .parse()
                .unwrap_or(QUEUE_POLL_INTERVAL_MS),
            max_retries: env::var("QUEUE_MAX_RETRIES")
                .unwrap_or_else(|_| QUEUE_MAX_RETRIES.to_string())
                .parse()
                .unwrap_or(QUEUE_MAX_RETRIES),
            default_timeout_seconds: env::var("QUEUE_DEFAULT_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| QUEUE_DEFAULT_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(QUEUE_DEFAULT_TIMEOUT_SECS),
        };

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            cors_origins,
            master_api_key: env::var("MASTER_API_KEY").ok().filter(|s| !s.is_empty()),
            store_backend,
            database_url: env::var("DATABASE_URL").ok(),
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            url_signing_secret: env::var("URL_SIGNING_SECRET")
                .unwrap_or_else(|_| "dev-only-signing-secret-change-me".to_string()),
            sas_ttl_seconds: env::var("SAS_TTL_SECONDS")
                .unwrap_or_else(|_| DEFAULT_SAS_TTL_SECS.to_string())
                .parse()
                .unwrap_or(DEFAULT_SAS_TTL_SECS),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            allowed_content_types,
            queue,
            safety_endpoint: env::var("SAFETY_ENDPOINT").ok().filter(|s| !s.is_empty()),
            safety_api_key: env::var("SAFETY_API_KEY").ok(),
            safety_timeout_seconds: env::var("SAFETY_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| DEFAULT_SAFETY_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(DEFAULT_SAFETY_TIMEOUT_SECS),
            webhook_endpoint: env::var("WEBHOOK_ENDPOINT").ok().filter(|s| !s.is_empty()),
            webhook_secret: env::var("WEBHOOK_SECRET").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() {
            if self.master_api_key.is_none() {
                return Err(anyhow::anyhow!("MASTER_API_KEY must be set in production"));
            }
            if self.url_signing_secret.starts_with("dev-only") {
                return Err(anyhow::anyhow!("URL_SIGNING_SECRET must be set in production"));
            }
            if self.cors_origins.iter().any(|o| o == "*") {
                return Err(anyhow::anyhow!(
                    "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
                ));
            }
        }

        if self.store_backend == StoreBackend::Postgres {
            match &self.database_url {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
                }
                Some(_) => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when using the postgres store backend"
                    ))
                }
            }
        }

        if self.storage_backend == StorageBackend::Local && self.local_storage_path.is_none() {
            return Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH must be set when using local storage backend"
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_MB must be greater than zero"));
        }

        if self.webhook_endpoint.is_some() && self.webhook_secret.is_none() {
            return Err(anyhow::anyhow!(
                "WEBHOOK_SECRET must be set when WEBHOOK_ENDPOINT is configured"
            ));
        }

        Ok(())
    }
}
