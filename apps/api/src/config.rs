use anyhow::{Context, Result};

/// Default request body ceiling for uploads and base64 extraction payloads.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absent → contracts and users live in the in-process memory store.
    pub database_url: Option<String>,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    /// HS256 secret shared with the identity provider for bearer tokens.
    pub jwt_secret: String,
    pub freshsales: Option<FreshsalesConfig>,
    pub identity_admin: Option<IdentityAdminConfig>,
    /// Worker pool size for bulk CRM sync. 1 keeps it strictly sequential.
    pub sync_concurrency: usize,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct FreshsalesConfig {
    pub domain: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct IdentityAdminConfig {
    pub base_url: String,
    pub token: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let freshsales = match (optional_env("FRESHSALES_DOMAIN"), optional_env("FRESHSALES_API_KEY")) {
            (Some(domain), Some(api_key)) => Some(FreshsalesConfig { domain, api_key }),
            _ => None,
        };
        let identity_admin = match (
            optional_env("IDENTITY_ADMIN_URL"),
            optional_env("IDENTITY_ADMIN_TOKEN"),
        ) {
            (Some(base_url), Some(token)) => Some(IdentityAdminConfig { base_url, token }),
            _ => None,
        };

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            jwt_secret: require_env("JWT_SECRET")?,
            freshsales,
            identity_admin,
            sync_concurrency: parse_env("SYNC_CONCURRENCY", 1usize)?.max(1),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            port: parse_env("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .ok()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
    }
}
