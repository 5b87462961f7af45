use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub minio_endpoint: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub receipt_max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JourneyConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub retries: u32,
}

/// Credentials for the self-owned administrator created at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub journey: JourneyConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "tripdesk".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "tripdesk-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let storage = StorageConfig {
            minio_endpoint: std::env::var("MINIO_ENDPOINT")?,
            minio_bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "receipts".into()),
            minio_access_key: std::env::var("MINIO_ACCESS_KEY")?,
            minio_secret_key: std::env::var("MINIO_SECRET_KEY")?,
            receipt_max_bytes: env_or("RECEIPT_MAX_BYTES", 10 * 1024 * 1024),
        };
        let journey = JourneyConfig {
            api_url: std::env::var("JOURNEY_API_URL")
                .unwrap_or_else(|_| "https://transport.opendata.ch/v1".into()),
            timeout_secs: env_or("JOURNEY_TIMEOUT_SECS", 5),
            retries: env_or("JOURNEY_RETRIES", 1),
        };
        let bootstrap_admin = match (
            std::env::var("BOOTSTRAP_ADMIN_USERNAME"),
            std::env::var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some(BootstrapAdmin { username, password }),
            _ => None,
        };
        Ok(Self {
            database_url,
            jwt,
            storage,
            journey,
            bootstrap_admin,
        })
    }
}
