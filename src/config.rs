use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on in-memory storage.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub cache: CacheConfig,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = std::env::var("JWT_SECRET").context("JWT_SECRET not configured")?;
        if secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET not configured");
        }

        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let cache = CacheConfig {
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            ttl_seconds: std::env::var("CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(300),
        };

        Ok(Self {
            database_url,
            jwt: JwtConfig { secret },
            cache,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
            },
            cache: CacheConfig {
                redis_url: None,
                ttl_seconds: 300,
            },
            host: "127.0.0.1".into(),
            port: 0,
        }
    }
}
