use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{MemoryUserStore, PgUserStore, UserStore},
    },
    cache::{
        redis_store::RedisCache,
        store::{CacheStore, MemoryCache},
    },
    config::AppConfig,
    tasks::repo::{MemoryTaskStore, PgTaskStore, TaskStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    /// `None` when running on in-memory storage.
    pub db: Option<PgPool>,
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub cache: Arc<dyn CacheStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let (db, users, tasks) = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await?;
                info!("connected to postgres");
                (
                    Some(db.clone()),
                    Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>,
                    Arc::new(PgTaskStore::new(db)) as Arc<dyn TaskStore>,
                )
            }
            None => {
                warn!("DATABASE_URL not set; data lives in memory and is lost on restart");
                (
                    None,
                    Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>,
                    Arc::new(MemoryTaskStore::new()) as Arc<dyn TaskStore>,
                )
            }
        };

        let cache = match &config.cache.redis_url {
            Some(url) => {
                info!("using redis cache");
                Arc::new(RedisCache::connect(url)?) as Arc<dyn CacheStore>
            }
            None => {
                warn!("REDIS_URL not set; using in-process cache");
                Arc::new(MemoryCache::new()) as Arc<dyn CacheStore>
            }
        };

        let mut state = Self::from_parts(config, users, tasks, cache)?;
        state.db = db;
        Ok(state)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        tasks: Arc<dyn TaskStore>,
        cache: Arc<dyn CacheStore>,
    ) -> anyhow::Result<Self> {
        let keys = JwtKeys::new(&config.jwt.secret)?;
        Ok(Self {
            config,
            keys,
            db: None,
            users,
            tasks,
            cache,
        })
    }

    /// Fully in-memory state for router tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_cache(Arc::new(MemoryCache::new()))
    }

    #[cfg(test)]
    pub fn fake_with_cache(cache: Arc<dyn CacheStore>) -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryTaskStore::new()),
            cache,
        )
        .expect("test config has a secret")
    }
}
