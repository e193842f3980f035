use redis::aio::ConnectionManager;
use std::sync::Arc;
use crate::config::Config;
use crate::error::Result;
use crate::repositories::{
    memory::MemoryStore,
    postgres::PgStore,
    store::SessionStore,
    throttle::{LoginThrottle, MemoryThrottle, RedisThrottle},
};
use crate::services::auth::AuthService;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The authentication service.
    pub auth: AuthService,
    /// Failed-login counters. Throttling is off when `None`.
    pub throttle: Option<Arc<dyn LoginThrottle>>,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`, connecting to every configured backend.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn SessionStore> = match config.database_url {
            Some(ref url) => {
                let pool = crate::db::create_pool(url)?;
                crate::db::run_migrations(&pool).await?;
                tracing::info!("✅ PostgreSQL session store initialized");
                Arc::new(PgStore::new(pool))
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL not set, sessions are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };

        let throttle: Arc<dyn LoginThrottle> = match config.redis_url {
            Some(ref url) => {
                let client = redis::Client::open(url.as_str())?;
                let manager = ConnectionManager::new(client).await?;
                tracing::info!("✅ Redis Connection Manager initialized (login throttle)");
                Arc::new(RedisThrottle::new(manager))
            }
            None => {
                tracing::warn!("⚠️ REDIS_URL not set, login throttle is per process");
                Arc::new(MemoryThrottle::new())
            }
        };

        Ok(Self::with_store(config.clone(), store, Some(throttle)))
    }

    /// Builds the state around an already constructed store and throttle.
    pub fn with_store(
        config: Config,
        store: Arc<dyn SessionStore>,
        throttle: Option<Arc<dyn LoginThrottle>>,
    ) -> Self {
        let auth = AuthService::new(
            store,
            chrono::Duration::seconds(config.session_ttl_secs()),
            std::time::Duration::from_millis(config.store_timeout_ms),
        );

        AppState {
            auth,
            throttle,
            config,
        }
    }
}
