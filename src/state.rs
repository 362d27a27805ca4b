use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::cache::RedisCache;
use crate::config::Config;
use crate::db::DatabaseProxy;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    db_proxy: Option<Arc<DatabaseProxy>>,
    cache: Option<Arc<RedisCache>>,
    rate_limiter: Arc<RateLimiter>,
    jwt_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        db_proxy: Option<Arc<DatabaseProxy>>,
        cache: Option<Arc<RedisCache>>,
        config: &Config,
    ) -> Self {
        let rate_config = RateLimitConfig::from_env();
        let rate_limiter = match &cache {
            Some(cache) => RateLimiter::with_redis(rate_config, Arc::clone(cache)),
            None => RateLimiter::in_memory(rate_config),
        };

        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            db_proxy,
            cache,
            rate_limiter: Arc::new(rate_limiter),
            jwt_secret: config.jwt_secret.as_deref().map(Arc::from),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn db_proxy(&self) -> Option<Arc<DatabaseProxy>> {
        self.db_proxy.clone()
    }

    pub fn cache(&self) -> Option<Arc<RedisCache>> {
        self.cache.clone()
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref()
    }
}
