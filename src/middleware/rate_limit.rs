use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header::RETRY_AFTER, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::cache::{keys, RedisCache};
use crate::response::json_error;
use crate::state::AppState;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

const DEFAULT_WINDOW_MS: u64 = 900_000;
const DEFAULT_MAX: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max: u64,
    pub trust_proxy: bool,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            window_ms: env_u64("RATE_LIMIT_WINDOW_MS").unwrap_or(DEFAULT_WINDOW_MS),
            max: env_u64("RATE_LIMIT_MAX").unwrap_or(DEFAULT_MAX),
            trust_proxy: trust_proxy_enabled(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max: DEFAULT_MAX,
            trust_proxy: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCheck {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_after_seconds: u64,
}

#[derive(Debug)]
struct MemoryState {
    entries: HashMap<IpAddr, Entry>,
    last_cleanup_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    window_start_ms: u64,
    hits: u64,
}

enum Store {
    Memory(Mutex<MemoryState>),
    Redis(Arc<RedisCache>),
}

/// Fixed-window limiter keyed by client IP. Counts live in process memory
/// unless a Redis connection is supplied, in which case every instance
/// shares them.
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Store,
}

impl RateLimiter {
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self {
            config,
            store: Store::Memory(Mutex::new(MemoryState {
                entries: HashMap::new(),
                last_cleanup_ms: now_ms(),
            })),
        }
    }

    pub fn with_redis(config: RateLimitConfig, cache: Arc<RedisCache>) -> Self {
        Self {
            config,
            store: Store::Redis(cache),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitCheck {
        match &self.store {
            Store::Memory(state) => self.check_memory(state, ip).await,
            Store::Redis(cache) => {
                let key = keys::rate_limit_key("api", &ip.to_string());
                let window = Duration::from_millis(self.config.window_ms);
                match cache.incr_window(&key, window).await {
                    Ok(hits) => self.verdict(hits.hits, hits.reset_after.as_millis() as u64),
                    Err(err) => {
                        tracing::warn!(error = %err, "redis rate limit store unavailable, allowing request");
                        self.verdict(0, self.config.window_ms)
                    }
                }
            }
        }
    }

    async fn check_memory(&self, state: &Mutex<MemoryState>, ip: IpAddr) -> RateLimitCheck {
        let now_ms = now_ms();
        let window_ms = self.config.window_ms;
        let mut state = state.lock().await;

        if now_ms.saturating_sub(state.last_cleanup_ms) >= window_ms {
            state
                .entries
                .retain(|_, entry| now_ms.saturating_sub(entry.window_start_ms) < window_ms);
            state.last_cleanup_ms = now_ms;
        }

        let entry = state.entries.entry(ip).or_insert(Entry {
            window_start_ms: now_ms,
            hits: 0,
        });

        if now_ms.saturating_sub(entry.window_start_ms) >= window_ms {
            entry.window_start_ms = now_ms;
            entry.hits = 0;
        }

        entry.hits = entry.hits.saturating_add(1);
        let reset_after_ms = window_ms.saturating_sub(now_ms.saturating_sub(entry.window_start_ms));
        self.verdict(entry.hits, reset_after_ms)
    }

    fn verdict(&self, hits: u64, reset_after_ms: u64) -> RateLimitCheck {
        let allowed = hits <= self.config.max;
        RateLimitCheck {
            allowed,
            limit: self.config.max,
            remaining: if allowed {
                self.config.max.saturating_sub(hits)
            } else {
                0
            },
            reset_after_seconds: reset_after_ms.div_ceil(1000),
        }
    }
}

pub async fn api_rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if !matches_api_prefix(path) || is_test_env() {
        return next.run(req).await;
    }

    let limiter = state.rate_limiter();
    let ip = extract_client_ip(&req, limiter.config().trust_proxy);
    if ip.is_some_and(|ip| ip.is_loopback()) {
        return next.run(req).await;
    }

    let check = limiter
        .check(ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)))
        .await;

    if !check.allowed {
        let mut res = json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "TOO_MANY_REQUESTS",
            "Too many requests, slow down",
        )
        .into_response();
        apply_rate_limit_headers(&mut res, check);
        return res;
    }

    let mut res = next.run(req).await;
    apply_rate_limit_headers(&mut res, check);
    res
}

fn apply_rate_limit_headers(res: &mut Response, check: RateLimitCheck) {
    if let Ok(value) = HeaderValue::from_str(&check.limit.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.remaining.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_REMAINING, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.reset_after_seconds.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_RESET, value.clone());
        if check.remaining == 0 {
            res.headers_mut().insert(RETRY_AFTER, value);
        }
    }
}

fn matches_api_prefix(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

fn env_u64(key: &str) -> Option<u64> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u64>().ok()
}

fn is_test_env() -> bool {
    matches!(std::env::var("APP_ENV").ok().as_deref(), Some("test"))
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn extract_client_ip(req: &Request<Body>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = extract_x_forwarded_for(req) {
            return Some(ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn trust_proxy_enabled() -> bool {
    let Ok(value) = std::env::var("TRUST_PROXY") else {
        return false;
    };
    let normalized = value.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return false;
    }
    !matches!(normalized.as_str(), "0" | "false")
}

fn extract_x_forwarded_for(req: &Request<Body>) -> Option<IpAddr> {
    let raw = req
        .headers()
        .get(HeaderName::from_static("x-forwarded-for"))?
        .to_str()
        .ok()?;
    let first = raw.split(',').next()?.trim();
    first.parse::<IpAddr>().ok()
}
