mod courses;
mod health;
mod units;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::{async_trait, Json, Router};
use serde::de::DeserializeOwned;

use crate::auth::{self, AuthError, AuthUser};
use crate::db::DatabaseProxy;
use crate::middleware::rate_limit::api_rate_limit_middleware;
use crate::response::{json_error, AppError};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let healthcheck_endpoint = normalize_healthcheck_endpoint(
        std::env::var("HEALTHCHECK_ENDPOINT")
            .ok()
            .as_deref()
            .unwrap_or("/health"),
    );

    let mut app = Router::new()
        .nest("/api/units", units::router())
        .nest("/api/courses", courses::router());

    let mut health_paths = vec!["/health".to_string()];
    if healthcheck_endpoint != "/health" {
        health_paths.push(healthcheck_endpoint);
    }
    if !health_paths.iter().any(|path| path == "/api/health") {
        health_paths.push("/api/health".to_string());
    }

    for path in &health_paths {
        app = app.nest(path.as_str(), health::router());
    }

    app.layer(middleware::from_fn_with_state(
        state.clone(),
        api_rate_limit_middleware,
    ))
    .fallback(fallback_handler)
    .with_state(state)
}

/// Resolves the caller before anything is read. A missing or invalid token
/// is always a 401, even when the database is down.
fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<DatabaseProxy>, AuthUser), AppError> {
    let user = auth::authenticate(headers, state.jwt_secret()).map_err(|err| match err {
        AuthError::MissingToken => AppError::unauthorized("Authentication token required"),
        AuthError::MissingSecret => {
            tracing::error!("JWT_SECRET is not configured, rejecting authenticated request");
            AppError::unauthorized("Authentication failed")
        }
        _ => AppError::unauthorized("Authentication failed, please sign in again"),
    })?;

    let proxy = state
        .db_proxy()
        .ok_or_else(|| AppError::service_unavailable("Service unavailable"))?;

    Ok((proxy, user))
}

/// Authenticated caller plus the database handle. Handlers list it ahead of
/// any body extractor so a bad token wins over a bad body.
pub(crate) struct Authed {
    pub proxy: Arc<DatabaseProxy>,
    pub user: AuthUser,
}

#[async_trait]
impl FromRequestParts<AppState> for Authed {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (proxy, user) = require_user(state, &parts.headers)?;
        Ok(Self { proxy, user })
    }
}

/// `Json` with rejections folded into the standard error envelope.
pub(crate) struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::bad_request(rejection.body_text())
}

fn normalize_healthcheck_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "/health".to_string();
    }

    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };

    if with_slash != "/" {
        with_slash.trim_end_matches('/').to_string()
    } else {
        "/health".to_string()
    }
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found").into_response()
}

#[cfg(test)]
mod tests {
    use super::normalize_healthcheck_endpoint;

    #[test]
    fn test_normalize_healthcheck_endpoint() {
        assert_eq!(normalize_healthcheck_endpoint(""), "/health");
        assert_eq!(normalize_healthcheck_endpoint("status/"), "/status");
        assert_eq!(normalize_healthcheck_endpoint("/healthz"), "/healthz");
        assert_eq!(normalize_healthcheck_endpoint("/"), "/health");
    }
}
