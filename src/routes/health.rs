use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db::DbHealth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/live", get(live))
        .route("/ready", get(ready))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadinessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    started_at: String,
    checks: ReadinessChecks,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadinessChecks {
    database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redis: Option<&'static str>,
}

async fn root(State(state): State<AppState>) -> Response {
    let ok = matches!(database_check(&state).await, DbHealth::Connected { .. });

    let response = HealthResponse {
        status: if ok { "ok" } else { "degraded" },
        database: if ok { "connected" } else { "disconnected" },
        timestamp: now_iso(),
    };

    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    let (database, database_latency_ms) = match database_check(&state).await {
        DbHealth::Connected { latency_ms } => ("connected", Some(latency_ms)),
        DbHealth::Timeout => ("timeout", None),
        DbHealth::Disconnected => ("disconnected", None),
    };

    let redis = match state.cache() {
        Some(cache) if cache.is_connected().await => Some("connected"),
        Some(_) => Some("disconnected"),
        None => None,
    };

    let status = match (database, redis) {
        ("disconnected", _) => "unhealthy",
        ("timeout", _) | (_, Some("disconnected")) => "degraded",
        _ => "healthy",
    };

    let response = ReadinessResponse {
        status,
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        started_at: system_time_iso(state.started_at_system()),
        checks: ReadinessChecks {
            database,
            database_latency_ms,
            redis,
        },
    };

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(response)).into_response()
}

async fn database_check(state: &AppState) -> DbHealth {
    match state.db_proxy() {
        Some(proxy) => proxy.check_health().await,
        None => DbHealth::Disconnected,
    }
}

fn system_time_iso(time: std::time::SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
