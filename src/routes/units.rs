use axum::extract::Path;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::response::{ok, AppError};
use crate::routes::{Authed, JsonBody};
use crate::services::{activity, gamification, progress};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressBody {
    #[serde(default)]
    watched_seconds: f64,
    #[serde(default)]
    watched_pct: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityBody {
    text: Option<String>,
    attachment_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:unit_id/complete", post(complete))
        .route("/:unit_id/progress", post(record_progress))
        .route("/:unit_id/status", get(status).post(status))
        .route("/:unit_id/activity", get(activity_status).post(submit_activity))
}

async fn complete(
    Authed { proxy, user }: Authed,
    Path(unit_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = gamification::complete_unit(&proxy, &user.id, &unit_id).await?;
    Ok(ok(outcome))
}

async fn record_progress(
    Authed { proxy, user }: Authed,
    Path(unit_id): Path<String>,
    JsonBody(body): JsonBody<ProgressBody>,
) -> Result<impl IntoResponse, AppError> {
    progress::record_progress(
        &proxy,
        &user.id,
        &unit_id,
        body.watched_seconds,
        body.watched_pct,
    )
    .await?;
    Ok(ok(Ack { ok: true }))
}

async fn status(
    Authed { proxy, user }: Authed,
    Path(unit_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = progress::get_unit_status(&proxy, &user.id, &unit_id).await?;
    Ok(ok(status))
}

async fn activity_status(
    Authed { proxy, user }: Authed,
    Path(unit_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = activity::get_activity_status(&proxy, &user.id, &unit_id).await?;
    Ok(ok(status))
}

async fn submit_activity(
    Authed { proxy, user }: Authed,
    Path(unit_id): Path<String>,
    JsonBody(body): JsonBody<ActivityBody>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = activity::submit_activity(
        &proxy,
        &user.id,
        &unit_id,
        body.text.as_deref(),
        body.attachment_url.as_deref(),
    )
    .await?;
    Ok(ok(outcome))
}
