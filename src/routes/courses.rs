use axum::extract::Path;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::db::operations::XpEvent;
use crate::response::{ok, AppError};
use crate::routes::Authed;
use crate::services::gamification;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct EventsData {
    events: Vec<XpEvent>,
    count: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:course_id/welcome", post(welcome))
        .route("/:course_id/xp", get(balance))
        .route("/:course_id/xp/events", get(events))
        .route("/:course_id/xp/recompute", post(recompute))
}

async fn welcome(
    Authed { proxy, user }: Authed,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = gamification::grant_course_welcome(&proxy, &user.id, &course_id).await?;
    Ok(ok(outcome))
}

async fn balance(
    Authed { proxy, user }: Authed,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let balance = gamification::get_balance(&proxy, &user.id, &course_id).await?;
    Ok(ok(balance))
}

async fn events(
    Authed { proxy, user }: Authed,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let events = gamification::list_events(&proxy, &user.id, &course_id).await?;
    Ok(ok(EventsData {
        count: events.len(),
        events,
    }))
}

/// Rebuilds the caller's balance from the event log and returns it.
async fn recompute(
    Authed { proxy, user }: Authed,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    gamification::recompute_balance(&proxy, &user.id, &course_id).await?;
    let balance = gamification::get_balance(&proxy, &user.id, &course_id).await?;
    Ok(ok(balance))
}
