use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn authed(method: &str, uri: &str, user_id: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, common::bearer(user_id))
}

fn json_body(value: Value) -> Body {
    Body::from(serde_json::to_vec(&value).unwrap())
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;
    let app = common::test_app(Some(ledger.proxy.clone()));

    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri("/api/units/a/complete")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_forged_token_is_unauthorized() {
    let app = common::test_app(None);
    let forged = xp_ledger_backend::auth::sign_jwt_for_user("learner", "wrong-secret", "1h").unwrap();

    let (status, _) = send(
        app,
        Request::builder()
            .uri("/api/courses/c1/xp")
            .header(header::AUTHORIZATION, format!("Bearer {forged}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_token_wins_over_malformed_body() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    for uri in ["/api/units/a/progress", "/api/units/a/activity"] {
        let (status, body) = send(
            common::test_app(Some(ledger.proxy.clone())),
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn test_authenticated_without_database_is_unavailable() {
    let app = common::test_app(None);

    let (status, body) = send(
        app,
        authed("GET", "/api/courses/c1/xp", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_unknown_unit_is_not_found() {
    let ledger = common::test_ledger().await;
    let app = common::test_app(Some(ledger.proxy.clone()));

    let (status, body) = send(
        app,
        authed("POST", "/api/units/missing/complete", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = common::test_app(None);

    let (status, body) = send(
        app,
        Request::builder()
            .uri("/api/nothing-here")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_complete_unit_endpoint() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("POST", "/api/units/a/complete", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["awardedXp"], 100);
    assert_eq!(body["data"]["nextUnitSlug"], "b-slug");
    assert_eq!(body["data"]["alreadyCompleted"], false);

    let (_, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("POST", "/api/units/a/complete", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["data"]["awardedXp"], 0);
    assert_eq!(body["data"]["alreadyCompleted"], true);

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("GET", "/api/courses/c1/xp", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["xpMandatory"], 100);
    assert_eq!(body["data"]["xpBonus"], 10);
    assert_eq!(body["data"]["xpPrimary"], 110);

    let (_, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("GET", "/api/courses/c1/xp/events", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["data"]["count"], 2);
}

#[tokio::test]
async fn test_cookie_token_is_accepted() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;
    let bearer = common::bearer("learner");
    let token = bearer.trim_start_matches("Bearer ");

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        Request::builder()
            .uri("/api/units/a/status")
            .header(header::COOKIE, format!("auth_token={token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isCompleted"], false);
    assert_eq!(body["data"]["unitXP"], 100);
}

#[tokio::test]
async fn test_progress_then_status() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("POST", "/api/units/a/progress", "learner")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(json!({"watchedSeconds": 42.9, "watchedPct": 37.5})))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ok"], true);

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("POST", "/api/units/a/status", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["watchedSeconds"], 42);
    assert_eq!(body["data"]["watchedPct"], 37.5);
    assert_eq!(body["data"]["isLocked"], false);
}

#[tokio::test]
async fn test_malformed_progress_body_is_bad_request() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("POST", "/api/units/a/progress", "learner")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_welcome_and_recompute_endpoints() {
    let ledger = common::test_ledger().await;
    common::add_course(&ledger.proxy, "cw", true, 15).await;

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("POST", "/api/courses/cw/welcome", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["awardedXp"], 15);
    assert_eq!(body["data"]["alreadyGranted"], false);

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("POST", "/api/courses/cw/xp/recompute", "learner")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["xpWelcome"], 15);
    assert_eq!(body["data"]["xpTotal"], 15);
}

#[tokio::test]
async fn test_activity_endpoint_rejects_non_activity_unit() {
    let ledger = common::test_ledger().await;
    common::seed_mixed_module(&ledger.proxy).await;

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        authed("POST", "/api/units/a/activity", "learner")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(json!({"text": "my answer"})))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_health_endpoints() {
    let ledger = common::test_ledger().await;

    let (status, body) = send(
        common::test_app(Some(ledger.proxy.clone())),
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");

    let (status, _) = send(
        common::test_app(None),
        Request::builder()
            .uri("/health/live")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        common::test_app(None),
        Request::builder()
            .uri("/health/ready")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["database"], "disconnected");
}
