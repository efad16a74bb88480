//! Routes exercised through the axum router without a socket

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chatql_api::http::{build_router, AppState};
use common::harness;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn router(h: &common::Harness) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(h.api.clone()));
    (build_router(state.clone()), state)
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, authorization: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_returns_empty_envelope() {
    let h = harness();
    let (router, _) = router(&h);

    let (status, body) = call(&router, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "data": null, "errors": null }));
}

#[tokio::test]
async fn authenticate_then_use_session() {
    let h = harness();
    let (router, _) = router(&h);

    let (status, body) = call(
        &router,
        post(
            "/auth/authenticate",
            None,
            json!({ "email": "alice@example.com", "tokenUrl": "http://localhost:3000/in" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, link) = h.delivery.links.lock().unwrap()[0].clone();
    let access = common::link_param(&link, "accessToken").unwrap();
    let bearer = format!("Bearer {}", access);

    let (_, body) = call(&router, get("/users", Some(&bearer))).await;
    assert_eq!(body["data"][0]["email"], "alice@example.com");

    let user_id = body["data"][0]["id"].as_str().unwrap().to_string();
    let (_, body) = call(&router, get(&format!("/users/{}", user_id), Some(&bearer))).await;
    assert_eq!(body["data"]["id"], user_id.as_str());
}

#[tokio::test]
async fn refresh_route_reports_envelope_errors() {
    let h = harness();
    let session = h.sign_in("bob@example.com").await;
    let (router, _) = router(&h);

    let (status, body) = call(
        &router,
        post("/auth/refresh", None, json!({ "refreshToken": session.access_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0]["code"], "INCORRECT_TOKEN_TYPE");
    assert_eq!(body["errors"][0]["source"]["pointer"], "/refreshToken");

    let (_, body) = call(
        &router,
        post("/auth/refresh", None, json!({ "refreshToken": session.refresh_token })),
    )
    .await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["accessToken"].is_string());
    assert!(body["data"]["refreshToken"].is_string());
}

#[tokio::test]
async fn messages_round_trip_over_http() {
    let h = harness();
    let alice = h.sign_in("alice@example.com").await;
    let bob = h.sign_in("bob@example.com").await;
    let (router, _) = router(&h);

    let (_, created) = call(
        &router,
        post(
            "/messages",
            alice.auth(),
            json!({ "content": "lunch?", "channelMemberIds": [bob.user_id.to_string()] }),
        ),
    )
    .await;
    assert_eq!(created["success"], true, "{}", created);
    assert_eq!(created["data"]["content"], "lunch?");

    let channel_id = created["data"]["channel"]["id"].as_str().unwrap().to_string();

    let (_, channels) = call(&router, get("/channels", bob.auth())).await;
    assert_eq!(channels["data"][0]["id"], channel_id.as_str());

    let (_, found) = call(
        &router,
        get(&format!("/messages?content=lunch&channelId={}&limit=5", channel_id), bob.auth()),
    )
    .await;
    assert_eq!(found["data"].as_array().unwrap().len(), 1);

    let (_, none) = call(&router, get("/messages?beforeSequence=1", bob.auth())).await;
    assert_eq!(none["data"], json!([]));
}

#[tokio::test]
async fn session_routes_reject_missing_login() {
    let h = harness();
    let (router, _) = router(&h);

    for uri in ["/users", "/channels", "/messages", "/messages/subscribe"] {
        let (status, body) = call(&router, get(uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false, "{}", uri);
        assert_eq!(body["errors"][0]["code"], "UNAUTHORIZED");
        assert_eq!(body["errors"][0]["source"]["header"], "Authorization");
    }
}

#[tokio::test]
async fn subscribe_opens_event_stream() {
    let h = harness();
    let alice = h.sign_in("alice@example.com").await;
    let (router, state) = router(&h);

    let response = router
        .clone()
        .oneshot(get("/messages/subscribe", alice.auth()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    // Shutdown ends the feed so the body completes
    state.begin_shutdown();
    let body = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(body.is_empty());
}
