use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::{AUTHORIZATION, CONTENT_TYPE}},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use clipsync_api::auth::{AppStateInner, issue_token};
use clipsync_api::config::Config;
use clipsync_db::Database;

const SECRET: &str = "integration-test-secret";

fn app() -> Router {
    let config = Config {
        jwt_secret: SECRET.into(),
        ..Config::default()
    };
    let state = Arc::new(AppStateInner::new(Database::open_in_memory().unwrap(), config));
    clipsync_api::router(state)
}

fn token_for(user_id: &str) -> String {
    let config = Config {
        jwt_secret: SECRET.into(),
        ..Config::default()
    };
    issue_token(&config, user_id, Utc::now()).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/clips", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, Method::GET, "/api/sync/status", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = token_for("user-1");
    let (status, body) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "user-1");
}

#[tokio::test]
async fn pair_push_pull_status() {
    let app = app();
    let owner = token_for("user-1");

    let (status, issued) = send(&app, Method::GET, "/api/pairing/code", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let code = issued["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert_eq!(issued["deepLink"], format!("clipsync://pair/{}", code));

    let (status, paired) = send(
        &app,
        Method::POST,
        "/api/pairing/verify",
        None,
        Some(json!({ "code": code.to_lowercase() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paired["userId"], "user-1");
    let device_token = paired["token"].as_str().unwrap().to_string();

    let (status, again) = send(&app, Method::POST, "/api/pairing/verify", None, Some(json!({ "code": code }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["code"], "CODE_USED");

    let (_, fresh) = send(&app, Method::GET, "/api/sync/status?deviceId=dev1", Some(&device_token), None).await;
    let never = DateTime::parse_from_rfc3339(fresh["lastSync"].as_str().unwrap()).unwrap();
    assert_eq!(never.timestamp(), 0);

    let (status, pushed) = send(
        &app,
        Method::POST,
        "/api/sync/push",
        Some(&device_token),
        Some(json!({ "deviceId": "dev1", "clips": [{ "content": "hello" }, { "content": "" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pushed["synced"], 1);
    assert_eq!(pushed["failed"], json!([1]));

    let (status, sync) = send(&app, Method::GET, "/api/sync/status?deviceId=dev1", Some(&device_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(sync["totalClips"].as_i64().unwrap() >= 1);
    assert_eq!(sync["unsyncedClips"], 0);
    assert_eq!(sync["lastSync"], pushed["lastSync"]);

    let (status, pulled) = send(
        &app,
        Method::POST,
        "/api/sync/pull",
        Some(&owner),
        Some(json!({ "deviceId": "dev2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let clips = pulled["clips"].as_array().unwrap();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0]["content"], "hello");
    assert_eq!(clips[0]["contentPreview"], "hello");

    let cursor = pulled["lastSync"].as_str().unwrap().to_string();
    let (_, empty) = send(
        &app,
        Method::POST,
        "/api/sync/pull",
        Some(&owner),
        Some(json!({ "deviceId": "dev2", "lastSync": cursor })),
    )
    .await;
    assert_eq!(empty["clips"], json!([]));

    let (status, bad) = send(
        &app,
        Method::POST,
        "/api/sync/pull",
        Some(&owner),
        Some(json!({ "deviceId": "dev2", "lastSync": "last tuesday" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(bad["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn clip_crud_is_owner_scoped() {
    let app = app();
    let alice = token_for("alice");
    let bob = token_for("bob");

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/clips",
        Some(&alice),
        Some(json!({ "content": "hello world", "tags": ["a", "a", "b"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["tags"], json!(["a", "b"]));
    assert_eq!(created["synced"], true);
    let id = created["id"].as_str().unwrap().to_string();
    let uri = format!("/api/clips/{}", id);

    let (status, _) = send(&app, Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, "/api/clips/not-a-uuid", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, fav) = send(&app, Method::PUT, &format!("{}/favorite", uri), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fav["isFavorite"], true);

    let (status, updated) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&alice),
        Some(json!({ "content": "goodbye", "isPinned": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "goodbye");
    assert_eq!(updated["contentPreview"], "hello world");
    assert_eq!(updated["isPinned"], true);

    let (_, page) = send(&app, Method::GET, "/api/clips?favorite=true&search=GOOD", Some(&alice), None).await;
    assert_eq!(page["total"], 1);
    let (_, page) = send(&app, Method::GET, "/api/clips", Some(&bob), None).await;
    assert_eq!(page["total"], 0);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn legacy_sync_never_reports_conflicts() {
    let app = app();
    let token = token_for("user-1");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/clips/sync",
        Some(&token),
        Some(json!({ "deviceId": "  ", "clips": [{ "content": "one" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/clips/sync",
        Some(&token),
        Some(json!({ "deviceId": "old-client", "clips": [{ "content": "one" }, { "content": "two" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["synced"], 2);
    assert_eq!(body["conflicts"], json!([]));

    let (_, sync) = send(&app, Method::GET, "/api/sync/status?deviceId=old-client", Some(&token), None).await;
    assert_eq!(sync["totalClips"], 2);
    assert_eq!(sync["deviceId"], "old-client");
    let last = DateTime::parse_from_rfc3339(sync["lastSync"].as_str().unwrap()).unwrap();
    assert!(last.timestamp() > 0);

    let (_, cleared) = send(&app, Method::DELETE, "/api/clips", Some(&token), None).await;
    assert_eq!(cleared["deleted"], 2);
}

#[tokio::test]
async fn messages_validate_since_and_cap_pages() {
    let app = app();
    let token = token_for("user-1");

    let (status, body) = send(&app, Method::GET, "/api/messages/new?since=not-a-date", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, _) = send(&app, Method::GET, "/api/messages/new", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let messages: Vec<Value> = (0..3).map(|i| json!({ "body": format!("sms {}", i), "sender": "Bank" })).collect();
    let (status, pushed) = send(
        &app,
        Method::POST,
        "/api/messages/push",
        Some(&token),
        Some(json!({ "deviceId": "phone", "messages": messages })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pushed["synced"], 3);

    let (_, page) = send(&app, Method::GET, "/api/messages?pageSize=1000", Some(&token), None).await;
    assert_eq!(page["pageSize"], 100);
    assert_eq!(page["total"], 3);

    let (_, since) = send(
        &app,
        Method::GET,
        "/api/messages/new?since=2000-01-01T00:00:00Z",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(since["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn vault_lifecycle() {
    let app = app();
    let token = token_for("user-1");
    let secret = json!({ "encryptedPayload": "Y2lwaGVy", "nonce": "bm9uY2U=" });

    let (status, body) = send(&app, Method::POST, "/api/secure/clips", Some(&token), Some(secret.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (_, vault) = send(&app, Method::GET, "/api/secure/vault", Some(&token), None).await;
    assert_eq!(vault["exists"], false);

    let (status, created) = send(&app, Method::POST, "/api/secure/vault", Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["salt"].is_string());

    let (status, _) = send(&app, Method::POST, "/api/secure/vault", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, stored) = send(&app, Method::POST, "/api/secure/clips", Some(&token), Some(secret)).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/secure/clips/{}", stored["id"].as_str().unwrap());

    let (status, updated) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "encryptedPayload": "bmV3", "nonce": "bjI=" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["encryptedPayload"], "bmV3");

    let (_, list) = send(&app, Method::GET, "/api/secure/clips", Some(&token), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
