use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use huddle_api::{RoomService, router};
use huddle_crypto::hash_password;

fn app() -> Router {
    router(RoomService::in_memory().unwrap())
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_room(app: &Router, owner: Uuid) -> Uuid {
    let (status, room) = call(
        app,
        "POST",
        "/rooms",
        Some(json!({
            "name": "Test",
            "password_hash": hash_password("abcd"),
            "owner_id": owner,
            "display_name": "A",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    room["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_join_and_list_members() {
    let app = app();
    let room_id = create_room(&app, Uuid::new_v4()).await;

    let (status, room) = call(
        &app,
        "POST",
        &format!("/rooms/{room_id}/join"),
        Some(json!({
            "password_hash": hash_password("abcd"),
            "user_id": Uuid::new_v4(),
            "display_name": "B",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["name"], "Test");

    let (status, members) = call(&app, "GET", &format!("/rooms/{room_id}/members"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(members.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn join_errors_map_to_statuses() {
    let app = app();
    let room_id = create_room(&app, Uuid::new_v4()).await;
    let join = |hash: String| {
        json!({ "password_hash": hash, "user_id": Uuid::new_v4(), "display_name": "B" })
    };

    let (status, body) = call(
        &app,
        "POST",
        &format!("/rooms/{room_id}/join"),
        Some(join(hash_password("nope"))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Incorrect password");

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rooms/{}/join", Uuid::new_v4()),
        Some(join(hash_password("abcd"))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn messages_round_trip_through_the_api() {
    let app = app();
    let owner = Uuid::new_v4();
    let room_id = create_room(&app, owner).await;
    let uri = format!("/rooms/{room_id}/messages");

    for content in ["one", "two", "three"] {
        let (status, _) = call(
            &app,
            "POST",
            &uri,
            Some(json!({ "user_id": owner, "display_name": "A", "content": content })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, messages) = call(&app, "GET", &format!("{uri}?limit=2"), None).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["two", "three"]);
}

#[tokio::test]
async fn blank_message_is_bad_request() {
    let app = app();
    let owner = Uuid::new_v4();
    let room_id = create_room(&app, owner).await;

    let (status, _) = call(
        &app,
        "POST",
        &format!("/rooms/{room_id}/messages"),
        Some(json!({ "user_id": owner, "display_name": "A", "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn leave_removes_room_from_user_list() {
    let app = app();
    let owner = Uuid::new_v4();
    let room_id = create_room(&app, owner).await;

    let (_, rooms) = call(&app, "GET", &format!("/users/{owner}/rooms"), None).await;
    assert_eq!(rooms[0]["member_count"], 1);

    let (status, _) = call(&app, "DELETE", &format!("/rooms/{room_id}/members/{owner}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, rooms) = call(&app, "GET", &format!("/users/{owner}/rooms"), None).await;
    assert_eq!(rooms, json!([]));
}
