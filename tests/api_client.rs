mod common;

use std::time::Duration;

use axum::{http::StatusCode, routing::post, Router};
use pretty_assertions::assert_eq;

use roomhost::security::generate_room_code;
use roomhost::{AppError, RoomApiClient};

#[tokio::test]
async fn test_create_with_generated_code() {
    let (base, state) = common::spawn_dev_server().await;
    let client = common::client(base);

    let code = generate_room_code();
    let reply = client
        .create_room("tok123", code.as_str(), "alice")
        .await
        .expect("Should create room");

    assert!(reply.success);
    assert_eq!(reply.room_id.as_deref(), Some(code.as_str()));
    let room = state.store.get_room(code.as_str()).unwrap();
    assert_eq!(room.host.as_str(), "alice");
}

#[tokio::test]
async fn test_duplicate_create_is_rejected_with_server_message() {
    let (base, _) = common::spawn_dev_server().await;
    let client = common::client(base);

    client.create_room("tok123", "ABCD", "alice").await.unwrap();
    let err = client
        .create_room("tok123", "ABCD", "alice")
        .await
        .unwrap_err();

    match err {
        AppError::RoomRejected(message) => {
            assert_eq!(message, "Room ID already exists. Try another code.")
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_join_missing_room_surfaces_message() {
    let (base, _) = common::spawn_dev_server().await;
    let client = common::client(base);

    let err = client.join_room("tok123", "ZZZZ", "bob").await.unwrap_err();
    assert_eq!(
        err.user_message(),
        "Room not found. Check the code and try again."
    );
}

#[tokio::test]
async fn test_join_then_status_then_close() {
    let (base, _) = common::spawn_dev_server().await;
    let client = common::client(base);

    client.create_room("tok-a", "QXRT", "alice").await.unwrap();
    let reply = client.join_room("tok-b", "QXRT", "bob").await.unwrap();
    assert_eq!(reply.room_id.as_deref(), Some("QXRT"));

    let status = client.room_status("QXRT").await.unwrap();
    assert_eq!(status.players, vec!["alice".to_string(), "bob".to_string()]);
    assert_eq!(status.status, "active");

    let err = client.close_room("tok-b", "QXRT", "bob").await.unwrap_err();
    assert_eq!(err.user_message(), "Only the host can close the room");

    client.close_room("tok-a", "QXRT", "alice").await.unwrap();
    let err = client.room_status("QXRT").await.unwrap_err();
    assert!(matches!(err, AppError::RoomRejected(_)));
}

#[tokio::test]
async fn test_non_json_reply_is_protocol_error() {
    let router = Router::new().route(
        "/rooms/join",
        post(|| async { (StatusCode::BAD_GATEWAY, "<html>upstream down</html>") }),
    );
    let client = common::client(common::serve(router).await);

    let err = client.join_room("tok", "ABCD", "bob").await.unwrap_err();
    assert!(matches!(err, AppError::Protocol(_)));
    assert_eq!(err.user_message(), "Unexpected reply from the room server");
}

#[tokio::test]
async fn test_create_reply_without_room_id_is_protocol_error() {
    let router = Router::new().route(
        "/rooms/create",
        post(|| async { axum::Json(serde_json::json!({"success": true})) }),
    );
    let client = common::client(common::serve(router).await);

    let err = client.create_room("tok", "ABCD", "alice").await.unwrap_err();
    assert!(matches!(err, AppError::Protocol(_)));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let router = Router::new().route(
        "/rooms/join",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "{}"
        }),
    );
    let base = common::serve(router).await;
    let client = RoomApiClient::with_base(base, Duration::from_millis(200)).unwrap();

    let err = client.join_room("tok", "ABCD", "bob").await.unwrap_err();
    assert!(matches!(err, AppError::Transport(_)));
}

#[tokio::test]
async fn test_nothing_listening_is_transport_error() {
    let client = common::client(url::Url::parse("http://127.0.0.1:9").unwrap());
    let err = client.join_room("tok", "ABCD", "bob").await.unwrap_err();
    assert!(matches!(err, AppError::Transport(_)));
}
