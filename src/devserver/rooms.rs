use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::devserver::DevState;
use crate::error::DevApiError;
use crate::models::{
    CloseRoomRequest, CreateRoomRequest, JoinRoomRequest, RoomId, RoomStatusResponse, Username,
};
use crate::security::{sanitize, USERNAME_MAX_LEN};

const CREATE_LIMIT: usize = 5;
const JOIN_LIMIT: usize = 20;
// Sanitizer bound for incoming fields; the format check does the rejecting.
const FIELD_MAX_LEN: usize = 100;

type ApiResult<T> = std::result::Result<T, DevApiError>;

/// Room routes
pub fn room_routes() -> Router<DevState> {
    Router::new()
        .route("/create", post(create_room))
        .route("/join", post(join_room))
        .route("/{room_id}/status", get(room_status))
        .route("/{room_id}", delete(close_room))
}

/// `Authorization: Bearer <token>`, required on every mutating call.
fn bearer_token(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(DevApiError::Unauthorized)
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| DevApiError::BadRequest(format!("Malformed request body: {}", e.body_text())))
}

/// Sanitize, upper-case and gate the two fields every room call carries.
fn clean_fields(
    room_id: &str,
    username: &str,
    username_message: &str,
    room_id_message: &str,
) -> ApiResult<(RoomId, Username)> {
    let room_id = sanitize(Some(room_id), FIELD_MAX_LEN).to_ascii_uppercase();
    let username = sanitize(Some(username), FIELD_MAX_LEN);

    if room_id.is_empty() || username.is_empty() {
        return Err(DevApiError::BadRequest(
            "Room ID and username required".to_string(),
        ));
    }

    let username = Username::parse(&username)
        .map_err(|_| DevApiError::BadRequest(username_message.to_string()))?;
    let room_id = RoomId::parse(&room_id)
        .map_err(|_| DevApiError::BadRequest(room_id_message.to_string()))?;
    Ok((room_id, username))
}

/// POST /rooms/create
async fn create_room(
    State(state): State<DevState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CreateRoomRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let token = bearer_token(&headers)?;
    if !state.limiter.check(&format!("create:{}", token), CREATE_LIMIT) {
        return Err(DevApiError::RateLimited(
            "Too many room creation attempts. Try again later.".to_string(),
        ));
    }

    let request = body(payload)?;
    let (room_id, username) = clean_fields(
        &request.room_id,
        &request.username,
        "Invalid username format (3-20 alphanumeric characters)",
        "Room ID must be 4 uppercase letters (A-Z)",
    )?;

    let room = state.store.create_room(room_id, username)?;

    Ok(Json(json!({
        "success": true,
        "roomId": room.id,
        "host": room.host,
        "message": "Room created successfully",
    })))
}

/// POST /rooms/join
async fn join_room(
    State(state): State<DevState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<JoinRoomRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let token = bearer_token(&headers)?;
    if !state.limiter.check(&format!("join:{}", token), JOIN_LIMIT) {
        return Err(DevApiError::RateLimited(
            "Too many join attempts. Try again later.".to_string(),
        ));
    }

    let request = body(payload)?;
    let (room_id, username) = clean_fields(
        &request.room_id,
        &request.username,
        "Invalid username format",
        "Invalid room ID format",
    )?;

    let room = state.store.join_room(&room_id, username)?;

    Ok(Json(json!({
        "success": true,
        "roomId": room.id,
        "host": room.host,
        "players": room.players,
        "message": "Joined room successfully",
    })))
}

/// GET /rooms/{room_id}/status
async fn room_status(
    State(state): State<DevState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RoomStatusResponse>> {
    let room = state
        .store
        .get_room(&room_id)
        .ok_or_else(|| DevApiError::NotFound("Room not found".to_string()))?;

    Ok(Json(RoomStatusResponse {
        success: true,
        room: Some(room.status()),
        message: None,
    }))
}

/// DELETE /rooms/{room_id} - host only
async fn close_room(
    State(state): State<DevState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CloseRoomRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    bearer_token(&headers)?;
    let request = body(payload)?;
    let username = sanitize(Some(&request.username), USERNAME_MAX_LEN);

    state.store.close_room(&room_id, &username)?;

    Ok(Json(json!({
        "success": true,
        "message": "Room closed successfully",
    })))
}
