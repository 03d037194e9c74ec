use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    ApiResponse, CloseRoomRequest, CreateRoomRequest, JoinRoomRequest, RoomStatus,
    RoomStatusResponse,
};
use crate::security::{is_valid_room_id, is_valid_username};

/// Typed client for the room API.
///
/// This is the last gate before network egress: every call re-checks its
/// inputs against the strict validators and refuses to send otherwise. Calls
/// are never retried here; a retried create could claim a second room.
#[derive(Clone)]
pub struct RoomApiClient {
    client: Client,
    base: Url,
}

impl RoomApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base(config.api_base.clone(), config.api_timeout)
    }

    pub fn with_base(base: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// POST /rooms/create - claims `room_id` with the caller as host.
    pub async fn create_room(
        &self,
        token: &str,
        room_id: &str,
        username: &str,
    ) -> Result<ApiResponse> {
        check_preconditions(token, room_id, username)?;

        let body = CreateRoomRequest {
            room_id: room_id.to_string(),
            username: username.to_string(),
            host: true,
        };

        tracing::debug!(room_id = %room_id, username = %username, "Creating room");
        let reply = self.post_envelope("/rooms/create", token, &body).await?;

        // The created room id is echoed back and is authoritative.
        match reply.room_id.as_deref() {
            Some(id) if is_valid_room_id(id) => Ok(reply),
            Some(id) => Err(AppError::Protocol(format!(
                "server returned malformed room id {:?}",
                id
            ))),
            None => Err(AppError::Protocol(
                "create reply is missing roomId".to_string(),
            )),
        }
    }

    /// POST /rooms/join
    pub async fn join_room(
        &self,
        token: &str,
        room_id: &str,
        username: &str,
    ) -> Result<ApiResponse> {
        check_preconditions(token, room_id, username)?;

        let body = JoinRoomRequest {
            room_id: room_id.to_string(),
            username: username.to_string(),
        };

        tracing::debug!(room_id = %room_id, username = %username, "Joining room");
        let reply = self.post_envelope("/rooms/join", token, &body).await?;

        if let Some(id) = reply.room_id.as_deref() {
            if !is_valid_room_id(id) {
                return Err(AppError::Protocol(format!(
                    "server returned malformed room id {:?}",
                    id
                )));
            }
        }

        Ok(reply)
    }

    /// GET /rooms/{room_id}/status
    pub async fn room_status(&self, room_id: &str) -> Result<RoomStatus> {
        if !is_valid_room_id(room_id) {
            return Err(AppError::InvalidInput(format!(
                "room id {:?} is not 4 uppercase letters",
                room_id
            )));
        }

        let response = self
            .client
            .get(self.endpoint(&format!("/rooms/{}/status", room_id)))
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let reply: RoomStatusResponse = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Protocol(format!("unparseable reply (HTTP {}): {}", status.as_u16(), e))
        })?;
        if !reply.success {
            return Err(AppError::RoomRejected(rejection_message(reply.message, status)));
        }

        reply
            .room
            .ok_or_else(|| AppError::Protocol("status reply is missing room".to_string()))
    }

    /// DELETE /rooms/{room_id} - only the host may close a room.
    pub async fn close_room(
        &self,
        token: &str,
        room_id: &str,
        username: &str,
    ) -> Result<ApiResponse> {
        check_preconditions(token, room_id, username)?;

        let body = CloseRoomRequest {
            username: username.to_string(),
        };
        let response = self
            .client
            .delete(self.endpoint(&format!("/rooms/{}", room_id)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        tracing::debug!(room_id = %room_id, status = %status, "Close room reply");
        parse_envelope(status, &bytes)
    }

    async fn post_envelope<B: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<ApiResponse> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        parse_envelope(status, &bytes)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }
}

fn check_preconditions(token: &str, room_id: &str, username: &str) -> Result<()> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(AppError::InvalidInput(
            "bearer token is missing or malformed".to_string(),
        ));
    }
    if !is_valid_room_id(room_id) {
        return Err(AppError::InvalidInput(format!(
            "room id {:?} is not 4 uppercase letters",
            room_id
        )));
    }
    if !is_valid_username(username) {
        return Err(AppError::InvalidInput(format!(
            "username {:?} fails the allow-list",
            username
        )));
    }
    Ok(())
}

/// Interpret a reply body. Error statuses still carry the JSON envelope, so
/// the body decides, not the status code.
fn parse_envelope(status: StatusCode, bytes: &[u8]) -> Result<ApiResponse> {
    let reply: ApiResponse = serde_json::from_slice(bytes).map_err(|e| {
        AppError::Protocol(format!("unparseable reply (HTTP {}): {}", status.as_u16(), e))
    })?;

    if !reply.success {
        return Err(AppError::RoomRejected(rejection_message(
            reply.message,
            status,
        )));
    }

    if !status.is_success() {
        return Err(AppError::Protocol(format!(
            "success envelope with HTTP {}",
            status.as_u16()
        )));
    }

    Ok(reply)
}

fn rejection_message(message: Option<String>, status: StatusCode) -> String {
    message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("Request rejected (HTTP {})", status.as_u16()))
}
