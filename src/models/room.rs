use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Username;
use crate::security::is_valid_room_id;

/// Four upper-case ASCII letters. Only constructible through validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(s: &str) -> Result<Self> {
        if is_valid_room_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(AppError::Validation(
                "Room ID must be exactly 4 uppercase letters (A-Z)".to_string(),
            ))
        }
    }

    /// Caller guarantees `s` already satisfies [`is_valid_room_id`].
    pub(crate) fn new_unchecked(s: String) -> Self {
        debug_assert!(is_valid_room_id(&s));
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A room the user is currently in.
///
/// Built once from a successful create/join reply and never mutated; entering
/// another room builds a new one.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomSession {
    room_id: RoomId,
    username: Username,
    token: String,
    is_host: bool,
}

impl RoomSession {
    pub fn new(room_id: RoomId, username: Username, token: String, is_host: bool) -> Self {
        Self {
            room_id,
            username,
            token,
            is_host,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }
}

impl fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomSession")
            .field("room_id", &self.room_id)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("is_host", &self.is_host)
            .finish()
    }
}

/// Reply envelope shared by every room endpoint.
///
/// `room_id` is kept as the raw server string; consumers re-validate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn ok(room_id: &RoomId, message: &str) -> Self {
        Self {
            success: true,
            room_id: Some(room_id.to_string()),
            message: Some(message.to_string()),
        }
    }
}

/// POST /rooms/create body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub host: bool,
}

/// POST /rooms/join body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub username: String,
}

/// DELETE /rooms/{room_id} body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRoomRequest {
    #[serde(default)]
    pub username: String,
}

/// Room details returned by GET /rooms/{room_id}/status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub id: String,
    pub host: String,
    pub players: Vec<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStatusResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
