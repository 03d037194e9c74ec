use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::security::{is_valid_username, sanitize, USERNAME_MAX_LEN};

const TOKEN_MAX_LEN: usize = 4096;

/// `^[A-Za-z0-9_-]{3,20}$`, only constructible through validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn parse(s: &str) -> Result<Self> {
        if is_valid_username(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(AppError::Validation("Invalid username format".to_string()))
        }
    }

    /// Sanitize then gate. The allow-list check decides; sanitizing only
    /// trims the input down first.
    pub fn from_untrusted(raw: &str) -> Result<Self> {
        Self::parse(&sanitize(Some(raw), USERNAME_MAX_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(name: Username) -> Self {
        name.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Username and bearer token reported by the auth surface.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub token: String,
}

impl Credential {
    /// Accept an auth callback payload.
    ///
    /// The callback comes from the embedded surface, so its values are held to
    /// the same discipline as user input: the username must survive
    /// sanitizing unchanged and pass the allow-list, and the token must be
    /// visible ASCII with no whitespace.
    pub fn from_auth_callback(username: &str, token: &str) -> Result<Self> {
        let cleaned = sanitize(Some(username), USERNAME_MAX_LEN);
        if cleaned != username || !is_valid_username(&cleaned) {
            return Err(AppError::Validation("Invalid username format".to_string()));
        }
        if token.is_empty()
            || token.len() > TOKEN_MAX_LEN
            || !token.bytes().all(|b| b.is_ascii_graphic())
        {
            return Err(AppError::Validation("Invalid auth token".to_string()));
        }

        Ok(Self {
            username: cleaned,
            token: token.to_string(),
        })
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.token.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_from_untrusted_strips_then_gates() {
        let name = Username::from_untrusted("  <alice>  ").expect("Should accept");
        assert_eq!(name.as_str(), "alice");

        assert!(Username::from_untrusted("al").is_err());
        assert!(Username::from_untrusted("al ice").is_err());
    }

    #[test]
    fn test_auth_callback_accepts_clean_payload() {
        let cred = Credential::from_auth_callback("player_1", "abc.DEF-123").unwrap();
        assert_eq!(cred.username, "player_1");
        assert_eq!(cred.token, "abc.DEF-123");
        assert!(cred.is_complete());
    }

    #[test]
    fn test_auth_callback_rejects_username_the_sanitizer_would_change() {
        let err = Credential::from_auth_callback("<b>bob</b>", "tok").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_auth_callback_rejects_bad_tokens() {
        assert!(Credential::from_auth_callback("alice", "").is_err());
        assert!(Credential::from_auth_callback("alice", "has space").is_err());
        assert!(Credential::from_auth_callback("alice", "line\nbreak").is_err());
        assert!(Credential::from_auth_callback("alice", &"x".repeat(4097)).is_err());
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let cred = Credential::from_auth_callback("alice", "hunter2").unwrap();
        assert!(!format!("{:?}", cred).contains("hunter2"));
    }
}
