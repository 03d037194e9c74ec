//! Script text injected into the surface's global context.
//!
//! Values are concatenated into executable script, so each one goes through
//! its own minimal allow-list right here, whatever validation happened
//! upstream. None of the allowed characters can close a quoted literal.

use uuid::Uuid;

use crate::models::RoomSession;

/// `A`-`Z` only.
pub fn filter_room_id(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_uppercase()).collect()
}

/// `[A-Za-z0-9_-]` only.
pub fn filter_username(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// `[A-Za-z0-9]` only.
pub fn filter_token(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Lower-case hex and `-`, the hyphenated uuid alphabet.
fn filter_bridge_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit() || ('a'..='f').contains(c) || *c == '-')
        .collect()
}

/// Globals for a room page.
pub fn room_script(session: &RoomSession, bridge_port: u16, bridge_key: Uuid) -> String {
    format!(
        "window.ROOM_ID='{}'; window.USERNAME='{}'; window.IS_HOST={}; window.TOKEN='{}'; {}",
        filter_room_id(session.room_id().as_str()),
        filter_username(session.username().as_str()),
        session.is_host(),
        filter_token(session.token()),
        bridge_globals(bridge_port, bridge_key),
    )
}

/// Globals for the entry (auth) page: just enough to reach the bridge.
pub fn entry_script(bridge_port: u16, bridge_key: Uuid) -> String {
    bridge_globals(bridge_port, bridge_key)
}

fn bridge_globals(bridge_port: u16, bridge_key: Uuid) -> String {
    format!(
        "window.BRIDGE_PORT={}; window.BRIDGE_KEY='{}';",
        bridge_port,
        filter_bridge_key(&bridge_key.hyphenated().to_string()),
    )
}
