//! The narrow channel between the host and the embedded content surface.
//!
//! Three concerns live here:
//! - what the host injects into the surface after a page loads ([`inject`]),
//! - which content → host messages are honoured ([`messages`]), default-deny,
//! - where the surface may navigate ([`policy`]).
//!
//! Each surface load gets a fresh bridge key. Messages carrying an older key
//! belong to a surface that no longer exists and are refused.

pub mod connections;
pub mod handler;
pub mod inject;
pub mod messages;
pub mod policy;

pub use connections::{BridgeConnections, ConnectionHandle};
pub use handler::bridge_routes;
pub use messages::{Capability, ContentMessage, HostMessage};
pub use policy::{NavigationDecision, NavigationPolicy};

use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::RoomSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// The unauthenticated auth page.
    Entry,
    /// A room-scoped content page.
    Room,
}

impl SurfaceKind {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            SurfaceKind::Entry => &[Capability::AuthSuccess],
            SurfaceKind::Room => &[Capability::GameEvent, Capability::LeaveRoom],
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveSurface {
    kind: SurfaceKind,
    key: Uuid,
    /// The page this surface was opened on. Only that page gets the script.
    page: Url,
    session: Option<RoomSession>,
}

pub struct ContentBridge {
    policy: NavigationPolicy,
    auth_page: Url,
    room_page: Url,
    bridge_port: u16,
    active: Option<ActiveSurface>,
}

impl ContentBridge {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            policy: NavigationPolicy::new(config),
            auth_page: config.auth_page_url()?,
            room_page: config.room_page_url()?,
            bridge_port: config.bridge_port,
            active: None,
        })
    }

    pub fn active_kind(&self) -> Option<SurfaceKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    pub fn active_key(&self) -> Option<Uuid> {
        self.active.as_ref().map(|a| a.key)
    }

    pub fn is_active_key(&self, key: Uuid) -> bool {
        self.active_key() == Some(key)
    }

    /// Start an entry surface and return the auth page to load.
    pub fn open_entry(&mut self) -> Url {
        self.active = Some(ActiveSurface {
            kind: SurfaceKind::Entry,
            key: Uuid::new_v4(),
            page: self.auth_page.clone(),
            session: None,
        });
        self.auth_page.clone()
    }

    /// Start a room surface for `session` and return the room page to load.
    ///
    /// Query values come from the validated session types, never from raw
    /// input.
    pub fn open_room(&mut self, session: RoomSession) -> Url {
        let mut url = self.room_page.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("room", session.room_id().as_str())
            .append_pair("username", session.username().as_str())
            .append_pair("host", if session.is_host() { "true" } else { "false" });

        self.active = Some(ActiveSurface {
            kind: SurfaceKind::Room,
            key: Uuid::new_v4(),
            page: self.room_page.clone(),
            session: Some(session),
        });
        url
    }

    pub fn close(&mut self) {
        self.active = None;
    }

    /// Decide a navigation attempt from the active surface. With no surface
    /// open every navigation is blocked.
    pub fn evaluate_navigation(&self, target: &str) -> NavigationDecision {
        match self.active_kind() {
            Some(kind) => self.policy.evaluate(kind, target),
            None => NavigationDecision::Block {
                reason: "no content surface is open".to_string(),
            },
        }
    }

    /// Script to run once `loaded_url` finished loading, if any.
    ///
    /// Only the page the surface was opened on qualifies: the trusted origin
    /// and the same path. Other pages the navigation policy lets through,
    /// loopback included, get nothing.
    pub fn injection_script(&self, loaded_url: &str) -> Option<String> {
        let active = self.active.as_ref()?;
        let url = Url::parse(loaded_url).ok()?;
        if !self.policy.is_trusted(&url) || url.path() != active.page.path() {
            tracing::warn!(url = %loaded_url, "Refusing to inject outside the surface page");
            return None;
        }

        match (&active.kind, &active.session) {
            (SurfaceKind::Room, Some(session)) => {
                Some(inject::room_script(session, self.bridge_port, active.key))
            }
            (SurfaceKind::Entry, _) => Some(inject::entry_script(self.bridge_port, active.key)),
            (SurfaceKind::Room, None) => None,
        }
    }

    /// Default-deny check for a content → host message.
    pub fn authorize(&self, key: Uuid, message: &ContentMessage) -> Result<SurfaceKind> {
        let active = self
            .active
            .as_ref()
            .filter(|a| a.key == key)
            .ok_or_else(|| {
                AppError::BridgeViolation("Message from an inactive surface".to_string())
            })?;

        let capability = message.capability();
        if !active.kind.capabilities().contains(&capability) {
            return Err(AppError::BridgeViolation(format!(
                "{:?} is not available on this page",
                capability
            )));
        }

        Ok(active.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoomId, Username};

    fn bridge() -> ContentBridge {
        let config = Config::from_lookup(|_| None).unwrap();
        ContentBridge::new(&config).unwrap()
    }

    fn session(is_host: bool) -> RoomSession {
        RoomSession::new(
            RoomId::parse("QXRT").unwrap(),
            Username::parse("alice").unwrap(),
            "tok123".to_string(),
            is_host,
        )
    }

    #[test]
    fn test_open_room_builds_query_from_session() {
        let mut bridge = bridge();
        let url = bridge.open_room(session(true));
        assert_eq!(
            url.as_str(),
            "https://roomhost.app/index.html?room=QXRT&username=alice&host=true"
        );
        assert_eq!(bridge.active_kind(), Some(SurfaceKind::Room));
    }

    #[test]
    fn test_each_surface_gets_a_new_key() {
        let mut bridge = bridge();
        bridge.open_entry();
        let first = bridge.active_key().unwrap();
        bridge.open_room(session(false));
        let second = bridge.active_key().unwrap();
        assert_ne!(first, second);
        assert!(!bridge.is_active_key(first));
    }

    #[test]
    fn test_injection_only_into_permitted_pages() {
        let mut bridge = bridge();
        bridge.open_room(session(true));

        let script = bridge
            .injection_script("https://roomhost.app/index.html?room=QXRT")
            .expect("Should inject into trusted page");
        assert!(script.contains("window.ROOM_ID='QXRT';"));

        assert!(bridge.injection_script("https://evil.example/").is_none());
    }

    #[test]
    fn test_no_injection_into_other_allowed_pages() {
        let mut bridge = bridge();
        bridge.open_room(session(true));

        // Loopback navigation is allowed, but the page is not the room page.
        assert!(bridge
            .evaluate_navigation("http://localhost:5555/anything")
            .allows_load());
        assert!(bridge
            .injection_script("http://localhost:5555/anything")
            .is_none());
        assert!(bridge
            .injection_script("http://127.0.0.1:5555/index.html?room=QXRT")
            .is_none());

        // Same origin, different page.
        assert!(bridge
            .injection_script("https://roomhost.app/index.com.html")
            .is_none());
        assert!(bridge
            .injection_script("https://user@roomhost.app/index.html")
            .is_none());
    }

    #[test]
    fn test_entry_script_only_on_auth_page() {
        let mut bridge = bridge();
        bridge.open_entry();
        assert!(bridge
            .injection_script("https://roomhost.app/index.html")
            .is_none());
        assert!(bridge
            .injection_script("http://localhost:5555/index.com.html")
            .is_none());
    }

    #[test]
    fn test_entry_injection_has_no_session_values() {
        let mut bridge = bridge();
        bridge.open_entry();
        let script = bridge
            .injection_script("https://roomhost.app/index.com.html")
            .unwrap();
        assert!(!script.contains("TOKEN"));
        assert!(script.contains("BRIDGE_KEY"));
    }

    #[test]
    fn test_authorize_is_default_deny() {
        let mut bridge = bridge();
        bridge.open_room(session(false));
        let key = bridge.active_key().unwrap();

        assert!(bridge.authorize(key, &ContentMessage::LeaveRoom).is_ok());
        let auth = ContentMessage::AuthSuccess {
            username: "mallory".to_string(),
            token: "t".to_string(),
        };
        assert!(matches!(
            bridge.authorize(key, &auth),
            Err(AppError::BridgeViolation(_))
        ));
        assert!(matches!(
            bridge.authorize(Uuid::new_v4(), &ContentMessage::LeaveRoom),
            Err(AppError::BridgeViolation(_))
        ));
    }

    #[test]
    fn test_entry_surface_cannot_leave_room() {
        let mut bridge = bridge();
        bridge.open_entry();
        let key = bridge.active_key().unwrap();
        assert!(bridge.authorize(key, &ContentMessage::LeaveRoom).is_err());
    }

    #[test]
    fn test_navigation_blocked_when_closed() {
        let mut bridge = bridge();
        bridge.open_entry();
        bridge.close();
        assert!(!bridge
            .evaluate_navigation("https://roomhost.app/index.com.html")
            .allows_load());
    }
}
