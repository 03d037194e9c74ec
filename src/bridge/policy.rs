//! Navigation policy for the embedded surface.
//!
//! Targets are parsed with [`url::Url`] and compared by scheme, host and port
//! rather than by string prefix, so `https://trusted.example.evil.test/` or
//! `https://trusted.example@evil.test/` never match the trusted origin.

use serde::Serialize;
use url::Url;

use crate::bridge::SurfaceKind;
use crate::config::{is_loopback_url, Config};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum NavigationDecision {
    Allow,
    Block { reason: String },
    /// The entry surface reached the auth-complete path. The host takes over
    /// and the surface must not render it.
    AuthComplete,
}

impl NavigationDecision {
    /// Whether the surface may go on and load the target.
    pub fn allows_load(&self) -> bool {
        matches!(self, NavigationDecision::Allow)
    }
}

#[derive(Debug, Clone)]
pub struct NavigationPolicy {
    trusted_origin: Url,
    auth_complete_path: String,
    allow_loopback: bool,
}

impl NavigationPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            trusted_origin: config.trusted_origin.clone(),
            auth_complete_path: config.auth_complete_path.clone(),
            allow_loopback: config.allow_loopback,
        }
    }

    pub fn evaluate(&self, surface: SurfaceKind, target: &str) -> NavigationDecision {
        let url = match Url::parse(target.trim()) {
            Ok(url) => url,
            Err(_) => {
                return NavigationDecision::Block {
                    reason: "unparseable navigation target".to_string(),
                }
            }
        };

        if self.is_trusted(&url) {
            if surface == SurfaceKind::Entry && url.path() == self.auth_complete_path {
                return NavigationDecision::AuthComplete;
            }
            return NavigationDecision::Allow;
        }

        if self.allow_loopback && is_dev_loopback(&url) {
            return NavigationDecision::Allow;
        }

        NavigationDecision::Block {
            reason: format!("{} is outside the trusted origin", origin_label(&url)),
        }
    }

    /// Same scheme, host and effective port as the trusted origin, with no
    /// embedded credentials.
    pub fn is_trusted(&self, url: &Url) -> bool {
        url.scheme() == self.trusted_origin.scheme()
            && url.host_str().is_some()
            && url.host_str() == self.trusted_origin.host_str()
            && url.port_or_known_default() == self.trusted_origin.port_or_known_default()
            && url.username().is_empty()
            && url.password().is_none()
    }
}

/// `http(s)://localhost:<port>` or `http(s)://127.0.0.1:<port>`. An explicit
/// port is required.
fn is_dev_loopback(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
        && is_loopback_url(url)
        && url.port().is_some()
        && url.username().is_empty()
        && url.password().is_none()
}

fn origin_label(url: &Url) -> String {
    match url.host_str() {
        Some(host) => format!("{}://{}", url.scheme(), host),
        None => format!("{}:", url.scheme()),
    }
}
