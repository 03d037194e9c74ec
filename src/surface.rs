//! The embedded content surface, as seen from the host.
//!
//! Rendering is somebody else's job; the host only tells the surface what to
//! load and what to run after a load. Whatever implements this trait must
//! report navigation attempts and page loads back through the
//! [`SessionHandle`](crate::session::SessionHandle) so policy is applied.

use url::Url;

pub trait ContentSurface: Send {
    fn load_url(&mut self, url: &Url);
    fn evaluate_script(&mut self, script: &str);
    /// Tear the surface down. Later callbacks from it are stale.
    fn close(&mut self);
}

/// Headless surface that only logs what it is asked to do.
#[derive(Debug, Default)]
pub struct LoggingSurface;

impl ContentSurface for LoggingSurface {
    fn load_url(&mut self, url: &Url) {
        tracing::info!(url = %url, "Surface load");
    }

    fn evaluate_script(&mut self, script: &str) {
        tracing::debug!(bytes = script.len(), "Surface script evaluated");
    }

    fn close(&mut self) {
        tracing::info!("Surface closed");
    }
}
