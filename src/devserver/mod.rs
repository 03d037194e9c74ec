//! Development room server.
//!
//! Serves the same room API the host talks to in production, backed by an
//! in-memory table, so the host can be exercised end to end on loopback.

pub mod health;
pub mod rooms;
pub mod store;

pub use store::{RateLimiter, RoomRecord, RoomStore};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;

const RATE_WINDOW: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the development server
#[derive(Clone)]
pub struct DevState {
    pub store: Arc<RoomStore>,
    pub limiter: Arc<RateLimiter>,
}

impl DevState {
    pub fn new(max_players: usize) -> Self {
        Self {
            store: Arc::new(RoomStore::new(max_players)),
            limiter: Arc::new(RateLimiter::new(RATE_WINDOW)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.dev_max_players as usize)
    }
}

/// Create the development router with all routes
pub fn create_router(state: DevState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/rooms", rooms::room_routes())
        .merge(health::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .with_state(state)
}
