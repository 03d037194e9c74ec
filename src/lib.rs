pub mod api;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod devserver;
pub mod error;
pub mod logging;
pub mod models;
pub mod security;
pub mod session;
pub mod state;
pub mod surface;

pub use api::RoomApiClient;
pub use bridge::ContentBridge;
pub use config::Config;
pub use error::{AppError, Result};
pub use session::{SessionDriver, SessionHandle, SessionStateMachine};
pub use state::AppState;
