use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

const DEFAULT_API_BASE: &str = "https://api.roomhost.app";
const DEFAULT_TRUSTED_ORIGIN: &str = "https://roomhost.app";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the room API. Requests go to `{api_base}/rooms/...`.
    pub api_base: Url,
    /// The single origin the embedded surface may render.
    pub trusted_origin: Url,
    pub auth_page_path: String,
    pub auth_complete_path: String,
    pub room_page_path: String,
    /// Permit `http://localhost:*` and `http://127.0.0.1:*` navigation.
    pub allow_loopback: bool,
    pub api_timeout: Duration,
    pub credentials_path: PathBuf,
    pub bridge_port: u16,
    pub dev_server_host: String,
    pub dev_server_port: u16,
    pub dev_max_players: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Missing keys fall
    /// back to defaults; present keys must parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_base = parse_url("ROOMHOST_API_BASE", &var("ROOMHOST_API_BASE", DEFAULT_API_BASE))?;
        let trusted_origin = parse_url(
            "ROOMHOST_TRUSTED_ORIGIN",
            &var("ROOMHOST_TRUSTED_ORIGIN", DEFAULT_TRUSTED_ORIGIN),
        )?;
        if trusted_origin.scheme() != "https" && !is_loopback_url(&trusted_origin) {
            return Err(ConfigError::InsecureOrigin(trusted_origin.to_string()));
        }

        let config = Config {
            api_base,
            trusted_origin,
            auth_page_path: parse_path(
                "ROOMHOST_AUTH_PAGE",
                var("ROOMHOST_AUTH_PAGE", "/index.com.html"),
            )?,
            auth_complete_path: parse_path(
                "ROOMHOST_AUTH_COMPLETE_PATH",
                var("ROOMHOST_AUTH_COMPLETE_PATH", "/index.html"),
            )?,
            room_page_path: parse_path("ROOMHOST_ROOM_PAGE", var("ROOMHOST_ROOM_PAGE", "/index.html"))?,
            allow_loopback: var("ROOMHOST_ALLOW_LOOPBACK", "true")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ROOMHOST_ALLOW_LOOPBACK"))?,
            api_timeout: Duration::from_millis(
                var("ROOMHOST_API_TIMEOUT_MS", "10000")
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("ROOMHOST_API_TIMEOUT_MS"))?,
            ),
            credentials_path: PathBuf::from(var(
                "ROOMHOST_CREDENTIALS_PATH",
                "./roomhost-credentials.json",
            )),
            bridge_port: var("ROOMHOST_BRIDGE_PORT", "47821")
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            dev_server_host: var("DEV_SERVER_HOST", "127.0.0.1"),
            dev_server_port: var("DEV_SERVER_PORT", "8787")
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            dev_max_players: var("DEV_MAX_PLAYERS", "8")
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DEV_MAX_PLAYERS"))?,
        };

        Ok(config)
    }

    pub fn dev_server_addr(&self) -> String {
        format!("{}:{}", self.dev_server_host, self.dev_server_port)
    }

    pub fn auth_page_url(&self) -> Result<Url, ConfigError> {
        self.trusted_origin
            .join(&self.auth_page_path)
            .map_err(|e| ConfigError::InvalidUrl("ROOMHOST_AUTH_PAGE", e.to_string()))
    }

    pub fn room_page_url(&self) -> Result<Url, ConfigError> {
        self.trusted_origin
            .join(&self.room_page_path)
            .map_err(|e| ConfigError::InvalidUrl("ROOMHOST_ROOM_PAGE", e.to_string()))
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl(key, e.to_string()))?;
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(key, "missing host".to_string()));
    }
    Ok(url)
}

fn parse_path(key: &'static str, raw: String) -> Result<String, ConfigError> {
    if !raw.starts_with('/') || raw.starts_with("//") || raw.contains("://") {
        return Err(ConfigError::InvalidValue(key));
    }
    Ok(raw)
}

pub(crate) fn is_loopback_url(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port")]
    InvalidPort,
    #[error("{0} is not a valid URL: {1}")]
    InvalidUrl(&'static str, String),
    #[error("Trusted origin must use https: {0}")]
    InsecureOrigin(String),
    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}
