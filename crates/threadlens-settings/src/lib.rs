//! # threadlens-settings
//!
//! Layered configuration for the threadlens client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`Settings::default()`]
//! 2. **User file** — `~/.threadlens/settings.json` (merged over defaults)
//! 3. **Environment variables** — `THREADLENS_*` overrides (highest priority)
//!
//! The file is plain JSON with optional sections; unknown keys are ignored
//! so older files keep working across upgrades.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings load failures.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file exists but could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Settings file is not valid JSON.
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Backend endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// WebSocket query endpoint.
    pub ws_url: String,
    /// HTTP API base (history listing lives under it).
    pub api_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/ws/query".into(),
            api_url: "http://localhost:8000".into(),
        }
    }
}

/// Credential settings. The token is treated opaquely; issuance is the
/// sign-in flow's concern, not ours.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Bearer credential for the WebSocket URI and history endpoint.
    pub token: Option<String>,
}

/// Default query parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Default post limit.
    pub limit: u8,
    /// Default sort order.
    pub sort_order: String,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            limit: 10,
            sort_order: "hot".into(),
        }
    }
}

/// Controller feature toggles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Whether per-comment progress items are narrated into the transcript.
    pub emit_progress: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            emit_progress: true,
        }
    }
}

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend endpoints.
    pub server: ServerSettings,
    /// Credential settings.
    pub auth: AuthSettings,
    /// Default query parameters.
    pub query: QuerySettings,
    /// Controller feature toggles.
    pub client: ClientSettings,
}

/// Default settings file path: `~/.threadlens/settings.json`.
#[must_use]
pub fn settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".threadlens").join("settings.json"))
}

/// Load settings: defaults, then the user file (if present), then env
/// overrides from the process environment.
///
/// A missing file is not an error; an unreadable or unparseable one is.
pub fn load_settings() -> Result<Settings> {
    let mut settings = match settings_path() {
        Some(path) if path.exists() => load_file(&path)?,
        _ => Settings::default(),
    };
    apply_env_overrides(&mut settings, std::env::vars());
    Ok(settings)
}

/// Load settings from a specific file path, then apply env overrides.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings, std::env::vars());
    Ok(settings)
}

fn load_file(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Apply `THREADLENS_*` overrides from a key/value source, usually
/// `std::env::vars()`. Unknown keys and non-numeric limits are ignored.
pub fn apply_env_overrides<I>(settings: &mut Settings, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            "THREADLENS_WS_URL" => settings.server.ws_url = value,
            "THREADLENS_API_URL" => settings.server.api_url = value,
            "THREADLENS_TOKEN" => settings.auth.token = Some(value),
            "THREADLENS_LIMIT" => match value.parse() {
                Ok(limit) => settings.query.limit = limit,
                Err(_) => tracing::warn!(%value, "ignoring non-numeric THREADLENS_LIMIT"),
            },
            "THREADLENS_SORT_ORDER" => settings.query.sort_order = value,
            "THREADLENS_EMIT_PROGRESS" => {
                settings.client.emit_progress = matches!(value.as_str(), "1" | "true" | "yes");
            }
            _ => {}
        }
    }
}
