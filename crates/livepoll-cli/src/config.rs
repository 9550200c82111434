// Configuration loading and parsing (config/livepoll.toml plus environment
// overrides).

use std::path::{Path, PathBuf};

use livepoll_app::registry::SessionLimits;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

const CONFIG_FILE: &str = "livepoll.toml";
pub const API_URL_ENV: &str = "LIVEPOLL_API_URL";
pub const WEBSOCKET_URL_ENV: &str = "LIVEPOLL_WEBSOCKET_URL";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub websocket_url: Url,
    pub limits: SessionLimits,
}

// ---------------------------------------------------------------------------
// Raw TOML structure
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConfigFile {
    backend: BackendSection,
    #[serde(default)]
    session: SessionSection,
}

#[derive(Debug, Deserialize)]
struct BackendSection {
    api_url: String,
    websocket_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionSection {
    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        SessionSection {
            queue_capacity: default_queue_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    SessionLimits::default().queue_capacity
}

fn default_event_capacity() -> usize {
    SessionLimits::default().event_capacity
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/livepoll.toml` relative to `base_dir`, applying
/// overrides from `env`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub(crate) fn load_config_from(
    base_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let mut file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    if let Some(url) = env(API_URL_ENV) {
        file.backend.api_url = url;
    }
    if let Some(url) = env(WEBSOCKET_URL_ENV) {
        file.backend.websocket_url = url;
    }

    validate(file)
}

/// Create `config/livepoll.toml` from `defaults/livepoll.toml` when it is
/// missing. Returns the path written, or `None` when the config file already
/// existed. An existing file is never touched.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.is_file() {
        return Ok(None);
    }

    let template = base_dir.join("defaults").join(CONFIG_FILE);
    if !template.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither config/{CONFIG_FILE} nor defaults/{CONFIG_FILE} found in {}; \
                 run from the workspace root",
                base_dir.display()
            ),
        });
    }

    let copy = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to create {}: {e}", target.display()),
    };
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(copy)?;
    }
    std::fs::copy(&template, &target).map_err(copy)?;
    Ok(Some(target))
}

/// Loads config relative to the current working directory, copying defaults
/// first and honouring the environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if let Some(created) = ensure_config_file(&cwd)? {
        info!("Created {} from defaults", created.display());
    }
    load_config_from(&cwd, |key| std::env::var(key).ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::ValidationError {
        field: field.into(),
        message: format!("invalid url `{raw}`: {e}"),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::ValidationError {
            field: field.into(),
            message: format!(
                "scheme must be one of {}, got `{}`",
                schemes.join("/"),
                url.scheme()
            ),
        });
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(file: ConfigFile) -> Result<Config, ConfigError> {
    let api_url = parse_url("backend.api_url", &file.backend.api_url, &["http", "https"])?;
    let websocket_url = parse_url(
        "backend.websocket_url",
        &file.backend.websocket_url,
        &["ws", "wss"],
    )?;

    let capacities = [
        ("session.queue_capacity", file.session.queue_capacity),
        ("session.event_capacity", file.session.event_capacity),
    ];
    for (name, val) in capacities {
        if val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    Ok(Config {
        api_url,
        websocket_url,
        limits: SessionLimits {
            queue_capacity: file.session.queue_capacity,
            event_capacity: file.session.event_capacity,
        },
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
