//! Client settings.
//!
//! Loaded from RON, usually `~/.config/leisure/client.ron`:
//!
//! ```ron
//! (
//!     server: "http://localhost:7315",
//!     session: "notes",
//!     document: Some("todo.org"),
//!     update_timeout: (secs: 60, nanos: 0),
//! )
//! ```
//!
//! Every field is optional; missing ones take the values in
//! [`constants`](crate::constants).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::constants::{
    CONFIG_DIR, CONFIG_FILE, DEFAULT_SERVER, DEFAULT_SESSION, POLL_INTERVAL, REQUEST_TIMEOUT,
    UPDATE_TIMEOUT,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the server, without the version segment.
    pub server: String,
    pub session: String,
    /// Document to attach the session to on connect.
    pub document: Option<String>,
    /// Ask for structured chunks rather than a bare document string.
    pub org: bool,
    /// Force the connection even if the session is in use elsewhere.
    pub force: bool,
    pub update_timeout: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            session: DEFAULT_SESSION.to_string(),
            document: None,
            org: true,
            force: false,
            update_timeout: UPDATE_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// `~/.config/leisure/client.ron`, if there is a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading client config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `{server}/v1/` with exactly one slash between parts.
    pub fn api_base(&self) -> String {
        format!("{}/{}/", self.server.trim_end_matches('/'), crate::constants::API_VERSION)
    }
}
