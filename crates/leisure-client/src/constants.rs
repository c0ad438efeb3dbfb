//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default server base URL for local development.
pub const DEFAULT_SERVER: &str = "http://localhost:7315";

/// Default session name.
pub const DEFAULT_SESSION: &str = "rust";

/// Version segment prefixed to every endpoint path.
pub const API_VERSION: &str = "v1";

/// Long-poll hint sent with `session/update`.
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP request timeout. Must exceed [`UPDATE_TIMEOUT`] so a long poll is
/// not cut off by the client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Pause between drive-loop cycles.
pub const POLL_INTERVAL: Duration = Duration::ZERO;

/// Directory under the user config dir holding client settings.
pub const CONFIG_DIR: &str = "leisure";

/// Client settings file name.
pub const CONFIG_FILE: &str = "client.ron";

// Endpoint paths, relative to `{server}/{API_VERSION}/`.
pub const SESSION_CONNECT: &str = "session/connect";
pub const SESSION_CREATE: &str = "session/create";
pub const SESSION_LIST: &str = "session/list";
pub const SESSION_UPDATE: &str = "session/update";
pub const SESSION_EDIT: &str = "session/edit";
pub const SESSION_GET: &str = "session/get";
pub const SESSION_SET: &str = "session/set";
pub const SESSION_TAG: &str = "session/tag";
pub const SESSION_DOCUMENT: &str = "session/document";
pub const SESSION_CLOSE: &str = "session/close";
