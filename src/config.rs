//! Connection configuration: the sanitized core struct plus an optional
//! TOML loader (`forwarder::config`'s Raw/validated split, adapted).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

const DEFAULT_HOST: &str = "localhost:1337";
const DEFAULT_NEGOTIATE_PATH: &str = "negotiate";
const DEFAULT_CONNECT_PATH: &str = "connect";
const DEFAULT_RECONNECT_PATH: &str = "reconnect";

/// Sanitized connection configuration. Every field is defaulted at
/// construction — there is no separate `sanitize()` step the caller must
/// remember to invoke; building a `Config` *is* sanitizing it.
///
/// The wire scheme is always forced to HTTPS for negotiate and `wss` for
/// the WebSocket dial (see `dial.rs`); there is deliberately no field to
/// override it.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_client: reqwest::Client,
    pub host: String,
    pub negotiate_path: String,
    pub connect_path: String,
    pub reconnect_path: String,
    pub request_headers: HashMap<String, Vec<String>>,
    /// Cookie jar consulted when attaching a `Cookie` header to the
    /// WebSocket upgrade request. `None` by default — matching
    /// `original_source/connect.go`, which always constructs a bare
    /// `http.Client{}` with no jar, so in practice no cookies flow unless a
    /// caller opts in via [`Config::cookie_jar`].
    pub cookie_jar: Option<Arc<reqwest::cookie::Jar>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_client: reqwest::Client::new(),
            host: DEFAULT_HOST.to_owned(),
            negotiate_path: DEFAULT_NEGOTIATE_PATH.to_owned(),
            connect_path: DEFAULT_CONNECT_PATH.to_owned(),
            reconnect_path: DEFAULT_RECONNECT_PATH.to_owned(),
            request_headers: HashMap::new(),
            cookie_jar: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn negotiate_path(mut self, path: impl Into<String>) -> Self {
        self.negotiate_path = path.into();
        self
    }

    #[must_use]
    pub fn connect_path(mut self, path: impl Into<String>) -> Self {
        self.connect_path = path.into();
        self
    }

    #[must_use]
    pub fn reconnect_path(mut self, path: impl Into<String>) -> Self {
        self.reconnect_path = path.into();
        self
    }

    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = client;
        self
    }

    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<reqwest::cookie::Jar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// `{scheme}://{host}/{negotiate_path}?clientProtocol=1.5&_={unix_millis}`
    pub(crate) fn negotiate_url(&self, unix_millis: u128) -> String {
        format!(
            "https://{}/{}?clientProtocol=1.5&_={}",
            self.host, self.negotiate_path, unix_millis
        )
    }
}

// ---------------------------------------------------------------------------
// TOML loader (ambient convenience; the core contract is `Config` above)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfigFile {
    host: Option<String>,
    negotiate_path: Option<String>,
    connect_path: Option<String>,
    reconnect_path: Option<String>,
    request_headers: Option<HashMap<String, Vec<String>>>,
}

/// Load a [`Config`] from a TOML file. Unset fields take the same defaults
/// `Config::new()` would, exactly as `forwarder::config::load_config_from_path`
/// fills defaults for anything the TOML omits. A caller who prefers to
/// build `Config` directly (e.g. in tests) need never touch this.
pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigFileError> {
    let toml_str = std::fs::read_to_string(path).map_err(|e| {
        ConfigFileError::Io(format!("reading config file '{}': {}", path.display(), e))
    })?;
    load_config_from_str(&toml_str)
}

/// Load a [`Config`] from a TOML string already in memory.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigFileError> {
    let raw: RawConfigFile =
        toml::from_str(toml_str).map_err(|e| ConfigFileError::Parse(e.to_string()))?;

    let mut config = Config::new();
    if let Some(host) = raw.host {
        config = config.host(host);
    }
    if let Some(path) = raw.negotiate_path {
        config = config.negotiate_path(path);
    }
    if let Some(path) = raw.connect_path {
        config = config.connect_path(path);
    }
    if let Some(path) = raw.reconnect_path {
        config = config.reconnect_path(path);
    }
    if let Some(headers) = raw.request_headers {
        config.request_headers = headers;
    }

    Ok(config)
}

#[derive(Debug)]
pub enum ConfigFileError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigFileError::Io(s) => write!(f, "IO error: {s}"),
            ConfigFileError::Parse(s) => write!(f, "Parse error: {s}"),
        }
    }
}

impl std::error::Error for ConfigFileError {}
