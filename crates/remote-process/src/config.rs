//! Connection options for a remote shell endpoint
//!
//! Options can be built in code or loaded from YAML:
//!
//! ```yaml
//! address: win-host.example.com
//! username: deployer@EXAMPLE.COM
//! password: secret
//! enable_https: true
//! working_directory: C:\deploy
//! ```

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::pipe::PipeConfig;
use crate::session::SessionSettings;

/// Default port for plain HTTP
pub const DEFAULT_HTTP_PORT: u16 = 5985;
/// Default port for HTTPS
pub const DEFAULT_HTTPS_PORT: u16 = 5986;
/// Default path of the remote shell service
pub const DEFAULT_CONTEXT: &str = "/wsman";
/// Default operation timeout
pub const DEFAULT_TIMEOUT: &str = "PT60.000S";
/// Default maximum envelope size in bytes
pub const DEFAULT_ENVELOPE_SIZE: u32 = 153600;
/// Default locale
pub const DEFAULT_LOCALE: &str = "en-US";

/// Everything needed to reach a remote shell endpoint
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Host name or IP address of the target
    pub address: String,
    /// Port; defaults depend on `enable_https`
    pub port: Option<u16>,
    /// User to authenticate as, in `USER@DOMAIN` form for domain accounts
    pub username: String,
    /// Password for `username`
    pub password: String,
    /// Use HTTPS instead of HTTP
    pub enable_https: bool,
    /// Path of the remote shell service on the target
    pub context: String,
    /// Operation timeout passed to the session
    pub timeout: String,
    /// Maximum envelope size passed to the session
    pub envelope_size: u32,
    /// Locale passed to the session
    pub locale: String,
    /// Directory commands are started in
    pub working_directory: Option<String>,
    /// Destroy processes whose handle is dropped while running
    pub kill_on_drop: bool,
    /// Chunks buffered per output pipe before the drain is suspended
    pub pipe_capacity: usize,
    /// Size of a buffered chunk in bytes
    pub pipe_chunk_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        let pipe = PipeConfig::default();
        Self {
            address: String::new(),
            port: None,
            username: String::new(),
            password: String::new(),
            enable_https: false,
            context: DEFAULT_CONTEXT.to_string(),
            timeout: DEFAULT_TIMEOUT.to_string(),
            envelope_size: DEFAULT_ENVELOPE_SIZE,
            locale: DEFAULT_LOCALE.to_string(),
            working_directory: None,
            kill_on_drop: true,
            pipe_capacity: pipe.capacity,
            pipe_chunk_size: pipe.chunk_size,
        }
    }
}

impl ConnectionOptions {
    /// Create options for the given host
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Parse options from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load options from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Enable or disable HTTPS
    pub fn with_https(mut self, enable: bool) -> Self {
        self.enable_https = enable;
        self
    }

    /// Set the service path
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set the operation timeout
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Set the maximum envelope size
    pub fn with_envelope_size(mut self, size: u32) -> Self {
        self.envelope_size = size;
        self
    }

    /// Set the locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Set the working directory for started commands
    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Set whether dropped running processes are destroyed
    pub fn with_kill_on_drop(mut self, kill_on_drop: bool) -> Self {
        self.kill_on_drop = kill_on_drop;
        self
    }

    /// Set the output pipe sizing
    pub fn with_pipe_config(mut self, config: PipeConfig) -> Self {
        self.pipe_capacity = config.capacity;
        self.pipe_chunk_size = config.chunk_size;
        self
    }

    /// The effective port
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.enable_https {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        })
    }

    /// Check the options can be used to connect
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::config("no target address configured"));
        }
        if self.username.contains('\\') {
            return Err(Error::config(format!(
                "cannot connect with an old-style Windows domain account [{}], use USER@DOMAIN instead",
                self.username
            )));
        }
        if self.envelope_size == 0 {
            return Err(Error::config("envelope size must be positive"));
        }
        if self.pipe_capacity == 0 || self.pipe_chunk_size == 0 {
            return Err(Error::config("pipe capacity and chunk size must be positive"));
        }
        Ok(())
    }

    /// Build the endpoint URL, `scheme://address:port/context`
    pub fn target_url(&self) -> Result<Url> {
        let scheme = if self.enable_https { "https" } else { "http" };
        let context = if self.context.starts_with('/') {
            self.context.clone()
        } else {
            format!("/{}", self.context)
        };
        // IPv6 literals need brackets in the authority
        let host = if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };
        let raw = format!("{}://{}:{}{}", scheme, host, self.effective_port(), context);
        Url::parse(&raw).map_err(|e| Error::config(format!("cannot build a URL from [{}]: {}", raw, e)))
    }

    /// Settings passed through to every created session
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            timeout: self.timeout.clone(),
            envelope_size: self.envelope_size,
            locale: self.locale.clone(),
        }
    }

    /// Sizing of the output pipes
    pub fn pipe_config(&self) -> PipeConfig {
        PipeConfig {
            capacity: self.pipe_capacity,
            chunk_size: self.pipe_chunk_size,
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("address", &self.address)
            .field("port", &self.effective_port())
            .field("username", &self.username)
            .field("password", &"********")
            .field("enable_https", &self.enable_https)
            .field("context", &self.context)
            .field("timeout", &self.timeout)
            .field("envelope_size", &self.envelope_size)
            .field("locale", &self.locale)
            .field("working_directory", &self.working_directory)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote shell on {}:{}", self.address, self.effective_port())
    }
}
