//! Web server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the web server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Host to bind the server to
    pub host: String,
    /// Port to bind the server to
    pub port: u16,
    /// Whether to enable CORS
    pub enable_cors: bool,
    /// Directory holding a custom `index.html`; the built-in page is served otherwise
    pub static_path: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_WEB_PORT,
            enable_cors: true,
            static_path: Some("static".to_string()),
        }
    }
}

impl WebConfig {
    /// Create a new web configuration with custom host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the host for the web server.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port for the web server.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable_cors: bool) -> Self {
        self.enable_cors = enable_cors;
        self
    }

    /// Set the directory searched for a custom dashboard page.
    pub fn with_static_path(mut self, path: Option<String>) -> Self {
        self.static_path = path;
        self
    }

    /// Get the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The static directory, if one is configured and present on disk.
    pub fn static_dir(&self) -> Option<&Path> {
        self.static_path
            .as_deref()
            .map(Path::new)
            .filter(|dir| dir.is_dir())
    }

    /// A custom `index.html` in the static directory, replacing the built-in
    /// dashboard.
    pub fn dashboard_page(&self) -> Option<PathBuf> {
        self.static_dir()
            .map(|dir| dir.join("index.html"))
            .filter(|page| page.is_file())
    }
}
