//! Controller configuration, loaded from a JSON file.
//!
//! Every field has a default, so an empty object (or no file at all) gives a
//! working 16-channel setup on the standard relay pins.

use crate::error::{RelayError, Result};
use crate::gpio::{BackendPreference, BackendSettings, PinNumbering};
use crate::web::WebConfig;
use crate::CHANNEL_COUNT;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// SHA-256 of the default password, `relay123`.
pub const DEFAULT_PASSWORD_SHA256: &str =
    "702b95479bdae770e3a9c06fa9e1a0597188bb4a2e0cb56c4868d8a00b94953b";

/// Configuration for the relay controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Display name shown on the dashboard
    pub name: String,
    /// One port per relay, in relay order
    pub ports: Vec<u32>,
    /// How `ports` are numbered
    pub pin_numbering: PinNumbering,
    /// Where relay states are persisted
    pub state_file: PathBuf,
    /// Per-channel names and active flags
    pub channels: Vec<ChannelConfig>,
    /// Probe for hardware or force simulation
    pub backend: BackendPreference,
    /// GPIO character device for line-based access
    pub chip_path: PathBuf,
    /// Global number of line 0 for legacy access, detected when absent
    pub sysfs_base: Option<u32>,
    /// Pause between channels in bulk operations
    pub bulk_delay_ms: u64,
    /// Off time for a reboot request
    pub reboot_delay_ms: u64,
    /// Pause between a failed claim's reset and the retry
    pub retry_delay_ms: u64,
    /// HTTP Basic credentials; no auth when absent
    pub auth: Option<AuthConfig>,
    pub web: WebConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: "Pi-5 Relay Controller".to_string(),
            ports: crate::DEFAULT_PORTS.to_vec(),
            pin_numbering: PinNumbering::Chip,
            state_file: PathBuf::from(crate::DEFAULT_STATE_FILE),
            channels: Vec::new(),
            backend: BackendPreference::Auto,
            chip_path: PathBuf::from(crate::DEFAULT_CHIP_PATH),
            sysfs_base: None,
            bulk_delay_ms: crate::BULK_DELAY_MS,
            reboot_delay_ms: crate::REBOOT_DELAY_MS,
            retry_delay_ms: crate::CLAIM_RETRY_DELAY_MS,
            auth: Some(AuthConfig::default()),
            web: WebConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Read a JSON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RelayError::config_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            RelayError::config_error(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ports.is_empty() {
            return Err(RelayError::config_error("no relay ports configured"));
        }
        if self.ports.len() > CHANNEL_COUNT {
            return Err(RelayError::config_error(format!(
                "{} ports configured, at most {} supported",
                self.ports.len(),
                CHANNEL_COUNT
            )));
        }
        if let Some(bad) = self
            .channels
            .iter()
            .find(|c| !(1..=CHANNEL_COUNT).contains(&c.channel))
        {
            return Err(RelayError::config_error(format!(
                "channel {} out of range 1..={}",
                bad.channel, CHANNEL_COUNT
            )));
        }
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }
        Ok(())
    }

    /// Settings for backend selection.
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            preference: self.backend,
            chip_path: self.chip_path.clone(),
            sysfs_base: self.sysfs_base,
        }
    }

    pub fn with_ports(mut self, ports: Vec<u32>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    /// Skip hardware probing.
    pub fn with_simulation(mut self, simulate: bool) -> Self {
        if simulate {
            self.backend = BackendPreference::Simulation;
        }
        self
    }

    pub fn with_auth(mut self, auth: Option<AuthConfig>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }
}

/// Display name and availability of one relay channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// 1-based relay number
    pub channel: usize,
    #[serde(default)]
    pub name: Option<String>,
    /// Accepts `true`/`false` or the strings `"true"`/`"false"`
    #[serde(default = "default_active", deserialize_with = "deserialize_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

fn deserialize_active<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected \"true\" or \"false\", got {:?}",
                other
            ))),
        },
    }
}

/// HTTP Basic credentials. The password is stored as a SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password_sha256: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password_sha256: DEFAULT_PASSWORD_SHA256.to_string(),
        }
    }
}

impl AuthConfig {
    fn validate(&self) -> Result<()> {
        let digest = &self.password_sha256;
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RelayError::config_error(
                "auth.password_sha256 must be a 64-character hex digest",
            ));
        }
        Ok(())
    }
}
