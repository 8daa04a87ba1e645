//! Error handling for the relay controller crate.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! - [`HardwareError`] is produced by GPIO backends. The controller catches
//!   it and degrades to its cached state, except during initialization where
//!   a failed line claim (after one retry) becomes a fatal [`RelayError::Init`].
//! - [`UsageError`] is a caller mistake such as an out-of-range relay number.
//!   The operation is ignored and the error is handed back so an HTTP layer
//!   can answer with 404.
//! - [`RelayError`] is everything else the crate can surface.

/// A specialized `Result` type for relay controller operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// The main error type for the relay controller.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Lines could not be claimed, even after reset-and-retry
    #[error("Initialization failed: {message}")]
    Init {
        message: String,
        #[source]
        source: Option<HardwareError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Backend fault surfaced outside the controller (reset utility, checks)
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Caller passed something the controller cannot act on
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl RelayError {
    /// Create a new fatal initialization error
    pub fn init_error(msg: impl Into<String>) -> Self {
        Self::Init {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a fatal initialization error caused by a backend fault
    pub fn init_failed(msg: impl Into<String>, source: HardwareError) -> Self {
        Self::Init {
            message: msg.into(),
            source: Some(source),
        }
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Whether this error must abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Init { .. })
    }
}

/// A fault reported by a GPIO backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    /// The access mechanism is not present on this system
    #[error("GPIO access unavailable: {0}")]
    Unavailable(String),

    /// Requesting lines as outputs failed
    #[error("failed to claim lines {lines:?}: {reason}")]
    Claim { lines: Vec<u32>, reason: String },

    /// The line was never claimed, or was already released
    #[error("line {0} is not claimed")]
    NotClaimed(u32),

    /// Driving a line failed
    #[error("failed to write line {line}: {reason}")]
    Write { line: u32, reason: String },

    /// Reading a line back failed
    #[error("failed to read line {line}: {reason}")]
    Read { line: u32, reason: String },

    /// An external tool failed or could not be run
    #[error("{tool}: {reason}")]
    Tool { tool: String, reason: String },
}

impl HardwareError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn claim(lines: &[u32], reason: impl ToString) -> Self {
        Self::Claim {
            lines: lines.to_vec(),
            reason: reason.to_string(),
        }
    }

    pub fn write(line: u32, reason: impl ToString) -> Self {
        Self::Write {
            line,
            reason: reason.to_string(),
        }
    }

    pub fn read(line: u32, reason: impl ToString) -> Self {
        Self::Read {
            line,
            reason: reason.to_string(),
        }
    }

    pub fn tool(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

/// A caller mistake. The requested operation was not performed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// Relay number outside `1..=max`
    #[error("invalid relay #{relay} (expected 1..={max})")]
    InvalidRelay { relay: usize, max: usize },

    /// Relay identifier is not an integer
    #[error("relay number must be an integer, got {0:?}")]
    NotAnInteger(String),

    /// A port that is not part of the configured port list
    #[error("port {0} is not assigned to any relay")]
    UnknownPort(u32),
}
