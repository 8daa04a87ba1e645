//! # pi_relay - 16-channel GPIO relay controller
//!
//! Drives an active-low relay board from a Raspberry Pi and serves a small
//! web dashboard and HTTP API for it.
//!
//! ## Features
//!
//! - **Three GPIO access mechanisms**: line-based character device, rppal
//!   device objects, and legacy sysfs pins, each behind a cargo feature
//! - **Simulation fallback**: runs anywhere, no GPIO required
//! - **Persistent state**: last-known relay states survive restarts
//! - **Web API**: `/on/3`, `/status/3`, `/all_off/`, ... with optional Basic auth
//! - **Reset utility**: force every relay line off out of band
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pi_relay::{RelayConfig, RelayController};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::default().with_simulation(true);
//!     let controller = RelayController::from_config(&config);
//!     controller.initialize(&config.ports)?;
//!
//!     controller.on(1)?;
//!     assert!(controller.status(1)?);
//!     Ok(())
//! }
//! ```

pub mod check;
pub mod config;
pub mod error;
pub mod gpio;
pub mod relay;
pub mod reset;
pub mod web;

// Re-export public API
pub use config::{AuthConfig, ChannelConfig, RelayConfig};
pub use error::{HardwareError, RelayError, Result, UsageError};
pub use gpio::{
    select_backend, to_chip_pin, BackendKind, BackendPreference, BackendSettings, Level,
    PinNumbering, RelayBackend, SimulatedBackend,
};
pub use relay::{
    BulkReport, Channel, Phase, RelayController, RelayState, StateStore, StateTable, WriteOutcome,
};
pub use web::{start_web_server, WebConfig};

/// Number of relay channels on the board
pub const CHANNEL_COUNT: usize = 16;

/// Chip lines wired to relays 1..=16
pub const DEFAULT_PORTS: [u32; CHANNEL_COUNT] =
    [10, 12, 13, 14, 15, 6, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26];

/// Pause between channels in bulk operations, in milliseconds
pub const BULK_DELAY_MS: u64 = 200;

/// Default off time for a reboot request, in milliseconds
pub const REBOOT_DELAY_MS: u64 = 3000;

/// Wait between the GPIO reset and the retried claim, in milliseconds
pub const CLAIM_RETRY_DELAY_MS: u64 = 1000;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 5000;

pub const DEFAULT_STATE_FILE: &str = "relay_states.json";

pub const DEFAULT_CHIP_PATH: &str = "/dev/gpiochip0";

/// Consumer label attached to claimed lines
pub const CONSUMER: &str = "relay_controller";
