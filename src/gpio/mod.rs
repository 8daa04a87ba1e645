//! GPIO access for relay outputs.
//!
//! Three incompatible access mechanisms are supported, each behind a cargo
//! feature so the crate still builds on machines without GPIO:
//!
//! | Backend        | Feature | Crate        | Mechanism                          |
//! |----------------|---------|--------------|------------------------------------|
//! | `LineChip`     | `chip`  | `gpio-cdev`  | `/dev/gpiochipN` batch line claims |
//! | `DeviceObject` | `gpio`  | `rppal`      | one output object per pin          |
//! | `Legacy`       | `sysfs` | `sysfs_gpio` | numbered pins in `/sys/class/gpio` |
//!
//! [`select_backend`] probes them in that order once per process and falls
//! back to [`SimulatedBackend`] when none can be opened.

#[cfg(feature = "chip")]
pub mod chip;
#[cfg(feature = "gpio")]
pub mod device;
#[cfg(feature = "sysfs")]
pub mod legacy;
pub mod pins;
pub mod simulation;

pub use pins::{resolve_ports, to_chip_pin, PinNumbering};
pub use simulation::SimulatedBackend;

use crate::error::HardwareError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Electrical level of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn as_u8(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        if value == 0 {
            Level::Low
        } else {
            Level::High
        }
    }
}

/// The GPIO access mechanism in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    LineChip,
    DeviceObject,
    Legacy,
    Simulation,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::LineChip => "line-chip",
            BackendKind::DeviceObject => "device-object",
            BackendKind::Legacy => "legacy",
            BackendKind::Simulation => "simulation",
        };
        f.write_str(name)
    }
}

/// Whether to probe for hardware or go straight to simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    #[default]
    Auto,
    Simulation,
}

/// Inputs the backends need to open their device.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub preference: BackendPreference,
    /// Character device for the line-chip backend
    pub chip_path: PathBuf,
    /// Global number of line 0 for the legacy backend (detected when `None`)
    pub sysfs_base: Option<u32>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            preference: BackendPreference::Auto,
            chip_path: PathBuf::from(crate::DEFAULT_CHIP_PATH),
            sysfs_base: None,
        }
    }
}

/// One GPIO access mechanism driving relay output lines.
///
/// Lines are chip line offsets. Levels are electrical; the relay board is
/// active-low, which the controller handles.
pub trait RelayBackend: Send {
    /// Which mechanism this is.
    fn kind(&self) -> BackendKind;

    /// Numbering convention the backend imposes on configured ports, if any.
    fn numbering(&self) -> Option<PinNumbering> {
        None
    }

    /// Claim `lines` as outputs driven high (relay off).
    ///
    /// Returns how many lines were configured. Backends that claim in one
    /// batch either configure all of them or return an error.
    fn claim(&mut self, lines: &[u32]) -> Result<usize, HardwareError>;

    /// Best-effort cleanup after a failed claim. Returns `true` when a
    /// retry is worthwhile.
    fn recover(&mut self, _lines: &[u32]) -> bool {
        false
    }

    /// Drive one claimed line.
    fn write(&mut self, line: u32, level: Level) -> Result<(), HardwareError>;

    /// Read one claimed line back. `Ok(None)` means readback is unsupported.
    fn read(&mut self, line: u32) -> Result<Option<Level>, HardwareError>;

    /// Release every claimed line. Calling it again is a no-op.
    fn release(&mut self);
}

static COMMITTED: OnceLock<BackendKind> = OnceLock::new();

/// The backend committed to by [`select_backend`], if selection has happened.
pub fn active_backend() -> Option<BackendKind> {
    COMMITTED.get().copied()
}

/// Pick the GPIO backend for this process.
///
/// The first call probes line-chip, device-object, then legacy access and
/// commits to the first one that opens, or to simulation. Later calls open
/// the committed kind again without probing the others.
pub fn select_backend(settings: &BackendSettings) -> Box<dyn RelayBackend> {
    if let Some(kind) = COMMITTED.get() {
        return open_committed(*kind, settings);
    }

    let backend = probe(settings);
    let kind = *COMMITTED.get_or_init(|| backend.kind());
    if kind != backend.kind() {
        // lost a race against another selector; honour the first commit
        return open_committed(kind, settings);
    }

    info!(backend = %kind, "GPIO backend selected");
    backend
}

fn probe(settings: &BackendSettings) -> Box<dyn RelayBackend> {
    if settings.preference == BackendPreference::Simulation {
        info!("Simulation requested, skipping GPIO probe");
        return Box::new(SimulatedBackend::new());
    }

    #[cfg(feature = "chip")]
    match chip::LineChipBackend::open(&settings.chip_path) {
        Ok(backend) => return Box::new(backend),
        Err(e) => info!("Line-chip access unavailable: {}", e),
    }

    #[cfg(feature = "gpio")]
    match device::DeviceBackend::open() {
        Ok(backend) => return Box::new(backend),
        Err(e) => info!("Device-object access unavailable: {}", e),
    }

    #[cfg(feature = "sysfs")]
    match legacy::LegacyBackend::open(settings.sysfs_base) {
        Ok(backend) => return Box::new(backend),
        Err(e) => info!("Legacy numbered-pin access unavailable: {}", e),
    }

    warn!("No GPIO access available, running in simulation mode");
    Box::new(SimulatedBackend::new())
}

#[cfg_attr(
    not(any(feature = "chip", feature = "sysfs")),
    allow(unused_variables)
)]
fn open_committed(kind: BackendKind, settings: &BackendSettings) -> Box<dyn RelayBackend> {
    let opened: Result<Box<dyn RelayBackend>, HardwareError> = match kind {
        #[cfg(feature = "chip")]
        BackendKind::LineChip => chip::LineChipBackend::open(&settings.chip_path)
            .map(|b| Box::new(b) as Box<dyn RelayBackend>),
        #[cfg(feature = "gpio")]
        BackendKind::DeviceObject => {
            device::DeviceBackend::open().map(|b| Box::new(b) as Box<dyn RelayBackend>)
        }
        #[cfg(feature = "sysfs")]
        BackendKind::Legacy => legacy::LegacyBackend::open(settings.sysfs_base)
            .map(|b| Box::new(b) as Box<dyn RelayBackend>),
        _ => Ok(Box::new(SimulatedBackend::new())),
    };

    opened.unwrap_or_else(|e| {
        warn!(backend = %kind, "Committed backend failed to reopen ({}), simulating", e);
        Box::new(SimulatedBackend::new())
    })
}

/// Backends compiled into this build, in probe order.
pub fn compiled_backends() -> Vec<BackendKind> {
    let mut kinds = Vec::new();
    #[cfg(feature = "chip")]
    kinds.push(BackendKind::LineChip);
    #[cfg(feature = "gpio")]
    kinds.push(BackendKind::DeviceObject);
    #[cfg(feature = "sysfs")]
    kinds.push(BackendKind::Legacy);
    kinds.push(BackendKind::Simulation);
    kinds
}
