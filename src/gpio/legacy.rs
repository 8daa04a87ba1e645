//! Legacy numbered-pin access through `/sys/class/gpio`.
//!
//! The sysfs interface addresses pins by a global number (chip base plus
//! line offset). On first use the backend applies a process-wide setup:
//! reuse warnings are silenced and ports are read as header positions.

use super::{pins::PinNumbering, BackendKind, Level, RelayBackend};
use crate::error::HardwareError;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use sysfs_gpio::{Direction, Pin};
use tracing::{debug, info, warn};

const SYSFS_ROOT: &str = "/sys/class/gpio";

/// Process-wide legacy configuration, fixed on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacySetup {
    /// Warn when a pin is already exported by someone else
    pub warnings: bool,
    /// Convention used for configured ports
    pub numbering: PinNumbering,
}

static SETUP: OnceLock<LegacySetup> = OnceLock::new();

/// Apply the one-time legacy configuration and return it.
pub fn configure() -> LegacySetup {
    *SETUP.get_or_init(|| {
        info!("Legacy GPIO: warnings off, header pin numbering");
        LegacySetup {
            warnings: false,
            numbering: PinNumbering::Header,
        }
    })
}

/// Exported sysfs pins, one per relay line.
pub struct LegacyBackend {
    setup: LegacySetup,
    base: u32,
    pins: Vec<(u32, Pin)>,
}

impl LegacyBackend {
    /// Open the sysfs interface. `base` overrides chip base detection.
    pub fn open(base: Option<u32>) -> Result<Self, HardwareError> {
        let export = Path::new(SYSFS_ROOT).join("export");
        if !export.exists() {
            return Err(HardwareError::unavailable(format!(
                "{} not present",
                export.display()
            )));
        }

        let base = match base {
            Some(base) => base,
            None => detect_base(Path::new(SYSFS_ROOT))?,
        };
        debug!(base, "Legacy GPIO chip base");

        Ok(Self {
            setup: configure(),
            base,
            pins: Vec::new(),
        })
    }

    fn pin(&self, line: u32) -> Result<&Pin, HardwareError> {
        self.pins
            .iter()
            .find(|(l, _)| *l == line)
            .map(|(_, pin)| pin)
            .ok_or(HardwareError::NotClaimed(line))
    }
}

/// Lowest chip base listed under a sysfs gpio root.
pub fn detect_base(root: &Path) -> Result<u32, HardwareError> {
    let entries = fs::read_dir(root)
        .map_err(|e| HardwareError::unavailable(format!("cannot list {}: {}", root.display(), e)))?;

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("gpiochip"))
        .filter_map(|entry| fs::read_to_string(entry.path().join("base")).ok())
        .filter_map(|base| base.trim().parse::<u32>().ok())
        .min()
        .ok_or_else(|| HardwareError::unavailable(format!("no gpiochip under {}", root.display())))
}

impl RelayBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn numbering(&self) -> Option<PinNumbering> {
        Some(self.setup.numbering)
    }

    fn claim(&mut self, lines: &[u32]) -> Result<usize, HardwareError> {
        self.release();

        for &line in lines {
            let pin = Pin::new(u64::from(self.base + line));
            if pin.is_exported() && self.setup.warnings {
                warn!("GPIO {} is already exported, reusing it", line);
            }

            let configured = pin
                .export()
                .and_then(|_| pin.set_direction(Direction::High));
            match configured {
                Ok(()) => self.pins.push((line, pin)),
                Err(e) => warn!("Failed to set up GPIO {}: {}", line, e),
            }
        }

        info!("Exported {} of {} GPIO pins", self.pins.len(), lines.len());
        Ok(self.pins.len())
    }

    fn write(&mut self, line: u32, level: Level) -> Result<(), HardwareError> {
        self.pin(line)?
            .set_value(level.as_u8())
            .map_err(|e| HardwareError::write(line, e))
    }

    fn read(&mut self, line: u32) -> Result<Option<Level>, HardwareError> {
        let value = self
            .pin(line)?
            .get_value()
            .map_err(|e| HardwareError::read(line, e))?;
        Ok(Some(Level::from_u8(value)))
    }

    fn release(&mut self) {
        for (line, pin) in self.pins.drain(..) {
            if let Err(e) = pin.unexport() {
                debug!(line, "unexport failed: {}", e);
            }
        }
    }
}
