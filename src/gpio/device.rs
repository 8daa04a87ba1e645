//! Device-object access: one rppal output pin per relay.

use super::{BackendKind, Level, RelayBackend};
use crate::error::HardwareError;
use rppal::gpio::{Gpio, OutputPin};
use tracing::{info, warn};

/// Raspberry Pi GPIO through rppal output pin objects.
pub struct DeviceBackend {
    gpio: Gpio,
    pins: Vec<(u32, OutputPin)>,
}

impl DeviceBackend {
    pub fn open() -> Result<Self, HardwareError> {
        let gpio = Gpio::new()
            .map_err(|e| HardwareError::unavailable(format!("Failed to initialize GPIO: {}", e)))?;

        Ok(Self {
            gpio,
            pins: Vec::new(),
        })
    }

    fn pin_mut(&mut self, line: u32) -> Result<&mut OutputPin, HardwareError> {
        self.pins
            .iter_mut()
            .find(|(l, _)| *l == line)
            .map(|(_, pin)| pin)
            .ok_or(HardwareError::NotClaimed(line))
    }
}

impl RelayBackend for DeviceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DeviceObject
    }

    /// Pins are opened one by one; a pin that fails is logged and skipped.
    fn claim(&mut self, lines: &[u32]) -> Result<usize, HardwareError> {
        self.release();

        for &line in lines {
            let pin = u8::try_from(line)
                .map_err(|_| format!("line {} out of range", line))
                .and_then(|n| self.gpio.get(n).map_err(|e| e.to_string()));

            match pin {
                Ok(pin) => {
                    self.pins.push((line, pin.into_output_high()));
                    info!("Initialized GPIO {} as output", line);
                }
                Err(e) => warn!("Failed to initialize GPIO {}: {}", line, e),
            }
        }

        Ok(self.pins.len())
    }

    fn write(&mut self, line: u32, level: Level) -> Result<(), HardwareError> {
        let pin = self.pin_mut(line)?;
        match level {
            Level::Low => pin.set_low(),
            Level::High => pin.set_high(),
        }
        Ok(())
    }

    fn read(&mut self, line: u32) -> Result<Option<Level>, HardwareError> {
        let pin = self.pin_mut(line)?;
        let level = if pin.is_set_high() {
            Level::High
        } else {
            Level::Low
        };
        Ok(Some(level))
    }

    fn release(&mut self) {
        if !self.pins.is_empty() {
            info!("Closing {} GPIO output pins", self.pins.len());
            self.pins.clear();
        }
    }
}
