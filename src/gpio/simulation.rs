//! No-op backend used when no GPIO access mechanism is available.

use super::{BackendKind, Level, RelayBackend};
use crate::error::HardwareError;
use tracing::debug;

/// Accepts every claim and write without touching hardware.
///
/// Readback is unsupported, so the controller's cached state is what
/// callers see.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    claimed: Vec<u32>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines currently held.
    pub fn claimed(&self) -> &[u32] {
        &self.claimed
    }
}

impl RelayBackend for SimulatedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulation
    }

    fn claim(&mut self, lines: &[u32]) -> Result<usize, HardwareError> {
        self.claimed = lines.to_vec();
        debug!(lines = ?lines, "SIM: claimed lines");
        Ok(lines.len())
    }

    fn write(&mut self, line: u32, level: Level) -> Result<(), HardwareError> {
        debug!(line, ?level, "SIM: write");
        Ok(())
    }

    fn read(&mut self, _line: u32) -> Result<Option<Level>, HardwareError> {
        Ok(None)
    }

    fn release(&mut self) {
        if !self.claimed.is_empty() {
            debug!("SIM: released {} lines", self.claimed.len());
            self.claimed.clear();
        }
    }
}
