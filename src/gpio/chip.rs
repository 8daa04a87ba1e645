//! Line-based access through the GPIO character device.

use super::{BackendKind, Level, RelayBackend};
use crate::error::HardwareError;
use crate::reset;
use gpio_cdev::{Chip, LineRequestFlags, MultiLineHandle};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// All relay lines held by a single batch request on one chip.
pub struct LineChipBackend {
    chip: Chip,
    chip_path: PathBuf,
    handle: Option<MultiLineHandle>,
    lines: Vec<u32>,
    // last values written, since the batch handle sets every line at once
    values: Vec<u8>,
}

impl LineChipBackend {
    /// Open the chip at `path`.
    pub fn open(path: &Path) -> Result<Self, HardwareError> {
        let chip = Chip::new(path).map_err(|e| {
            HardwareError::unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;

        debug!(
            chip = chip.name(),
            lines = chip.num_lines(),
            "Opened GPIO character device"
        );

        Ok(Self {
            chip,
            chip_path: path.to_path_buf(),
            handle: None,
            lines: Vec::new(),
            values: Vec::new(),
        })
    }

    fn index_of(&self, line: u32) -> Result<usize, HardwareError> {
        if self.handle.is_none() {
            return Err(HardwareError::NotClaimed(line));
        }
        self.lines
            .iter()
            .position(|&l| l == line)
            .ok_or(HardwareError::NotClaimed(line))
    }
}

impl RelayBackend for LineChipBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LineChip
    }

    fn claim(&mut self, lines: &[u32]) -> Result<usize, HardwareError> {
        self.release();

        let requested = self
            .chip
            .get_lines(lines)
            .map_err(|e| HardwareError::claim(lines, e))?;
        let defaults = vec![Level::High.as_u8(); lines.len()];
        let handle = requested
            .request(LineRequestFlags::OUTPUT, &defaults, crate::CONSUMER)
            .map_err(|e| HardwareError::claim(lines, e))?;

        info!("Claimed {} GPIO lines on {}", lines.len(), self.chip_path.display());
        self.handle = Some(handle);
        self.lines = lines.to_vec();
        self.values = defaults;
        Ok(lines.len())
    }

    fn recover(&mut self, lines: &[u32]) -> bool {
        let chip = reset::chip_name(&self.chip_path);
        warn!("Claim failed, forcing lines off with gpioset before retrying");
        for &line in lines {
            if let Err(e) = reset::drive_with_gpioset(&chip, line, reset::GPIOSET_TIMEOUT) {
                debug!(line, "gpioset reset failed: {}", e);
            }
        }
        true
    }

    fn write(&mut self, line: u32, level: Level) -> Result<(), HardwareError> {
        let index = self.index_of(line)?;
        let mut next = self.values.clone();
        next[index] = level.as_u8();

        let handle = self.handle.as_ref().ok_or(HardwareError::NotClaimed(line))?;
        handle
            .set_values(&next)
            .map_err(|e| HardwareError::write(line, e))?;
        self.values = next;
        Ok(())
    }

    fn read(&mut self, line: u32) -> Result<Option<Level>, HardwareError> {
        let index = self.index_of(line)?;
        let handle = self.handle.as_ref().ok_or(HardwareError::NotClaimed(line))?;
        let values = handle.get_values().map_err(|e| HardwareError::read(line, e))?;
        let value = values
            .get(index)
            .copied()
            .ok_or_else(|| HardwareError::read(line, "short readback"))?;

        if values.len() == self.values.len() {
            self.values = values;
        }
        Ok(Some(Level::from_u8(value)))
    }

    fn release(&mut self) {
        if self.handle.take().is_some() {
            info!("Released {} GPIO lines", self.lines.len());
        }
        self.lines.clear();
        self.values.clear();
    }
}
