//! Out-of-band GPIO reset: force every known relay line to the OFF level.
//!
//! Two mechanisms are tried for each line, in order:
//!
//! 1. the `gpioset` tool from libgpiod, with a timeout
//! 2. a direct line claim driven high, held briefly, then released
//!
//! The controller also uses the first mechanism to clear stale line claims
//! before retrying a failed initialization.

use crate::error::HardwareError;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Lines driven by the relay board.
pub const KNOWN_PINS: [u32; crate::CHANNEL_COUNT] = crate::DEFAULT_PORTS;

/// How long a single `gpioset` invocation may run.
pub const GPIOSET_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Chip name as `gpioset` expects it, e.g. `gpiochip0` for `/dev/gpiochip0`.
pub fn chip_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gpiochip0".to_string())
}

/// Drive `line` high (relay off) with `gpioset <chip> <line>=1`.
pub fn drive_with_gpioset(chip: &str, line: u32, timeout: Duration) -> Result<(), HardwareError> {
    let mut child = Command::new("gpioset")
        .arg(chip)
        .arg(format!("{}=1", line))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HardwareError::tool("gpioset", e))?;

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return Ok(()),
            Ok(Some(status)) => {
                let stderr = child
                    .wait_with_output()
                    .map(|out| String::from_utf8_lossy(&out.stderr).trim().to_string())
                    .unwrap_or_default();
                return Err(HardwareError::tool(
                    "gpioset",
                    format!("{} {}", status, stderr).trim_end(),
                ));
            }
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(HardwareError::tool(
                    "gpioset",
                    format!("timed out after {:?}", timeout),
                ));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(HardwareError::tool("gpioset", e)),
        }
    }
}

/// Claim `line` as an output driven high, hold it for `hold`, then release.
#[cfg(feature = "chip")]
pub fn drive_with_line_claim(chip_path: &Path, line: u32, hold: Duration) -> Result<(), HardwareError> {
    use gpio_cdev::{Chip, LineRequestFlags};

    let mut chip = Chip::new(chip_path).map_err(|e| {
        HardwareError::unavailable(format!("cannot open {}: {}", chip_path.display(), e))
    })?;
    let handle = chip
        .get_line(line)
        .and_then(|l| l.request(LineRequestFlags::OUTPUT, 1, "gpio_reset"))
        .map_err(|e| HardwareError::claim(&[line], e))?;

    thread::sleep(hold);
    drop(handle);
    Ok(())
}

#[cfg(not(feature = "chip"))]
pub fn drive_with_line_claim(
    _chip_path: &Path,
    line: u32,
    _hold: Duration,
) -> Result<(), HardwareError> {
    Err(HardwareError::unavailable(format!(
        "line claim for GPIO {} needs the `chip` feature",
        line
    )))
}

/// Knobs for [`reset_all`].
#[derive(Debug, Clone)]
pub struct ResetOptions {
    pub chip_path: std::path::PathBuf,
    pub gpioset_timeout: Duration,
    /// Pause between the two passes
    pub settle: Duration,
    /// How long a direct claim is held before release
    pub hold: Duration,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            chip_path: crate::DEFAULT_CHIP_PATH.into(),
            gpioset_timeout: GPIOSET_TIMEOUT,
            settle: Duration::from_secs(1),
            hold: Duration::from_millis(100),
        }
    }
}

/// Per-pin outcome of one reset mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinResult {
    pub pin: u32,
    pub error: Option<HardwareError>,
}

impl PinResult {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything [`reset_all`] attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub gpioset: Vec<PinResult>,
    pub line_claim: Vec<PinResult>,
}

impl ResetReport {
    /// Pins that neither mechanism could drive.
    pub fn failed_pins(&self) -> Vec<u32> {
        self.gpioset
            .iter()
            .filter(|r| !r.ok())
            .filter(|r| {
                self.line_claim
                    .iter()
                    .any(|c| c.pin == r.pin && !c.ok())
            })
            .map(|r| r.pin)
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        self.failed_pins().is_empty()
    }
}

/// Drive every pin in `pins` off with both mechanisms. Failures are logged
/// and recorded; the list is always finished.
pub fn reset_all(options: &ResetOptions, pins: &[u32]) -> ResetReport {
    let mut report = ResetReport::default();
    let chip = chip_name(&options.chip_path);

    info!("Resetting GPIO pins using gpioset...");
    for &pin in pins {
        let result = drive_with_gpioset(&chip, pin, options.gpioset_timeout);
        match &result {
            Ok(()) => info!("Reset GPIO {}", pin),
            Err(e) => warn!("Failed to reset GPIO {}: {}", pin, e),
        }
        report.gpioset.push(PinResult {
            pin,
            error: result.err(),
        });
    }

    thread::sleep(options.settle);

    info!("Resetting GPIO pins with direct line claims...");
    for &pin in pins {
        let result = drive_with_line_claim(&options.chip_path, pin, options.hold);
        match &result {
            Ok(()) => info!("Reset and released GPIO {}", pin),
            Err(e) => warn!("Failed to claim GPIO {}: {}", pin, e),
        }
        report.line_claim.push(PinResult {
            pin,
            error: result.err(),
        });
    }

    report
}
