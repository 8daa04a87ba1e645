//! The relay controller: one owner for the GPIO backend, the state table
//! and the state file.
//!
//! Every mutating call takes the same lock around hardware write, table
//! update and file write, so concurrent web requests cannot interleave.
//! Hardware faults are logged and the table stays authoritative; only a
//! failed line claim during [`RelayController::initialize`] is fatal.

use super::state::{Channel, RelayState, StateTable};
use super::store::StateStore;
use crate::config::{ChannelConfig, RelayConfig};
use crate::error::{RelayError, Result, UsageError};
use crate::gpio::{self, BackendKind, PinNumbering, RelayBackend};
use crate::CHANNEL_COUNT;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    Released,
}

/// What happened to a requested write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The hardware accepted the write
    Applied,
    /// The hardware write failed or the channel has no line; the requested
    /// state was recorded anyway
    Degraded,
    /// The controller was released; nothing changed
    Released,
}

/// Result of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub applied: usize,
    pub degraded: usize,
    /// Ports not assigned to any relay
    pub rejected: Vec<u32>,
    /// Stopped early because the controller was released
    pub interrupted: bool,
}

struct Inner {
    backend: Box<dyn RelayBackend>,
    table: StateTable,
    store: StateStore,
    numbering: PinNumbering,
    phase: Phase,
}

/// Drives up to [`CHANNEL_COUNT`] active-low relays.
pub struct RelayController {
    inner: Mutex<Inner>,
    released: AtomicBool,
    kind: BackendKind,
    bulk_delay: Duration,
    retry_delay: Duration,
}

impl RelayController {
    /// Create a controller around an already selected backend.
    pub fn new(backend: Box<dyn RelayBackend>, store: StateStore) -> Self {
        let kind = backend.kind();
        Self {
            inner: Mutex::new(Inner {
                backend,
                table: StateTable::new(),
                store,
                numbering: PinNumbering::Chip,
                phase: Phase::Uninitialized,
            }),
            released: AtomicBool::new(false),
            kind,
            bulk_delay: Duration::from_millis(crate::BULK_DELAY_MS),
            retry_delay: Duration::from_millis(crate::CLAIM_RETRY_DELAY_MS),
        }
    }

    /// Select the process backend and build a controller from `config`.
    pub fn from_config(config: &RelayConfig) -> Self {
        let backend = gpio::select_backend(&config.backend_settings());
        Self::new(backend, StateStore::new(&config.state_file))
            .with_numbering(config.pin_numbering)
            .with_channels(&config.channels)
            .with_bulk_delay(Duration::from_millis(config.bulk_delay_ms))
            .with_retry_delay(Duration::from_millis(config.retry_delay_ms))
    }

    /// Set how configured ports are read.
    pub fn with_numbering(mut self, numbering: PinNumbering) -> Self {
        self.inner_mut().numbering = numbering;
        self
    }

    /// Apply channel names and active flags.
    pub fn with_channels(mut self, channels: &[ChannelConfig]) -> Self {
        let inner = self.inner_mut();
        for config in channels {
            match inner.table.get_mut(config.channel) {
                Some(channel) => {
                    if let Some(name) = &config.name {
                        channel.name = name.clone();
                    }
                    channel.active = config.active;
                }
                None => warn!("Ignoring config for invalid channel {}", config.channel),
            }
        }
        self
    }

    /// Set the pause between channels in bulk operations.
    pub fn with_bulk_delay(mut self, delay: Duration) -> Self {
        self.bulk_delay = delay;
        self
    }

    /// Set the pause between a failed claim's reset and its retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn inner_mut(&mut self) -> &mut Inner {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Claim the lines for `ports` (one per relay, in relay order), sync the
    /// table with what the hardware reports, then re-apply stored states.
    ///
    /// Returns `Ok(false)` when the number of configured ports does not
    /// match [`CHANNEL_COUNT`]. Returns an error only when the lines cannot
    /// be claimed, even after the backend's reset and one retry.
    pub fn initialize(&self, ports: &[u32]) -> Result<bool> {
        if self.is_released() {
            return Err(RelayError::init_error("controller has been released"));
        }

        let mut inner = self.lock();
        info!("Initializing relays on {} backend", self.kind);
        info!("Relay port list: {:?}", ports);

        let port_count_ok = ports.len() == CHANNEL_COUNT;
        if ports.len() > CHANNEL_COUNT {
            warn!(
                "{} ports given, only the first {} are used",
                ports.len(),
                CHANNEL_COUNT
            );
        }
        let given = ports.len();
        let ports = &ports[..given.min(CHANNEL_COUNT)];

        let numbering = inner.backend.numbering().unwrap_or(inner.numbering);
        let resolved = gpio::resolve_ports(ports, numbering);
        let lines: Vec<u32> = resolved.iter().flatten().copied().collect();

        let configured = match inner.backend.claim(&lines) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to claim GPIO lines: {}", e);
                if !inner.backend.recover(&lines) {
                    return Err(RelayError::init_failed("failed to claim GPIO lines", e));
                }

                thread::sleep(self.retry_delay);
                let count = inner.backend.claim(&lines).map_err(|e| {
                    error!("Failed to claim GPIO lines even after reset: {}", e);
                    RelayError::init_failed("failed to claim GPIO lines even after reset", e)
                })?;
                info!("Claimed GPIO lines after reset");
                count
            }
        };

        for number in 1..=CHANNEL_COUNT {
            if let Some(channel) = inner.table.get_mut(number) {
                channel.port = ports.get(number - 1).copied();
                channel.line = resolved.get(number - 1).copied().flatten();
            }
        }
        inner.phase = Phase::Initialized;

        inner.sync_with_hardware();
        inner.restore_persisted();

        let ok = match self.kind {
            BackendKind::Simulation => port_count_ok,
            _ => port_count_ok && configured == CHANNEL_COUNT,
        };
        if !ok {
            warn!(
                "Port configuration error: {} ports, {} configured, {} expected",
                given,
                configured,
                CHANNEL_COUNT
            );
        }
        Ok(ok)
    }

    fn validate(relay: usize) -> std::result::Result<(), UsageError> {
        if StateTable::is_valid(relay) {
            Ok(())
        } else {
            warn!("Invalid relay #: {}", relay);
            Err(UsageError::InvalidRelay {
                relay,
                max: CHANNEL_COUNT,
            })
        }
    }

    /// Drive `relay` to `state` and persist the whole table.
    pub fn set(
        &self,
        relay: usize,
        state: RelayState,
    ) -> std::result::Result<WriteOutcome, UsageError> {
        Self::validate(relay)?;
        if self.is_released() {
            return Ok(WriteOutcome::Released);
        }

        let mut inner = self.lock();
        if inner.phase == Phase::Released {
            return Ok(WriteOutcome::Released);
        }
        Ok(inner.set(relay, state))
    }

    pub fn on(&self, relay: usize) -> std::result::Result<WriteOutcome, UsageError> {
        self.set(relay, RelayState::On)
    }

    pub fn off(&self, relay: usize) -> std::result::Result<WriteOutcome, UsageError> {
        self.set(relay, RelayState::Off)
    }

    /// Flip `relay` based on its queried state.
    pub fn toggle(&self, relay: usize) -> std::result::Result<WriteOutcome, UsageError> {
        Self::validate(relay)?;
        if self.is_released() {
            return Ok(WriteOutcome::Released);
        }

        let mut inner = self.lock();
        if inner.phase == Phase::Released {
            return Ok(WriteOutcome::Released);
        }
        info!("Toggling relay: {}", relay);
        let current = inner.query(relay);
        Ok(inner.set(relay, current.toggled()))
    }

    /// Current state of `relay`, read back from hardware when possible.
    ///
    /// The resolved value is written back into the table.
    pub fn query(&self, relay: usize) -> std::result::Result<RelayState, UsageError> {
        Self::validate(relay)?;
        let mut inner = self.lock();
        if inner.phase == Phase::Released {
            return Ok(inner.table.state(relay).unwrap_or_default());
        }
        Ok(inner.query(relay))
    }

    /// Whether `relay` is on.
    pub fn status(&self, relay: usize) -> std::result::Result<bool, UsageError> {
        self.query(relay).map(RelayState::is_on)
    }

    /// Drive every relay in `ports` to `state`, pausing between channels.
    ///
    /// The lock is held for the whole sequence. A port that belongs to no
    /// relay is skipped; the rest still run.
    pub fn bulk_set(&self, ports: &[u32], state: RelayState) -> BulkReport {
        let mut report = BulkReport::default();
        if self.is_released() {
            report.interrupted = true;
            return report;
        }

        let mut inner = self.lock();
        info!("Turning {} relays {:?}", ports.len(), state);

        for (i, &port) in ports.iter().enumerate() {
            if i > 0 {
                thread::sleep(self.bulk_delay);
            }
            if self.is_released() || inner.phase == Phase::Released {
                warn!("Controller released during bulk operation, stopping");
                report.interrupted = true;
                break;
            }

            let Some(relay) = inner.table.relay_for_port(port) else {
                warn!("{}", UsageError::UnknownPort(port));
                report.rejected.push(port);
                continue;
            };
            match inner.set(relay, state) {
                WriteOutcome::Applied => report.applied += 1,
                _ => report.degraded += 1,
            }
        }

        report
    }

    pub fn all_on(&self, ports: &[u32]) -> BulkReport {
        self.bulk_set(ports, RelayState::On)
    }

    pub fn all_off(&self, ports: &[u32]) -> BulkReport {
        self.bulk_set(ports, RelayState::Off)
    }

    /// Power-cycle `relay`: off, wait `delay`, on.
    pub fn reboot(
        &self,
        relay: usize,
        delay: Duration,
    ) -> std::result::Result<WriteOutcome, UsageError> {
        Self::validate(relay)?;
        if self.is_released() {
            return Ok(WriteOutcome::Released);
        }

        let mut inner = self.lock();
        if inner.phase == Phase::Released {
            return Ok(WriteOutcome::Released);
        }
        info!("Rebooting relay {} ({:?} off)", relay, delay);
        inner.set(relay, RelayState::Off);
        thread::sleep(delay);
        if self.is_released() {
            return Ok(WriteOutcome::Released);
        }
        Ok(inner.set(relay, RelayState::On))
    }

    /// Copy of every channel.
    pub fn channels(&self) -> Vec<Channel> {
        self.lock().table.channels().to_vec()
    }

    /// Configured ports of active channels, in relay order.
    pub fn active_ports(&self) -> Vec<u32> {
        self.lock()
            .table
            .channels()
            .iter()
            .filter(|c| c.active)
            .filter_map(|c| c.port)
            .collect()
    }

    /// Configured ports of inactive channels, in relay order.
    pub fn inactive_ports(&self) -> Vec<u32> {
        self.lock()
            .table
            .channels()
            .iter()
            .filter(|c| !c.active)
            .filter_map(|c| c.port)
            .collect()
    }

    /// Release every GPIO handle. Only the first call does anything.
    ///
    /// The released flag is raised before the lock is taken, so an
    /// in-flight bulk operation stops at its next channel.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            debug!("GPIO resources already released");
            return;
        }

        let mut inner = self.lock();
        inner.backend.release();
        inner.phase = Phase::Released;
        info!("GPIO resources released");
    }
}

impl Drop for RelayController {
    fn drop(&mut self) {
        self.release();
    }
}

impl Inner {
    fn set(&mut self, relay: usize, state: RelayState) -> WriteOutcome {
        info!("Turning relay {} {:?}", relay, state);
        let line = self.table.get(relay).and_then(|c| c.line);

        let outcome = match line {
            Some(line) => match self.backend.write(line, state.level()) {
                Ok(()) => WriteOutcome::Applied,
                Err(e) => {
                    warn!("GPIO error for relay {}: {}", relay, e);
                    WriteOutcome::Degraded
                }
            },
            None => {
                debug!(relay, "No GPIO line for relay, recording state only");
                WriteOutcome::Degraded
            }
        };

        self.table.set_state(relay, state);
        self.store.save(&self.table);
        outcome
    }

    fn query(&mut self, relay: usize) -> RelayState {
        let cached = self.table.state(relay).unwrap_or_default();
        let line = self.table.get(relay).and_then(|c| c.line);

        let resolved = match line.map(|line| self.backend.read(line)) {
            Some(Ok(Some(level))) => RelayState::from_level(level),
            Some(Err(e)) => {
                warn!("Error reading actual status for relay {}: {}", relay, e);
                cached
            }
            _ => cached,
        };

        self.table.set_state(relay, resolved);
        resolved
    }

    fn sync_with_hardware(&mut self) {
        let lines: Vec<(usize, u32)> = self
            .table
            .channels()
            .iter()
            .filter_map(|c| c.line.map(|line| (c.number, line)))
            .collect();

        for (relay, line) in lines {
            match self.backend.read(line) {
                Ok(Some(level)) => {
                    let state = RelayState::from_level(level);
                    debug!(relay, line, ?level, "Synced relay with GPIO");
                    self.table.set_state(relay, state);
                }
                Ok(None) => {}
                Err(e) => debug!(relay, "Could not read GPIO {}: {}", line, e),
            }
        }
    }

    fn restore_persisted(&mut self) {
        let saved = self.store.load();
        if saved.is_empty() {
            return;
        }

        info!("Restoring previous relay states...");
        for (relay, state) in saved {
            if self.table.state(relay) != Some(state) {
                info!("Restoring relay {} to {:?}", relay, state);
                self.set(relay, state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HardwareError;
    use crate::gpio::{Level, SimulatedBackend};
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Arc;
    use std::time::Instant;

    const PORTS: [u32; 16] = crate::DEFAULT_PORTS;

    #[derive(Default)]
    struct Script {
        failing_claims: usize,
        can_recover: bool,
        fail_writes: bool,
        fail_reads: bool,
        levels: HashMap<u32, Level>,
        claims: usize,
        recovers: usize,
        releases: usize,
        writes: Vec<(u32, Level)>,
    }

    /// Backend whose behaviour is set up front and whose calls are recorded.
    struct ScriptedBackend(Arc<Mutex<Script>>);

    impl RelayBackend for ScriptedBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::LineChip
        }

        fn claim(&mut self, lines: &[u32]) -> std::result::Result<usize, HardwareError> {
            let mut s = self.0.lock().unwrap();
            s.claims += 1;
            if s.failing_claims > 0 {
                s.failing_claims -= 1;
                return Err(HardwareError::claim(lines, "Device or resource busy"));
            }
            for &line in lines {
                s.levels.entry(line).or_insert(Level::High);
            }
            Ok(lines.len())
        }

        fn recover(&mut self, _lines: &[u32]) -> bool {
            let mut s = self.0.lock().unwrap();
            s.recovers += 1;
            s.can_recover
        }

        fn write(&mut self, line: u32, level: Level) -> std::result::Result<(), HardwareError> {
            let mut s = self.0.lock().unwrap();
            if s.fail_writes {
                return Err(HardwareError::write(line, "I/O error"));
            }
            s.writes.push((line, level));
            s.levels.insert(line, level);
            Ok(())
        }

        fn read(&mut self, line: u32) -> std::result::Result<Option<Level>, HardwareError> {
            let s = self.0.lock().unwrap();
            if s.fail_reads {
                return Err(HardwareError::read(line, "I/O error"));
            }
            Ok(s.levels.get(&line).copied())
        }

        fn release(&mut self) {
            self.0.lock().unwrap().releases += 1;
        }
    }

    fn scripted(script: Script) -> (RelayController, Arc<Mutex<Script>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(script));
        let controller = RelayController::new(
            Box::new(ScriptedBackend(script.clone())),
            StateStore::new(dir.path().join("relay_states.json")),
        )
        .with_bulk_delay(Duration::ZERO)
        .with_retry_delay(Duration::ZERO);
        (controller, script, dir)
    }

    fn simulated() -> (RelayController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let controller = RelayController::new(
            Box::new(SimulatedBackend::new()),
            StateStore::new(dir.path().join("relay_states.json")),
        )
        .with_bulk_delay(Duration::ZERO);
        (controller, dir)
    }

    #[test]
    fn test_simulation_initializes_all_off() {
        let (controller, _dir) = simulated();
        assert!(controller.initialize(&PORTS).unwrap());
        assert_eq!(controller.phase(), Phase::Initialized);
        for relay in 1..=CHANNEL_COUNT {
            assert_eq!(controller.query(relay).unwrap(), RelayState::Off);
        }
    }

    #[test]
    fn test_short_port_list_is_not_ok() {
        let (controller, _dir) = simulated();
        assert!(!controller.initialize(&PORTS[..8]).unwrap());
        // the channels that do have ports still work
        assert_eq!(controller.on(1).unwrap(), WriteOutcome::Applied);
        assert_eq!(controller.on(9).unwrap(), WriteOutcome::Degraded);
        assert!(controller.status(9).unwrap());
    }

    #[test]
    fn test_long_port_list_is_not_ok() {
        let (controller, _dir) = simulated();
        let mut ports = PORTS.to_vec();
        ports.push(27);

        assert!(!controller.initialize(&ports).unwrap());
        assert_eq!(controller.channels()[15].port, Some(26));
        assert_eq!(controller.on(16).unwrap(), WriteOutcome::Applied);
    }

    #[test]
    fn test_claim_is_retried_once_after_reset() {
        let (controller, script, _dir) = scripted(Script {
            failing_claims: 1,
            can_recover: true,
            ..Default::default()
        });

        assert!(controller.initialize(&PORTS).unwrap());
        let s = script.lock().unwrap();
        assert_eq!(s.claims, 2);
        assert_eq!(s.recovers, 1);
    }

    #[test]
    fn test_claim_failure_after_retry_is_fatal() {
        let (controller, script, _dir) = scripted(Script {
            failing_claims: 2,
            can_recover: true,
            ..Default::default()
        });

        let err = controller.initialize(&PORTS).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(controller.phase(), Phase::Uninitialized);
        assert_eq!(script.lock().unwrap().claims, 2);
    }

    #[test]
    fn test_claim_failure_without_recovery_is_not_retried() {
        let (controller, script, _dir) = scripted(Script {
            failing_claims: 1,
            can_recover: false,
            ..Default::default()
        });

        assert!(controller.initialize(&PORTS).is_err());
        assert_eq!(script.lock().unwrap().claims, 1);
    }

    #[test]
    fn test_initialize_syncs_table_with_hardware() {
        let mut levels = HashMap::new();
        levels.insert(12, Level::Low);
        let (controller, _script, _dir) = scripted(Script {
            levels,
            ..Default::default()
        });

        controller.initialize(&PORTS).unwrap();
        let channels = controller.channels();
        assert_eq!(channels[1].state, RelayState::On);
        assert_eq!(channels[0].state, RelayState::Off);
    }

    #[test]
    fn test_initialize_restores_only_differing_channels() {
        let (controller, script, dir) = scripted(Script::default());
        fs::write(
            dir.path().join("relay_states.json"),
            r#"{"relay_1": 0, "relay_2": 1}"#,
        )
        .unwrap();

        controller.initialize(&PORTS).unwrap();
        assert_eq!(script.lock().unwrap().writes, vec![(10, Level::Low)]);
        assert!(controller.status(1).unwrap());
        assert!(!controller.status(2).unwrap());
    }

    #[test]
    fn test_write_failure_still_records_state() {
        let (controller, _script, dir) = scripted(Script {
            fail_writes: true,
            ..Default::default()
        });
        controller.initialize(&PORTS).unwrap();

        assert_eq!(controller.on(4).unwrap(), WriteOutcome::Degraded);
        let saved = StateStore::new(dir.path().join("relay_states.json")).load();
        assert_eq!(saved.get(&4), Some(&RelayState::On));
    }

    #[test]
    fn test_query_prefers_hardware_and_updates_cache() {
        let (controller, script, _dir) = scripted(Script::default());
        controller.initialize(&PORTS).unwrap();
        controller.on(3).unwrap();

        // someone else drove the line high
        script.lock().unwrap().levels.insert(13, Level::High);
        assert_eq!(controller.query(3).unwrap(), RelayState::Off);
        assert_eq!(controller.channels()[2].state, RelayState::Off);
    }

    #[test]
    fn test_query_falls_back_to_cache_when_read_fails() {
        let (controller, script, _dir) = scripted(Script::default());
        controller.initialize(&PORTS).unwrap();
        controller.on(3).unwrap();

        {
            let mut s = script.lock().unwrap();
            s.fail_reads = true;
            s.levels.insert(13, Level::High);
        }
        assert_eq!(controller.query(3).unwrap(), RelayState::On);
        assert_eq!(controller.channels()[2].state, RelayState::On);
    }

    #[test]
    fn test_invalid_relay_is_ignored() {
        let (controller, dir) = simulated();
        controller.initialize(&PORTS).unwrap();
        let path = dir.path().join("relay_states.json");

        assert!(controller.on(0).is_err());
        assert!(controller.off(17).is_err());
        assert!(controller.toggle(17).is_err());
        assert!(controller.query(0).is_err());
        assert!(!path.exists());
        assert!(controller.channels().iter().all(|c| c.state == RelayState::Off));
    }

    #[test]
    fn test_toggle_twice_is_identity() {
        let (controller, _dir) = simulated();
        controller.initialize(&PORTS).unwrap();

        controller.toggle(5).unwrap();
        assert!(controller.status(5).unwrap());
        controller.toggle(5).unwrap();
        assert!(!controller.status(5).unwrap());
    }

    #[test]
    fn test_bulk_set_honours_delay_floor() {
        let (controller, _dir) = simulated();
        let controller = controller.with_bulk_delay(Duration::from_millis(crate::BULK_DELAY_MS));
        controller.initialize(&PORTS).unwrap();

        let ports = &PORTS[..4];
        let started = Instant::now();
        let report = controller.all_on(ports);
        assert!(started.elapsed() >= Duration::from_millis(crate::BULK_DELAY_MS * 3));
        assert_eq!(report.applied, 4);
        for relay in 1..=4 {
            assert!(controller.status(relay).unwrap());
        }
        assert!(!controller.status(5).unwrap());
    }

    #[test]
    fn test_bulk_set_skips_unknown_ports() {
        let (controller, _dir) = simulated();
        controller.initialize(&PORTS).unwrap();

        let report = controller.all_on(&[10, 99, 12]);
        assert_eq!(report.rejected, vec![99]);
        assert_eq!(report.applied, 2);
        assert!(controller.status(2).unwrap());
    }

    #[test]
    fn test_release_stops_running_bulk() {
        let (controller, _dir) = simulated();
        let controller = Arc::new(
            controller.with_bulk_delay(Duration::from_millis(crate::BULK_DELAY_MS)),
        );
        controller.initialize(&PORTS).unwrap();

        let worker = {
            let controller = controller.clone();
            thread::spawn(move || controller.all_on(&PORTS))
        };
        thread::sleep(Duration::from_millis(crate::BULK_DELAY_MS * 2 + 100));
        controller.release();

        let report = worker.join().unwrap();
        assert!(report.interrupted);
        assert!(report.applied >= 1 && report.applied < CHANNEL_COUNT);
        assert!(controller.status(1).unwrap());
        assert!(!controller.status(CHANNEL_COUNT).unwrap());
    }

    #[test]
    fn test_concurrent_bulk_calls_do_not_interleave() {
        let (controller, _dir) = simulated();
        let controller = Arc::new(controller.with_bulk_delay(Duration::from_millis(20)));
        controller.initialize(&PORTS).unwrap();

        let workers: Vec<_> = [RelayState::On, RelayState::Off, RelayState::On]
            .into_iter()
            .map(|state| {
                let controller = controller.clone();
                thread::spawn(move || controller.bulk_set(&PORTS[..6], state))
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap().applied, 6);
        }

        // whichever call ran last owns all six relays
        let states: Vec<bool> = (1..=6).map(|r| controller.status(r).unwrap()).collect();
        assert!(states.iter().all(|&on| on == states[0]), "{:?}", states);
    }

    #[test]
    fn test_reboot_ends_on() {
        let (controller, script, _dir) = scripted(Script::default());
        controller.initialize(&PORTS).unwrap();

        controller.reboot(1, Duration::ZERO).unwrap();
        assert!(controller.status(1).unwrap());
        let s = script.lock().unwrap();
        let writes = &s.writes;
        assert_eq!(writes[writes.len() - 2..], [(10, Level::High), (10, Level::Low)]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (controller, script, dir) = scripted(Script::default());
        controller.initialize(&PORTS).unwrap();
        let path = dir.path().join("relay_states.json");

        controller.release();
        controller.release();
        assert_eq!(controller.phase(), Phase::Released);
        assert_eq!(controller.on(1).unwrap(), WriteOutcome::Released);
        assert!(!path.exists());
        assert!(controller.initialize(&PORTS).is_err());

        drop(controller);
        assert_eq!(script.lock().unwrap().releases, 1);
    }

    #[test]
    fn test_channel_config_marks_inactive() {
        let (controller, _dir) = simulated();
        let controller = controller.with_channels(&[ChannelConfig {
            channel: 2,
            name: Some("Garage".to_string()),
            active: false,
        }]);
        controller.initialize(&PORTS).unwrap();

        assert_eq!(controller.channels()[1].name, "Garage");
        assert_eq!(controller.inactive_ports(), vec![12]);
        assert_eq!(controller.active_ports().len(), CHANNEL_COUNT - 1);
    }
}
