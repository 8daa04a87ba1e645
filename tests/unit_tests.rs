use pi_relay::{
    relay::{RelayState, StateStore, StateTable},
    gpio::resolve_ports,
    to_chip_pin, PinNumbering, RelayConfig, RelayController, SimulatedBackend, WebConfig,
    CHANNEL_COUNT, DEFAULT_PORTS,
};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

fn controller_at(state_file: &Path) -> RelayController {
    RelayController::new(Box::new(SimulatedBackend::new()), StateStore::new(state_file))
        .with_bulk_delay(Duration::ZERO)
}

/// Turning a relay on is visible through query and the state file
#[test]
fn test_set_then_query_and_persist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay_states.json");
    let controller = controller_at(&path);
    controller.initialize(&DEFAULT_PORTS).unwrap();

    controller.on(7).unwrap();
    assert_eq!(controller.query(7).unwrap(), RelayState::On);
    assert_eq!(
        StateStore::new(&path).load().get(&7),
        Some(&RelayState::On)
    );
}

/// A fresh simulated controller reports every relay off
#[test]
fn test_simulation_starts_all_off() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller_at(&dir.path().join("relay_states.json"));
    assert!(controller.initialize(&DEFAULT_PORTS).unwrap());

    for relay in 1..=CHANNEL_COUNT {
        assert!(!controller.status(relay).unwrap(), "relay {}", relay);
    }
}

/// Toggle is its own inverse
#[test]
fn test_toggle_twice() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller_at(&dir.path().join("relay_states.json"));
    controller.initialize(&DEFAULT_PORTS).unwrap();
    controller.on(12).unwrap();

    controller.toggle(12).unwrap();
    controller.toggle(12).unwrap();
    assert!(controller.status(12).unwrap());
}

/// Bulk writes are spaced by the bulk delay
#[test]
fn test_bulk_set_timing() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller_at(&dir.path().join("relay_states.json"))
        .with_bulk_delay(Duration::from_millis(pi_relay::BULK_DELAY_MS));
    controller.initialize(&DEFAULT_PORTS).unwrap();

    let ports = [10, 12, 13];
    let started = Instant::now();
    let report = controller.all_on(&ports);

    assert!(started.elapsed() >= Duration::from_millis(2 * pi_relay::BULK_DELAY_MS));
    assert_eq!(report.applied, ports.len());
    assert!((1..=3).all(|relay| controller.status(relay).unwrap()));
}

/// Channels missing from the state file start off
#[test]
fn test_partial_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay_states.json");
    fs::write(&path, r#"{"relay_4": 0}"#).unwrap();

    let controller = controller_at(&path);
    controller.initialize(&DEFAULT_PORTS).unwrap();

    assert!(controller.status(4).unwrap());
    for relay in (1..=CHANNEL_COUNT).filter(|&r| r != 4) {
        assert!(!controller.status(relay).unwrap(), "relay {}", relay);
    }
}

/// Out-of-range relays touch neither the table nor the file
#[test]
fn test_out_of_range_relay_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay_states.json");
    let controller = controller_at(&path);
    controller.initialize(&DEFAULT_PORTS).unwrap();
    controller.on(1).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    assert!(controller.on(0).is_err());
    assert!(controller.on(17).is_err());
    assert!(controller.off(17).is_err());

    assert_eq!(fs::read_to_string(&path).unwrap(), before);
    let on: Vec<usize> = controller
        .channels()
        .iter()
        .filter(|c| c.state.is_on())
        .map(|c| c.number)
        .collect();
    assert_eq!(on, vec![1]);
}

/// Release can be called any number of times
#[test]
fn test_release_twice() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller_at(&dir.path().join("relay_states.json"));
    controller.initialize(&DEFAULT_PORTS).unwrap();

    controller.release();
    controller.release();
    assert!(controller.is_released());
}

/// The standard board wiring survives a restart
#[test]
fn test_restart_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay_states.json");

    {
        let controller = controller_at(&path);
        assert!(controller.initialize(&DEFAULT_PORTS).unwrap());
        controller.on(1).unwrap();
    }

    let table = StateTable::from_persisted(&StateStore::new(&path).load());
    assert_eq!(table.state(1), Some(RelayState::On));
    for relay in 2..=CHANNEL_COUNT {
        assert_eq!(table.state(relay), Some(RelayState::Off));
    }

    let restarted = controller_at(&path);
    restarted.initialize(&DEFAULT_PORTS).unwrap();
    assert!(restarted.status(1).unwrap());
    assert!(!restarted.status(2).unwrap());
}

/// Header pins translate, chip lines pass through
#[test]
fn test_pin_translation() {
    assert_eq!(to_chip_pin(11), Some(17));
    assert_eq!(to_chip_pin(17), Some(17));
    assert_eq!(to_chip_pin(39), None);
    assert_eq!(
        resolve_ports(&[11, 12], PinNumbering::Header),
        vec![Some(17), Some(18)]
    );
}

/// Config file values reach the controller
#[test]
fn test_config_drives_controller() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("relay.json");
    let state_path = dir.path().join("state").join("relays.json");
    fs::write(
        &config_path,
        serde_json::json!({
            "backend": "simulation",
            "state_file": state_path,
            "bulk_delay_ms": 0,
            "channels": [{"channel": 16, "name": "Spare", "active": "false"}]
        })
        .to_string(),
    )
    .unwrap();

    let config = RelayConfig::load(&config_path).unwrap();
    let controller = RelayController::from_config(&config);
    assert!(controller.initialize(&config.ports).unwrap());

    assert_eq!(controller.inactive_ports(), vec![26]);
    controller.all_on(&controller.active_ports());
    assert!(!controller.status(16).unwrap());
    assert!(state_path.exists());
}

/// Test WebConfig builder pattern
#[test]
fn test_web_config_builder() {
    let config = WebConfig::new("127.0.0.1", 8080)
        .with_cors(false)
        .with_static_path(Some("/var/www".to_string()));

    assert_eq!(config.bind_address(), "127.0.0.1:8080");
    assert!(!config.enable_cors);
    assert_eq!(config.static_path.as_deref(), Some("/var/www"));
}
