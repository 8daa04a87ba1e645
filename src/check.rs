//! Pre-flight checks for running the relay controller on a Raspberry Pi.
//!
//! Each check appends a [`DiagItem`]. Only `Err` items are blocking; a
//! missing GPIO tool or a user outside the `gpio` group is a warning, since
//! the controller can still run (possibly in simulation).

use crate::config::RelayConfig;
use crate::gpio::{self, BackendKind};
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Free space below this on the state file's disk is a warning.
pub const MIN_FREE_MB: u64 = 500;

const GPIO_TOOLS: [&str; 2] = ["gpioset", "gpioinfo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Warn,
    Err,
}

impl Severity {
    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Ok => "[ok]",
            Severity::Warn => "[warn]",
            Severity::Err => "[ERR]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagItem {
    pub severity: Severity,
    pub category: &'static str,
    pub message: String,
}

impl DiagItem {
    fn new(severity: Severity, category: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
        }
    }
}

/// Whether any check failed hard.
pub fn has_failures(diags: &[DiagItem]) -> bool {
    diags.iter().any(|d| d.severity == Severity::Err)
}

pub fn run_checks(config: &RelayConfig) -> Vec<DiagItem> {
    let mut diags = Vec::new();

    check_board(&mut diags);
    check_gpio_tools(&mut diags);
    check_gpio_device(&config.chip_path, &mut diags);
    check_gpio_group(&mut diags);
    check_backends(config, &mut diags);

    let state_dir = state_dir(&config.state_file);
    check_disk_space(&state_dir, &mut diags);
    check_state_dir_writable(&state_dir, &mut diags);

    diags
}

fn check_board(diags: &mut Vec<DiagItem>) {
    let description = fs::read_to_string("/proc/device-tree/model")
        .or_else(|_| fs::read_to_string("/proc/cpuinfo"));

    match description {
        Ok(text) => {
            let (severity, message) = classify_model(&text);
            diags.push(DiagItem::new(severity, "board", message));
        }
        Err(e) => diags.push(DiagItem::new(
            Severity::Err,
            "board",
            format!("Cannot detect Raspberry Pi: {}", e),
        )),
    }
}

/// Grade a device-tree model string or `/proc/cpuinfo` dump.
pub fn classify_model(text: &str) -> (Severity, String) {
    if !text.contains("Raspberry Pi") {
        return (Severity::Err, "Not running on Raspberry Pi".to_string());
    }

    if text.contains("Pi 5") {
        (Severity::Ok, "Raspberry Pi 5 detected".to_string())
    } else if text.contains("Pi 4") {
        (
            Severity::Warn,
            "Raspberry Pi 4 detected - Pi 5 recommended".to_string(),
        )
    } else {
        (
            Severity::Warn,
            "Older Raspberry Pi detected - Pi 5 recommended".to_string(),
        )
    }
}

fn check_gpio_tools(diags: &mut Vec<DiagItem>) {
    let path = env::var_os("PATH").unwrap_or_default();
    for tool in GPIO_TOOLS {
        match find_in_path(tool, &path) {
            Some(found) => diags.push(DiagItem::new(
                Severity::Ok,
                "gpio",
                format!("{} found at {}", tool, found.display()),
            )),
            None => diags.push(DiagItem::new(
                Severity::Warn,
                "gpio",
                format!("{} not found in PATH (install gpiod)", tool),
            )),
        }
    }
}

/// First file called `name` in a PATH-style list of directories.
pub fn find_in_path(name: &str, path: &OsStr) -> Option<PathBuf> {
    env::split_paths(path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn check_gpio_device(chip_path: &Path, diags: &mut Vec<DiagItem>) {
    if !chip_path.exists() {
        diags.push(DiagItem::new(
            Severity::Warn,
            "gpio",
            format!("{} not present", chip_path.display()),
        ));
        return;
    }

    match fs::OpenOptions::new().read(true).open(chip_path) {
        Ok(_) => diags.push(DiagItem::new(
            Severity::Ok,
            "gpio",
            format!("{} accessible", chip_path.display()),
        )),
        Err(e) => diags.push(DiagItem::new(
            Severity::Warn,
            "gpio",
            format!("{} not accessible: {}", chip_path.display(), e),
        )),
    }
}

fn check_gpio_group(diags: &mut Vec<DiagItem>) {
    let user = env::var("USER").unwrap_or_default();
    let groups = fs::read_to_string("/etc/group").unwrap_or_default();

    let item = match group_members(&groups, "gpio") {
        None => DiagItem::new(Severity::Warn, "gpio", "gpio group not found"),
        Some(members) if members.iter().any(|m| *m == user) => DiagItem::new(
            Severity::Ok,
            "gpio",
            format!("User '{}' is in gpio group", user),
        ),
        Some(_) => DiagItem::new(
            Severity::Warn,
            "gpio",
            format!("User '{}' not in gpio group", user),
        ),
    };
    diags.push(item);
}

/// Members of `group` from an `/etc/group`-format listing.
pub fn group_members<'a>(listing: &'a str, group: &str) -> Option<Vec<&'a str>> {
    listing.lines().find_map(|line| {
        let mut fields = line.split(':');
        if fields.next()? != group {
            return None;
        }
        let members = fields.nth(2).unwrap_or("");
        Some(members.split(',').filter(|m| !m.is_empty()).collect())
    })
}

fn check_backends(config: &RelayConfig, diags: &mut Vec<DiagItem>) {
    let compiled = gpio::compiled_backends();
    let names: Vec<String> = compiled.iter().map(ToString::to_string).collect();

    if compiled == [BackendKind::Simulation] {
        diags.push(DiagItem::new(
            Severity::Warn,
            "backend",
            "No hardware backends compiled in (build with --features hardware)",
        ));
    } else {
        diags.push(DiagItem::new(
            Severity::Ok,
            "backend",
            format!("Compiled backends: {}", names.join(", ")),
        ));
    }

    let selected = gpio::select_backend(&config.backend_settings()).kind();
    let severity = if selected == BackendKind::Simulation {
        Severity::Warn
    } else {
        Severity::Ok
    };
    diags.push(DiagItem::new(
        severity,
        "backend",
        format!("GPIO backend in use: {}", selected),
    ));
}

fn state_dir(state_file: &Path) -> PathBuf {
    match state_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn check_disk_space(dir: &Path, diags: &mut Vec<DiagItem>) {
    let target = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let disks = Disks::new_with_refreshed_list();

    let disk = disks
        .list()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match disk {
        Some(disk) => {
            let free_mb = disk.available_space() / (1024 * 1024);
            if free_mb >= MIN_FREE_MB {
                diags.push(DiagItem::new(
                    Severity::Ok,
                    "disk",
                    format!("Available disk space: {} MB", free_mb),
                ));
            } else {
                diags.push(DiagItem::new(
                    Severity::Warn,
                    "disk",
                    format!("Low disk space: {} MB - {} MB recommended", free_mb, MIN_FREE_MB),
                ));
            }
        }
        None => diags.push(DiagItem::new(
            Severity::Warn,
            "disk",
            format!("Could not determine disk for {}", target.display()),
        )),
    }
}

fn check_state_dir_writable(dir: &Path, diags: &mut Vec<DiagItem>) {
    let probe = dir.join(".pi_relay_check_probe");
    match fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            diags.push(DiagItem::new(
                Severity::Ok,
                "state",
                format!("State directory writable: {}", dir.display()),
            ));
        }
        Err(e) => diags.push(DiagItem::new(
            Severity::Err,
            "state",
            format!("State directory not writable: {} ({})", dir.display(), e),
        )),
    }
}
