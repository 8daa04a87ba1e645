//! Last-known relay states on disk.
//!
//! The file is a flat JSON object, `{"relay_1": 1, "relay_2": 0, ...}`, with
//! 0 for on and 1 for off. It is rewritten in full after every change.

use super::state::{PersistedStates, RelayState, StateTable};
use crate::error::Result;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const KEY_PREFIX: &str = "relay_";

/// Reads and writes the relay state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every channel's state. Failures are logged, not returned.
    pub fn save(&self, table: &StateTable) {
        match self.try_save(table) {
            Ok(()) => debug!("Relay states saved to {}", self.path.display()),
            Err(e) => error!("Error saving relay states to {}: {}", self.path.display(), e),
        }
    }

    /// Write every channel's state atomically (temp file + rename).
    pub fn try_save(&self, table: &StateTable) -> Result<()> {
        let record: Map<String, Value> = table
            .to_persisted()
            .into_iter()
            .map(|(relay, state)| (key_for(relay), Value::from(state.persisted_value())))
            .collect();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&record)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Stored states. An absent or unreadable file yields an empty map.
    pub fn load(&self) -> PersistedStates {
        if !self.path.exists() {
            info!("No saved relay states found");
            return PersistedStates::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Error reading relay states: {}", e);
                return PersistedStates::new();
            }
        };

        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(record) => {
                let states = parse_record(&record);
                info!(
                    "Loaded {} relay states from {}",
                    states.len(),
                    self.path.display()
                );
                states
            }
            Err(e) => {
                warn!("Ignoring malformed relay state file: {}", e);
                PersistedStates::new()
            }
        }
    }
}

fn key_for(relay: usize) -> String {
    format!("{}{}", KEY_PREFIX, relay)
}

fn parse_record(record: &Map<String, Value>) -> PersistedStates {
    let mut states = PersistedStates::new();

    for (key, value) in record {
        let relay = key
            .strip_prefix(KEY_PREFIX)
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&n| StateTable::is_valid(n));
        let state = value.as_u64().and_then(RelayState::from_persisted);

        match (relay, state) {
            (Some(relay), Some(state)) => {
                states.insert(relay, state);
            }
            _ => debug!(key = %key, value = %value, "Skipping unrecognised state entry"),
        }
    }

    states
}
