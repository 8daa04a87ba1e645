//! Relay channels and the fixed-size state table.

use crate::gpio::Level;
use crate::CHANNEL_COUNT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical state of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    On,
    #[default]
    Off,
}

impl RelayState {
    pub fn is_on(self) -> bool {
        self == RelayState::On
    }

    pub fn toggled(self) -> Self {
        match self {
            RelayState::On => RelayState::Off,
            RelayState::Off => RelayState::On,
        }
    }

    /// Output level for this state. The relay board is active-low.
    pub fn level(self) -> Level {
        match self {
            RelayState::On => Level::Low,
            RelayState::Off => Level::High,
        }
    }

    pub fn from_level(level: Level) -> Self {
        match level {
            Level::Low => RelayState::On,
            Level::High => RelayState::Off,
        }
    }

    /// Value written to the state file (0 = on, 1 = off).
    pub fn persisted_value(self) -> u8 {
        self.level().as_u8()
    }

    pub fn from_persisted(value: u64) -> Option<Self> {
        match value {
            0 => Some(RelayState::On),
            1 => Some(RelayState::Off),
            _ => None,
        }
    }
}

impl From<bool> for RelayState {
    fn from(on: bool) -> Self {
        if on {
            RelayState::On
        } else {
            RelayState::Off
        }
    }
}

/// Relay number -> state, as read from the state file.
pub type PersistedStates = BTreeMap<usize, RelayState>;

/// One relay channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// 1-based relay number
    pub number: usize,
    pub name: String,
    /// Configured port, as given to initialize
    pub port: Option<u32>,
    /// Chip line the port resolved to
    pub line: Option<u32>,
    pub state: RelayState,
    /// Whether the channel is exposed to bulk operations and the UI
    pub active: bool,
}

impl Channel {
    fn new(number: usize) -> Self {
        Self {
            number,
            name: format!("Relay {}", number),
            port: None,
            line: None,
            state: RelayState::Off,
            active: true,
        }
    }
}

/// Per-channel state, indexed by relay number - 1. Never resized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTable {
    channels: [Channel; CHANNEL_COUNT],
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTable {
    /// All channels off, active, and without a pin.
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|i| Channel::new(i + 1)),
        }
    }

    /// A fresh table seeded from persisted states.
    pub fn from_persisted(states: &PersistedStates) -> Self {
        let mut table = Self::new();
        for (&relay, &state) in states {
            table.set_state(relay, state);
        }
        table
    }

    pub fn is_valid(relay: usize) -> bool {
        (1..=CHANNEL_COUNT).contains(&relay)
    }

    pub fn get(&self, relay: usize) -> Option<&Channel> {
        relay.checked_sub(1).and_then(|i| self.channels.get(i))
    }

    pub(crate) fn get_mut(&mut self, relay: usize) -> Option<&mut Channel> {
        relay.checked_sub(1).and_then(|i| self.channels.get_mut(i))
    }

    pub fn state(&self, relay: usize) -> Option<RelayState> {
        self.get(relay).map(|c| c.state)
    }

    /// Returns `false` when `relay` is out of range.
    pub fn set_state(&mut self, relay: usize, state: RelayState) -> bool {
        match self.get_mut(relay) {
            Some(channel) => {
                channel.state = state;
                true
            }
            None => false,
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Relay number assigned to `port`.
    pub fn relay_for_port(&self, port: u32) -> Option<usize> {
        self.channels
            .iter()
            .find(|c| c.port == Some(port))
            .map(|c| c.number)
    }

    /// Every channel's state, keyed by relay number.
    pub fn to_persisted(&self) -> PersistedStates {
        self.channels.iter().map(|c| (c.number, c.state)).collect()
    }
}
