//! Relay channels, their persisted state, and the controller that drives
//! them.

pub mod controller;
pub mod state;
pub mod store;

pub use controller::{BulkReport, Phase, RelayController, WriteOutcome};
pub use state::{Channel, PersistedStates, RelayState, StateTable};
pub use store::StateStore;
