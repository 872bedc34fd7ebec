//! Library half of the `claw` binary: configuration and persisted state.

pub mod config;
pub mod state;

pub use config::{ClawConfig, ConfigError};
pub use state::{Session, StateError, STATE_FILE};
