//! Peer synchronization for networked Ludo.
//!
//! Every peer runs a [`RuleEngine`](ludo_execution::RuleEngine) behind a
//! [`SyncController`]. The controller applies local actions first and broadcasts
//! them; remote actions arrive through a [`Transport`] and are applied through the
//! engine's trusted entry points. The host additionally drives automated colors,
//! answers snapshot requests and owns reconnection windows.
//!
//! [`actor::Actor`] wraps the controller in a tokio task fed by a [`Mailbox`],
//! transport events, timer expiries and a periodic snapshot tick.

use std::str::FromStr;
use std::time::Duration;

use ludo_execution::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

pub mod actor;
pub mod autoplay;
pub mod controller;
pub mod defaults;
pub mod ingress;
pub mod network;
pub mod sequence;
pub mod session;
pub mod timers;
pub mod transport;

pub use actor::Actor;
pub use controller::{ControllerConfig, Notification, SyncController, SyncError};
pub use ingress::Mailbox;
pub use network::{LocalNetwork, LocalTransport};
pub use session::{Controller, Roster, Seat, Session};
pub use transport::{DeliveryMode, Transport, TransportError, TransportEvent};

/// Node configuration, usually read from YAML. Every field has a default.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_reconnect_timeout_ms")]
    pub reconnect_timeout_ms: u64,
    /// Period of the host's best-effort full-state broadcast.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_mailbox_size")]
    pub mailbox_size: usize,
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    #[serde(default = "default_automated_turn_limit")]
    pub automated_turn_limit: usize,
    #[serde(default = "default_hold_for_animation")]
    pub hold_for_animation: bool,
    #[serde(default = "default_reject_stale_messages")]
    pub reject_stale_messages: bool,
    /// Fixed seed for local die rolls. Unset draws from OS entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_log_level() -> String {
    defaults::DEFAULT_LOG_LEVEL.to_string()
}

fn default_reconnect_timeout_ms() -> u64 {
    defaults::DEFAULT_RECONNECT_TIMEOUT_MS
}

fn default_snapshot_interval_ms() -> u64 {
    defaults::DEFAULT_SNAPSHOT_INTERVAL_MS
}

fn default_mailbox_size() -> usize {
    defaults::DEFAULT_MAILBOX_SIZE
}

fn default_notification_capacity() -> usize {
    defaults::DEFAULT_NOTIFICATION_CAPACITY
}

fn default_automated_turn_limit() -> usize {
    defaults::DEFAULT_AUTOMATED_TURN_LIMIT
}

fn default_hold_for_animation() -> bool {
    defaults::DEFAULT_HOLD_FOR_ANIMATION
}

fn default_reject_stale_messages() -> bool {
    defaults::DEFAULT_REJECT_STALE_MESSAGES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            reconnect_timeout_ms: default_reconnect_timeout_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            mailbox_size: default_mailbox_size(),
            notification_capacity: default_notification_capacity(),
            automated_turn_limit: default_automated_turn_limit(),
            hold_for_animation: default_hold_for_animation(),
            reject_stale_messages: default_reject_stale_messages(),
            rng_seed: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: usize },
}

#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    pub log_level: Level,
    pub snapshot_interval: Duration,
    pub mailbox_size: usize,
    pub notification_capacity: usize,
    pub engine: EngineConfig,
    pub controller: ControllerConfig,
    pub rng_seed: Option<u64>,
}

fn ensure_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn ensure_nonzero_u64(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value: 0 });
    }
    Ok(())
}

impl Config {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        ensure_nonzero_u64("reconnect_timeout_ms", self.reconnect_timeout_ms)?;
        ensure_nonzero_u64("snapshot_interval_ms", self.snapshot_interval_ms)?;
        ensure_nonzero("mailbox_size", self.mailbox_size)?;
        ensure_nonzero("notification_capacity", self.notification_capacity)?;
        ensure_nonzero("automated_turn_limit", self.automated_turn_limit)?;

        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        Ok(ValidatedConfig {
            log_level,
            snapshot_interval: Duration::from_millis(self.snapshot_interval_ms),
            mailbox_size: self.mailbox_size,
            notification_capacity: self.notification_capacity,
            engine: EngineConfig {
                hold_for_animation: self.hold_for_animation,
            },
            controller: ControllerConfig {
                reconnect_timeout: Duration::from_millis(self.reconnect_timeout_ms),
                automated_turn_limit: self.automated_turn_limit,
                reject_stale_messages: self.reject_stale_messages,
            },
            rng_seed: self.rng_seed,
        })
    }
}
