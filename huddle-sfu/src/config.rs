//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use huddle_core::config::RoomsConfig;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfuConfig {
    /// Length of generated room names
    pub generated_name_length: usize,
    /// Maximum accepted room name length (characters)
    pub max_room_name_length: usize,
    /// Lifetime of a generated name nobody has joined
    pub reservation_ttl: Duration,
    /// Interval of the background reservation sweep
    pub sweep_interval: Duration,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            generated_name_length: 8,
            max_room_name_length: 64,
            reservation_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl From<&RoomsConfig> for SfuConfig {
    fn from(config: &RoomsConfig) -> Self {
        Self {
            generated_name_length: config.generated_name_length,
            max_room_name_length: config.max_room_name_length,
            reservation_ttl: Duration::from_secs(config.reservation_ttl_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }
}
