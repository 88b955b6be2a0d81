//! Client session settings.

use crate::history::DEFAULT_MAX_HISTORY;
use crate::snap::SNAP_THRESHOLD;
use crate::sync::UserInfo;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RELAY_URL: &str = "ws://localhost:3030/ws";
pub const DEFAULT_PRESENCE_INTERVAL_MS: u64 = 50;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Settings for a [`BoardSession`](crate::BoardSession).
///
/// Every field has a default, so partial JSON such as `{"max_history": 10}`
/// is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub relay_url: String,
    /// Anchors closer than this (strictly) capture a free connector endpoint.
    pub snap_threshold: f64,
    /// Undo steps kept per client; the oldest is dropped beyond this.
    pub max_history: usize,
    /// Minimum gap between outgoing cursor updates.
    pub presence_interval_ms: u64,
    /// Minimum gap between reconnect attempts after the relay drops.
    pub reconnect_delay_ms: u64,
    pub user: UserInfo,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            snap_threshold: SNAP_THRESHOLD,
            max_history: DEFAULT_MAX_HISTORY,
            presence_interval_ms: DEFAULT_PRESENCE_INTERVAL_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            user: UserInfo::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_millis(self.presence_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
