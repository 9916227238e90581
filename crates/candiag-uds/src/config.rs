//! Client timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-client UDS timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Initial server response budget (P2), in ms.
    #[serde(default = "default_p2_ms")]
    pub p2_ms: u64,

    /// Extended budget after a response-pending notification (P2*), in ms.
    #[serde(default = "default_p2_star_ms")]
    pub p2_star_ms: u64,

    /// Consecutive 0x78 notifications tolerated before giving up.
    #[serde(default = "default_max_pending")]
    pub max_pending: u32,

    /// Adopt the P2/P2* values an ECU advertises in its session-control
    /// response. Off by default; advertised values are always reported back
    /// to the caller either way.
    #[serde(default)]
    pub adopt_server_timings: bool,
}

fn default_p2_ms() -> u64 {
    1000
}

fn default_p2_star_ms() -> u64 {
    5000
}

fn default_max_pending() -> u32 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            p2_ms: default_p2_ms(),
            p2_star_ms: default_p2_star_ms(),
            max_pending: default_max_pending(),
            adopt_server_timings: false,
        }
    }
}

impl ClientConfig {
    pub fn p2(&self) -> Duration {
        Duration::from_millis(self.p2_ms)
    }

    pub fn p2_star(&self) -> Duration {
        Duration::from_millis(self.p2_star_ms)
    }
}
