//! ISO-TP channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-channel ISO-TP options.
///
/// Padding is an ISO 15765 profile choice: some ECUs reject unpadded frames
/// while others insist on a particular fill byte, so both the policy and the
/// byte are configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsoTpConfig {
    /// Pad transmitted frames to the full 8 bytes.
    #[serde(default = "default_use_padding")]
    pub use_padding: bool,

    /// Fill byte used when padding.
    #[serde(default)]
    pub padding_byte: u8,

    /// Block size advertised in emitted flow control (0 = unlimited).
    #[serde(default)]
    pub block_size: u8,

    /// STmin advertised in emitted flow control (raw byte encoding).
    #[serde(default)]
    pub st_min: u8,

    /// Window for the peer's flow control after a first frame, in ms.
    #[serde(default = "default_window_ms")]
    pub fc_timeout_ms: u64,

    /// Window between consecutive frames on receive, in ms.
    #[serde(default = "default_window_ms")]
    pub cf_timeout_ms: u64,

    /// Consecutive Wait flow controls tolerated before aborting a send.
    #[serde(default = "default_max_wait_frames")]
    pub max_wait_frames: u32,
}

fn default_use_padding() -> bool {
    true
}

fn default_window_ms() -> u64 {
    1000
}

fn default_max_wait_frames() -> u32 {
    10
}

impl Default for IsoTpConfig {
    fn default() -> Self {
        Self {
            use_padding: default_use_padding(),
            padding_byte: 0x00,
            block_size: 0,
            st_min: 0,
            fc_timeout_ms: default_window_ms(),
            cf_timeout_ms: default_window_ms(),
            max_wait_frames: default_max_wait_frames(),
        }
    }
}

impl IsoTpConfig {
    /// Padding to apply on transmit, `None` when frames are left short.
    pub fn frame_padding(&self) -> Option<u8> {
        self.use_padding.then_some(self.padding_byte)
    }

    pub fn fc_timeout(&self) -> Duration {
        Duration::from_millis(self.fc_timeout_ms)
    }

    pub fn cf_timeout(&self) -> Duration {
        Duration::from_millis(self.cf_timeout_ms)
    }
}
