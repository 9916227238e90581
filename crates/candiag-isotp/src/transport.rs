//! Transport boundary consumed by the diagnostic core.

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::frame::CanFrame;

/// Failures reported by the underlying CAN driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("controller entered bus-off state")]
    BusOff,

    #[error("transmit buffer full")]
    TxBufferFull,

    #[error("channel disconnected")]
    Disconnected,

    #[error("driver failure: {0}")]
    Io(String),
}

/// One CAN channel with an acceptance filter.
///
/// The core treats a channel as single-threaded: it never issues concurrent
/// `send` and `recv` calls itself. Two clients sharing one channel must be
/// serialised by the host. All waits are bounded by an explicit deadline;
/// dropping an in-flight future abandons the operation at its next suspension
/// point without leaving the channel in an inconsistent state.
#[async_trait]
pub trait FrameTransport: Send {
    /// Transmit one frame. May suspend until the driver accepts it.
    async fn send(&mut self, frame: CanFrame) -> Result<(), TransportError>;

    /// Wait for the next frame passing the acceptance filter.
    ///
    /// Returns `Ok(None)` once `deadline` passes without a frame.
    async fn recv(&mut self, deadline: Instant) -> Result<Option<CanFrame>, TransportError>;

    /// Restrict `recv` to frames carrying the given arbitration id.
    fn set_filter(&mut self, accept: u32);
}
