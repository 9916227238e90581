//! Diagnostic client errors.

use std::fmt;

use thiserror::Error;

use candiag_isotp::{ChannelError, IsoTpError, TransportError};

use crate::nrc::NegativeResponseCode;

/// Which response window expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Initial server response budget.
    P2,
    /// Extended budget after a response-pending notification.
    P2Star,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::P2 => f.write_str("P2"),
            TimeoutPhase::P2Star => f.write_str("P2*"),
        }
    }
}

/// Every failure mode of one diagnostic transaction.
///
/// ISO-TP decoding failures never surface as [`DiagError::UdsNegative`], and
/// the pending code 0x78 is consumed inside the client; it only becomes
/// visible as [`DiagError::PendingAbuse`] past the configured cap.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagError {
    /// Underlying CAN driver failure.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// No complete response within the `P2`/`P2*` window.
    #[error("no response within the {phase} window")]
    Timeout { phase: TimeoutPhase },

    /// Segmentation or reassembly failed; the transaction is unrecoverable.
    #[error("ISO-TP failure: {0}")]
    IsoTp(#[from] IsoTpError),

    /// Well-formed negative response from the ECU.
    #[error("negative response {code} (0x{code:02X}) for service 0x{service:02X}")]
    UdsNegative {
        service: u8,
        code: NegativeResponseCode,
    },

    /// The ECU kept answering 0x78 past the configured cap.
    #[error("exceeded {0} consecutive response-pending notifications")]
    PendingAbuse(u32),

    /// Response parsed but did not match the requested service.
    #[error("response did not match service 0x{service:02X}: {detail}")]
    MalformedResponse { service: u8, detail: String },
}

impl From<ChannelError> for DiagError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Transport(e) => DiagError::Transport(e),
            ChannelError::Protocol(e) => DiagError::IsoTp(e),
        }
    }
}
