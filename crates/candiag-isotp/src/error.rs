//! ISO-TP error types.

use thiserror::Error;

use crate::transport::TransportError;

/// Protocol-level ISO-TP failures. None of these are recoverable within the
/// transaction that observed them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IsoTpError {
    #[error("consecutive frame out of order")]
    SequenceError,

    #[error("consecutive frame with no transfer in progress")]
    UnexpectedConsecutive,

    #[error("new message started before the previous transfer completed")]
    InterleavedMessage,

    #[error("segmented transfer stalled past the consecutive-frame window")]
    ReassemblyTimeout,

    #[error("first frame declared {0} bytes, below the multi-frame minimum")]
    InvalidFirstFrameLength(u16),

    #[error("reserved STmin value 0x{0:02X}")]
    InvalidStMin(u8),

    #[error("flow-control frame carried a reserved status")]
    FlowControlAbort,

    #[error("receiver reported overflow")]
    FlowControlOverflow,

    #[error("no flow control within the handshake window")]
    FlowControlTimeout,

    #[error("receiver exceeded the wait-frame cap")]
    TooManyWaits,

    #[error("payload of {0} bytes exceeds the 4095-byte ISO-TP limit")]
    PayloadTooLarge(usize),

    #[error("cannot transmit an empty payload")]
    EmptyPayload,

    #[error("frame does not carry a valid ISO-TP PCI")]
    MalformedFrame,
}

/// Combined failure surface of one ISO-TP channel operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] IsoTpError),
}
