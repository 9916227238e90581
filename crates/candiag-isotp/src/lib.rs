//! `candiag-isotp`: ISO 15765-2 (ISO-TP) segmentation and reassembly over
//! raw CAN frames.
//!
//! ISO-TP carries payloads of up to 4095 bytes across fixed 8-byte CAN
//! frames by segmenting them into a first frame plus consecutive frames,
//! regulated by flow-control feedback from the receiver. Small payloads fit
//! a single frame.
//!
//! This crate provides:
//! - the frame model ([`CanFrame`], [`CanId`], [`ModuleAddress`]),
//! - the [`FrameTransport`] capability the diagnostic core consumes,
//! - PCI encoding/decoding ([`IsoTpFrame`]),
//! - the send path ([`IsoTpEncoder`]) with the flow-control handshake, and
//! - the receive-side reassembler ([`IsoTpDecoder`]).
//!
//! No CAN driver ships here; callers supply a [`FrameTransport`] bound to
//! whatever hardware or simulation they have. A receive either completes
//! fully or fails with an [`IsoTpError`]; partial payloads are never
//! surfaced.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod pci;
pub mod transport;

pub use config::IsoTpConfig;
pub use decoder::{FeedOutcome, IsoTpDecoder};
pub use encoder::IsoTpEncoder;
pub use error::{ChannelError, IsoTpError};
pub use frame::{CanAddressing, CanFrame, CanId, FrameError, ModuleAddress, MAX_FRAME_DATA};
pub use pci::{decode_st_min, encode_st_min, FlowStatus, IsoTpFrame, MAX_PAYLOAD};
pub use transport::{FrameTransport, TransportError};
