//! `candiag-uds`: UDS (ISO 14229) diagnostic client over ISO-TP.
//!
//! A host application expresses high-level diagnostic intents (read an
//! identifier, read trouble codes, unlock security, reset the ECU); this
//! crate turns them into UDS request bytes, drives the ISO-TP transfer over a
//! caller-supplied [`FrameTransport`], interprets positive and negative
//! responses including the deferred response-pending signal, and surfaces a
//! typed result.
//!
//! # Architecture
//!
//! ```text
//!  caller ──▶ UdsClient ──▶ IsoTpEncoder ──▶ FrameTransport
//!                                                  │
//!  caller ◀── UdsClient ◀── IsoTpDecoder ◀─────────┘
//! ```
//!
//! The client is generic over the transport so the frame-in/frame-out hot
//! path is monomorphised. Which ECU to talk to is the caller's decision: one
//! [`ModuleAddress`] is passed per client, and nothing here schedules
//! keep-alives or persists state.
//!
//! # Example
//!
//! ```ignore
//! use candiag_uds::{ModuleAddress, UdsClient};
//!
//! let address = ModuleAddress::standard(0x7E0, 0x7E8)?;
//! let mut client = UdsClient::new(transport, address);
//! let vin = client.read_data_by_identifier(0xF190).await?;
//! println!("VIN: {}", String::from_utf8_lossy(&vin.value));
//! ```

pub mod client;
pub mod config;
pub mod dtc;
pub mod error;
pub mod nrc;
pub mod request;
pub mod response;
pub mod security;

pub use client::{DataRecord, SessionInfo, UdsClient};
pub use config::ClientConfig;
pub use dtc::{parse_dtc_report, Dtc, DtcCategory, DtcReport, DtcStatus};
pub use error::{DiagError, TimeoutPhase};
pub use nrc::NegativeResponseCode;
pub use request::UdsRequest;
pub use response::UdsResponse;
pub use security::{
    DenyReason, InvalidSecurityLevel, KeyDerivation, SecurityAccess, SecurityAccessOutcome,
    SecurityLevel, SeedKeyObservation,
};

// The transport surface callers implement and configure.
pub use candiag_isotp::{
    CanAddressing, CanFrame, CanId, FrameError, FrameTransport, IsoTpConfig, IsoTpError,
    ModuleAddress, TransportError,
};

/// Standard UDS data identifiers (ISO 14229-1 Annex C) commonly read during
/// module identification.
pub mod standard_did {
    /// Active diagnostic session
    pub const ACTIVE_DIAGNOSTIC_SESSION: u16 = 0xF186;
    /// Vehicle Identification Number
    pub const VIN: u16 = 0xF190;
    /// ECU hardware number
    pub const ECU_HARDWARE_NUMBER: u16 = 0xF191;
    /// ECU software number
    pub const ECU_SOFTWARE_NUMBER: u16 = 0xF188;
    /// ECU software version
    pub const ECU_SOFTWARE_VERSION: u16 = 0xF189;
    /// ECU serial number
    pub const ECU_SERIAL_NUMBER: u16 = 0xF18C;
}
