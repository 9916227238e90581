//! CAN frame and diagnostic addressing primitives.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum data length of a classic CAN frame.
pub const MAX_FRAME_DATA: usize = 8;

/// Largest valid 11-bit arbitration identifier.
pub const STANDARD_ID_MAX: u32 = 0x7FF;

/// Largest valid 29-bit arbitration identifier.
pub const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

/// Errors constructing frames or module addresses.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("CAN payload of {0} bytes exceeds the 8-byte frame limit")]
    PayloadTooLong(usize),

    #[error("identifier 0x{0:X} does not fit 11-bit standard addressing")]
    StandardIdOutOfRange(u32),

    #[error("identifier 0x{0:X} does not fit 29-bit extended addressing")]
    ExtendedIdOutOfRange(u32),
}

/// CAN arbitration identifier, 11-bit standard or 29-bit extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanId {
    Standard(u16),
    Extended(u32),
}

impl CanId {
    /// Build an 11-bit identifier, rejecting values above 0x7FF.
    pub fn standard(raw: u32) -> Result<Self, FrameError> {
        if raw > STANDARD_ID_MAX {
            return Err(FrameError::StandardIdOutOfRange(raw));
        }
        Ok(CanId::Standard(raw as u16))
    }

    /// Build a 29-bit identifier, rejecting values above 0x1FFF_FFFF.
    pub fn extended(raw: u32) -> Result<Self, FrameError> {
        if raw > EXTENDED_ID_MAX {
            return Err(FrameError::ExtendedIdOutOfRange(raw));
        }
        Ok(CanId::Extended(raw))
    }

    /// Raw arbitration id value.
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Standard(id) => u32::from(*id),
            CanId::Extended(id) => *id,
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

/// A raw CAN data frame: arbitration id plus up to eight data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: CanId,
    data: Vec<u8>,
}

impl CanFrame {
    /// Build a frame, rejecting payloads longer than eight bytes.
    pub fn new(id: CanId, data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_FRAME_DATA {
            return Err(FrameError::PayloadTooLong(data.len()));
        }
        Ok(Self {
            id,
            data: data.to_vec(),
        })
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Addressing mode of one diagnostic channel, fixed per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanAddressing {
    /// 11-bit arbitration identifiers.
    Standard,
    /// 29-bit arbitration identifiers.
    Extended,
}

/// One ECU on the bus.
///
/// Requests are transmitted to `request_id`; responses are accepted from
/// `response_id`. The common 11-bit FCA pattern is `request_id` in
/// `0x7E0..=0x7E7` with `response_id = request_id + 8`, but any valid pair is
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAddress {
    pub request_id: u32,
    pub response_id: u32,
    pub addressing: CanAddressing,
}

impl ModuleAddress {
    /// Build an address pair, validating both ids against the addressing mode.
    pub fn new(
        request_id: u32,
        response_id: u32,
        addressing: CanAddressing,
    ) -> Result<Self, FrameError> {
        match addressing {
            CanAddressing::Standard => {
                CanId::standard(request_id)?;
                CanId::standard(response_id)?;
            }
            CanAddressing::Extended => {
                CanId::extended(request_id)?;
                CanId::extended(response_id)?;
            }
        }
        Ok(Self {
            request_id,
            response_id,
            addressing,
        })
    }

    /// Convenience constructor for 11-bit addressing.
    pub fn standard(request_id: u32, response_id: u32) -> Result<Self, FrameError> {
        Self::new(request_id, response_id, CanAddressing::Standard)
    }

    /// Convenience constructor for 29-bit addressing.
    pub fn extended(request_id: u32, response_id: u32) -> Result<Self, FrameError> {
        Self::new(request_id, response_id, CanAddressing::Extended)
    }

    /// Arbitration id used when transmitting to the module.
    pub fn request_can_id(&self) -> CanId {
        self.can_id(self.request_id)
    }

    /// Arbitration id the module answers from.
    pub fn response_can_id(&self) -> CanId {
        self.can_id(self.response_id)
    }

    fn can_id(&self, raw: u32) -> CanId {
        // Validated at construction.
        match self.addressing {
            CanAddressing::Standard => CanId::Standard(raw as u16),
            CanAddressing::Extended => CanId::Extended(raw),
        }
    }
}
