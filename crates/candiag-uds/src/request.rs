//! UDS request construction.
//!
//! A [`UdsRequest`] is a typed diagnostic intent; [`UdsRequest::encode`] is
//! the pure mapping onto the ISO 14229 request byte layout. Multi-byte
//! identifiers go out big-endian.

use crate::security::SecurityLevel;

/// Standard UDS service ids used by this client.
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const CLEAR_DIAGNOSTIC_INFORMATION: u8 = 0x14;
    pub const READ_DTC_INFORMATION: u8 = 0x19;
    pub const READ_DATA_BY_IDENTIFIER: u8 = 0x22;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const WRITE_DATA_BY_IDENTIFIER: u8 = 0x2E;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// DiagnosticSessionControl (0x10) sub-functions
pub mod session {
    pub const DEFAULT: u8 = 0x01;
    pub const PROGRAMMING: u8 = 0x02;
    pub const EXTENDED: u8 = 0x03;
}

/// ECUReset (0x11) sub-functions
pub mod reset_type {
    /// Complete shutdown and restart of the ECU.
    pub const HARD: u8 = 0x01;
    /// Simulated ignition cycle.
    pub const KEY_OFF_ON: u8 = 0x02;
    /// Application-level restart.
    pub const SOFT: u8 = 0x03;
}

/// RoutineControl (0x31) sub-functions
pub mod routine_sub_function {
    pub const START: u8 = 0x01;
    pub const STOP: u8 = 0x02;
    pub const REQUEST_RESULTS: u8 = 0x03;
}

/// Offset between a request service id and its positive-response id.
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// Sub-function bit that suppresses the positive response.
pub const SUPPRESS_POSITIVE_RESPONSE: u8 = 0x80;

/// A typed diagnostic intent, serialisable to its wire layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdsRequest {
    DiagnosticSessionControl {
        session: u8,
    },
    EcuReset {
        reset_type: u8,
    },
    /// 24-bit DTC group; `0xFFFFFF` clears everything.
    ClearDiagnosticInformation {
        group: u32,
    },
    ReadDtcInformation {
        sub_function: u8,
        status_mask: u8,
    },
    /// One or more 16-bit data identifiers.
    ReadDataByIdentifier {
        dids: Vec<u16>,
    },
    RequestSeed {
        level: SecurityLevel,
    },
    SendKey {
        level: SecurityLevel,
        key: Vec<u8>,
    },
    WriteDataByIdentifier {
        did: u16,
        data: Vec<u8>,
    },
    RoutineControl {
        sub_function: u8,
        routine_id: u16,
        params: Vec<u8>,
    },
    TesterPresent {
        suppress_response: bool,
    },
}

impl UdsRequest {
    /// Service id carried in byte 0 of the encoded request.
    pub fn service_id(&self) -> u8 {
        match self {
            Self::DiagnosticSessionControl { .. } => service_id::DIAGNOSTIC_SESSION_CONTROL,
            Self::EcuReset { .. } => service_id::ECU_RESET,
            Self::ClearDiagnosticInformation { .. } => service_id::CLEAR_DIAGNOSTIC_INFORMATION,
            Self::ReadDtcInformation { .. } => service_id::READ_DTC_INFORMATION,
            Self::ReadDataByIdentifier { .. } => service_id::READ_DATA_BY_IDENTIFIER,
            Self::RequestSeed { .. } | Self::SendKey { .. } => service_id::SECURITY_ACCESS,
            Self::WriteDataByIdentifier { .. } => service_id::WRITE_DATA_BY_IDENTIFIER,
            Self::RoutineControl { .. } => service_id::ROUTINE_CONTROL,
            Self::TesterPresent { .. } => service_id::TESTER_PRESENT,
        }
    }

    /// Wire layout per ISO 14229.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::DiagnosticSessionControl { session } => {
                vec![service_id::DIAGNOSTIC_SESSION_CONTROL, *session]
            }
            Self::EcuReset { reset_type } => vec![service_id::ECU_RESET, *reset_type],
            Self::ClearDiagnosticInformation { group } => {
                let bytes = group.to_be_bytes();
                vec![
                    service_id::CLEAR_DIAGNOSTIC_INFORMATION,
                    bytes[1],
                    bytes[2],
                    bytes[3],
                ]
            }
            Self::ReadDtcInformation {
                sub_function,
                status_mask,
            } => vec![service_id::READ_DTC_INFORMATION, *sub_function, *status_mask],
            Self::ReadDataByIdentifier { dids } => {
                let mut request = vec![service_id::READ_DATA_BY_IDENTIFIER];
                for did in dids {
                    request.extend_from_slice(&did.to_be_bytes());
                }
                request
            }
            Self::RequestSeed { level } => {
                vec![service_id::SECURITY_ACCESS, level.request_seed_sub()]
            }
            Self::SendKey { level, key } => {
                let mut request = vec![service_id::SECURITY_ACCESS, level.send_key_sub()];
                request.extend_from_slice(key);
                request
            }
            Self::WriteDataByIdentifier { did, data } => {
                let mut request = vec![service_id::WRITE_DATA_BY_IDENTIFIER];
                request.extend_from_slice(&did.to_be_bytes());
                request.extend_from_slice(data);
                request
            }
            Self::RoutineControl {
                sub_function,
                routine_id,
                params,
            } => {
                let mut request = vec![service_id::ROUTINE_CONTROL, *sub_function];
                request.extend_from_slice(&routine_id.to_be_bytes());
                request.extend_from_slice(params);
                request
            }
            Self::TesterPresent { suppress_response } => {
                let sub = if *suppress_response {
                    SUPPRESS_POSITIVE_RESPONSE
                } else {
                    0x00
                };
                vec![service_id::TESTER_PRESENT, sub]
            }
        }
    }
}
