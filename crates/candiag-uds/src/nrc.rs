//! UDS Negative Response Codes (NRC)

use std::fmt;

/// Negative response code carried in byte 2 of a `7F` response.
///
/// The vendor-defined range 0x80..=0xFF is preserved as
/// [`NegativeResponseCode::VendorSpecific`]; other unassigned values decode
/// to [`NegativeResponseCode::Reserved`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeResponseCode {
    GeneralReject,
    ServiceNotSupported,
    SubFunctionNotSupported,
    IncorrectMessageLengthOrInvalidFormat,
    ResponseTooLong,
    BusyRepeatRequest,
    ConditionsNotCorrect,
    RequestSequenceError,
    RequestOutOfRange,
    SecurityAccessDenied,
    InvalidKey,
    ExceededNumberOfAttempts,
    RequiredTimeDelayNotExpired,
    RequestCorrectlyReceivedResponsePending,
    SubFunctionNotSupportedInActiveSession,
    ServiceNotSupportedInActiveSession,
    /// Manufacturer- or supplier-specific code (0x80..=0xFF).
    VendorSpecific(u8),
    /// Unassigned ISO range value.
    Reserved(u8),
}

impl From<u8> for NegativeResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0x10 => Self::GeneralReject,
            0x11 => Self::ServiceNotSupported,
            0x12 => Self::SubFunctionNotSupported,
            0x13 => Self::IncorrectMessageLengthOrInvalidFormat,
            0x14 => Self::ResponseTooLong,
            0x21 => Self::BusyRepeatRequest,
            0x22 => Self::ConditionsNotCorrect,
            0x24 => Self::RequestSequenceError,
            0x31 => Self::RequestOutOfRange,
            0x33 => Self::SecurityAccessDenied,
            0x35 => Self::InvalidKey,
            0x36 => Self::ExceededNumberOfAttempts,
            0x37 => Self::RequiredTimeDelayNotExpired,
            0x78 => Self::RequestCorrectlyReceivedResponsePending,
            0x7E => Self::SubFunctionNotSupportedInActiveSession,
            0x7F => Self::ServiceNotSupportedInActiveSession,
            other if other >= 0x80 => Self::VendorSpecific(other),
            other => Self::Reserved(other),
        }
    }
}

impl From<NegativeResponseCode> for u8 {
    fn from(nrc: NegativeResponseCode) -> Self {
        match nrc {
            NegativeResponseCode::GeneralReject => 0x10,
            NegativeResponseCode::ServiceNotSupported => 0x11,
            NegativeResponseCode::SubFunctionNotSupported => 0x12,
            NegativeResponseCode::IncorrectMessageLengthOrInvalidFormat => 0x13,
            NegativeResponseCode::ResponseTooLong => 0x14,
            NegativeResponseCode::BusyRepeatRequest => 0x21,
            NegativeResponseCode::ConditionsNotCorrect => 0x22,
            NegativeResponseCode::RequestSequenceError => 0x24,
            NegativeResponseCode::RequestOutOfRange => 0x31,
            NegativeResponseCode::SecurityAccessDenied => 0x33,
            NegativeResponseCode::InvalidKey => 0x35,
            NegativeResponseCode::ExceededNumberOfAttempts => 0x36,
            NegativeResponseCode::RequiredTimeDelayNotExpired => 0x37,
            NegativeResponseCode::RequestCorrectlyReceivedResponsePending => 0x78,
            NegativeResponseCode::SubFunctionNotSupportedInActiveSession => 0x7E,
            NegativeResponseCode::ServiceNotSupportedInActiveSession => 0x7F,
            NegativeResponseCode::VendorSpecific(v) => v,
            NegativeResponseCode::Reserved(v) => v,
        }
    }
}

impl fmt::UpperHex for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: u8 = (*self).into();
        fmt::UpperHex::fmt(&value, f)
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneralReject => write!(f, "GeneralReject"),
            Self::ServiceNotSupported => write!(f, "ServiceNotSupported"),
            Self::SubFunctionNotSupported => write!(f, "SubFunctionNotSupported"),
            Self::IncorrectMessageLengthOrInvalidFormat => {
                write!(f, "IncorrectMessageLengthOrInvalidFormat")
            }
            Self::ResponseTooLong => write!(f, "ResponseTooLong"),
            Self::BusyRepeatRequest => write!(f, "BusyRepeatRequest"),
            Self::ConditionsNotCorrect => write!(f, "ConditionsNotCorrect"),
            Self::RequestSequenceError => write!(f, "RequestSequenceError"),
            Self::RequestOutOfRange => write!(f, "RequestOutOfRange"),
            Self::SecurityAccessDenied => write!(f, "SecurityAccessDenied"),
            Self::InvalidKey => write!(f, "InvalidKey"),
            Self::ExceededNumberOfAttempts => write!(f, "ExceededNumberOfAttempts"),
            Self::RequiredTimeDelayNotExpired => write!(f, "RequiredTimeDelayNotExpired"),
            Self::RequestCorrectlyReceivedResponsePending => {
                write!(f, "RequestCorrectlyReceivedResponsePending")
            }
            Self::SubFunctionNotSupportedInActiveSession => {
                write!(f, "SubFunctionNotSupportedInActiveSession")
            }
            Self::ServiceNotSupportedInActiveSession => {
                write!(f, "ServiceNotSupportedInActiveSession")
            }
            Self::VendorSpecific(v) => write!(f, "VendorSpecific(0x{:02X})", v),
            Self::Reserved(v) => write!(f, "Reserved(0x{:02X})", v),
        }
    }
}
