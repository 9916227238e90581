//! Classification of raw UDS response payloads.

use crate::nrc::NegativeResponseCode;
use crate::request::{service_id, POSITIVE_RESPONSE_OFFSET};

/// Outcome of one UDS exchange as seen on the wire.
///
/// A positive response begins with `service + 0x40`; a negative response is
/// `7F <service> <NRC>`. Anything else (including an empty payload, which the
/// wire can never carry) is classified as a synthetic
/// [`NegativeResponseCode::GeneralReject`] with the raw bytes preserved so the
/// caller can always tell "the ECU said no" from "we never understood what
/// the ECU said".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdsResponse {
    Positive {
        service: u8,
        body: Vec<u8>,
        raw: Vec<u8>,
    },
    Negative {
        service: u8,
        code: NegativeResponseCode,
        raw: Vec<u8>,
    },
}

impl UdsResponse {
    /// Classify `raw` against the service id that was requested.
    pub fn parse(requested_service: u8, raw: &[u8]) -> Self {
        if raw.is_empty() {
            return Self::Negative {
                service: requested_service,
                code: NegativeResponseCode::GeneralReject,
                raw: Vec::new(),
            };
        }
        if raw[0] == service_id::NEGATIVE_RESPONSE && raw.len() >= 3 {
            return Self::Negative {
                service: raw[1],
                code: NegativeResponseCode::from(raw[2]),
                raw: raw.to_vec(),
            };
        }
        if raw[0] == requested_service.wrapping_add(POSITIVE_RESPONSE_OFFSET) {
            return Self::Positive {
                service: requested_service,
                body: raw[1..].to_vec(),
                raw: raw.to_vec(),
            };
        }
        Self::Negative {
            service: requested_service,
            code: NegativeResponseCode::GeneralReject,
            raw: raw.to_vec(),
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive { .. })
    }

    /// Negative response code, when this is a negative response.
    pub fn nrc(&self) -> Option<NegativeResponseCode> {
        match self {
            Self::Negative { code, .. } => Some(*code),
            Self::Positive { .. } => None,
        }
    }

    /// Raw bytes as received, whatever the classification.
    pub fn raw(&self) -> &[u8] {
        match self {
            Self::Positive { raw, .. } | Self::Negative { raw, .. } => raw,
        }
    }
}
