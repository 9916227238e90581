//! Seed/key security access (UDS service 0x27).
//!
//! The exchange is a two-step dance: request a seed at an odd level, derive a
//! key with a vehicle-family-specific algorithm, send the key back at
//! `level + 1`. This module supplies the machinery and no algorithm; key
//! derivation is injected by the caller.

use thiserror::Error;
use tracing::{debug, info, warn};

use candiag_isotp::FrameTransport;

use crate::client::{expect_positive, UdsClient};
use crate::error::DiagError;
use crate::nrc::NegativeResponseCode;
use crate::request::UdsRequest;
use crate::response::UdsResponse;

/// Security-access level. Seed requests use the odd sub-function; the paired
/// key is sent at the next (even) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityLevel(u8);

/// Rejected security level value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("security level must be odd and below 0x7F, got 0x{0:02X}")]
pub struct InvalidSecurityLevel(pub u8);

impl SecurityLevel {
    pub fn new(level: u8) -> Result<Self, InvalidSecurityLevel> {
        if level % 2 == 0 || level >= 0x7F {
            return Err(InvalidSecurityLevel(level));
        }
        Ok(Self(level))
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Sub-function for the seed request.
    pub fn request_seed_sub(&self) -> u8 {
        self.0
    }

    /// Sub-function for the key transmission.
    pub fn send_key_sub(&self) -> u8 {
        self.0 + 1
    }
}

/// Caller-supplied key derivation: seed bytes in, key bytes out.
///
/// Implemented for plain closures, so a bit-rotation/XOR-table algorithm can
/// be passed inline.
pub trait KeyDerivation {
    fn derive(&self, seed: &[u8], level: u8) -> Vec<u8>;
}

impl<F> KeyDerivation for F
where
    F: Fn(&[u8], u8) -> Vec<u8>,
{
    fn derive(&self, seed: &[u8], level: u8) -> Vec<u8> {
        self(seed, level)
    }
}

/// Record of one seed/key attempt, kept for auditing and algorithm analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedKeyObservation {
    pub level: u8,
    pub seed: Vec<u8>,
    pub key: Vec<u8>,
    pub accepted: bool,
    /// NRC returned for the key, when it was rejected.
    pub nrc: Option<NegativeResponseCode>,
}

/// Why the ECU rejected the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    InvalidKey,
    AttemptsExceeded,
    DelayNotExpired,
    Other(NegativeResponseCode),
}

impl DenyReason {
    fn from_nrc(code: NegativeResponseCode) -> Self {
        match code {
            NegativeResponseCode::InvalidKey => DenyReason::InvalidKey,
            NegativeResponseCode::ExceededNumberOfAttempts => DenyReason::AttemptsExceeded,
            NegativeResponseCode::RequiredTimeDelayNotExpired => DenyReason::DelayNotExpired,
            other => DenyReason::Other(other),
        }
    }
}

/// Result of one unlock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityAccessOutcome {
    /// The ECU answered with an empty or all-zero seed: this level is
    /// already unlocked and no key was sent.
    AlreadyUnlocked { level: u8 },
    /// Key accepted.
    Unlocked { observation: SeedKeyObservation },
    /// Key rejected. ECUs enforce attempt counters with cooldown penalties,
    /// so no retry is made here.
    Denied {
        reason: DenyReason,
        observation: SeedKeyObservation,
    },
}

/// Drives the request-seed / send-key exchange at one level.
pub struct SecurityAccess<K: KeyDerivation> {
    level: SecurityLevel,
    derive: K,
}

impl<K: KeyDerivation> SecurityAccess<K> {
    pub fn new(level: SecurityLevel, derive: K) -> Self {
        Self { level, derive }
    }

    /// Run the exchange on the given client.
    ///
    /// A negative response to the seed request, and every transport or
    /// ISO-TP failure, is an `Err`. A rejected key is `Ok(Denied { .. })`
    /// with the full [`SeedKeyObservation`] preserved.
    pub async fn unlock<T: FrameTransport>(
        &self,
        client: &mut UdsClient<T>,
    ) -> Result<SecurityAccessOutcome, DiagError> {
        let level = self.level.raw();

        let response = client.execute(&UdsRequest::RequestSeed { level: self.level }).await?;
        let body = expect_positive(response)?;

        // body[0] echoes the level; the seed follows.
        let seed: Vec<u8> = if body.len() > 1 { body[1..].to_vec() } else { Vec::new() };
        if seed.is_empty() || seed.iter().all(|&b| b == 0) {
            info!(level, "zero seed: level already unlocked");
            return Ok(SecurityAccessOutcome::AlreadyUnlocked { level });
        }

        let key = self.derive.derive(&seed, level);
        debug!(level, seed_len = seed.len(), key_len = key.len(), "sending derived key");

        let response = client
            .execute(&UdsRequest::SendKey {
                level: self.level,
                key: key.clone(),
            })
            .await?;

        match response {
            UdsResponse::Positive { .. } => {
                info!(level, "security access granted");
                Ok(SecurityAccessOutcome::Unlocked {
                    observation: SeedKeyObservation {
                        level,
                        seed,
                        key,
                        accepted: true,
                        nrc: None,
                    },
                })
            }
            UdsResponse::Negative { code, .. } => {
                warn!(level, nrc = %code, "security access denied");
                Ok(SecurityAccessOutcome::Denied {
                    reason: DenyReason::from_nrc(code),
                    observation: SeedKeyObservation {
                        level,
                        seed,
                        key,
                        accepted: false,
                        nrc: Some(code),
                    },
                })
            }
        }
    }
}
