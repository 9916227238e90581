//! UDS session core: one request/response transaction end to end.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use candiag_isotp::{
    FeedOutcome, FrameTransport, IsoTpConfig, IsoTpDecoder, IsoTpEncoder, ModuleAddress,
};

use crate::config::ClientConfig;
use crate::dtc::{self, parse_dtc_report, DtcReport};
use crate::error::{DiagError, TimeoutPhase};
use crate::nrc::NegativeResponseCode;
use crate::request::{routine_sub_function, UdsRequest};
use crate::response::UdsResponse;

/// Session id and server timing budgets echoed by DiagnosticSessionControl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub session: u8,
    /// Server's advertised P2 budget.
    pub p2: Duration,
    /// Server's advertised P2* budget.
    pub p2_star: Duration,
}

/// One data identifier with its value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub did: u16,
    pub value: Vec<u8>,
}

/// Diagnostic client bound to one ECU over one [`FrameTransport`].
///
/// The client is stateless between transactions; each call runs exactly one
/// request/response exchange. Response-pending notifications (NRC 0x78) are
/// consumed internally: each one re-arms the receive deadline to P2* until
/// the configured cap, after which the transaction fails with
/// [`DiagError::PendingAbuse`].
///
/// Cancellation is drop-based: every suspension point is bounded by a
/// deadline, and dropping the future abandons the transaction. Reassembly
/// state lives inside the transaction, so the client is safe to reuse
/// afterwards.
pub struct UdsClient<T: FrameTransport> {
    transport: T,
    address: ModuleAddress,
    config: ClientConfig,
    isotp: IsoTpConfig,
    encoder: IsoTpEncoder,
    p2: Duration,
    p2_star: Duration,
}

impl<T: FrameTransport> UdsClient<T> {
    pub fn new(transport: T, address: ModuleAddress) -> Self {
        Self::with_config(
            transport,
            address,
            ClientConfig::default(),
            IsoTpConfig::default(),
        )
    }

    pub fn with_config(
        transport: T,
        address: ModuleAddress,
        config: ClientConfig,
        isotp: IsoTpConfig,
    ) -> Self {
        let encoder = IsoTpEncoder::new(address, isotp.clone());
        let p2 = config.p2();
        let p2_star = config.p2_star();
        Self {
            transport,
            address,
            config,
            isotp,
            encoder,
            p2,
            p2_star,
        }
    }

    pub fn address(&self) -> ModuleAddress {
        self.address
    }

    /// Currently effective (P2, P2*) budgets.
    pub fn timings(&self) -> (Duration, Duration) {
        (self.p2, self.p2_star)
    }

    /// Hand the transport back, e.g. to rebind the client to another module.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Execute one request/response transaction.
    pub async fn execute(&mut self, request: &UdsRequest) -> Result<UdsResponse, DiagError> {
        let service = request.service_id();
        let bytes = request.encode();

        self.transport.set_filter(self.address.response_id);
        debug!(
            service = format!("0x{service:02X}"),
            len = bytes.len(),
            "sending request"
        );
        self.encoder.send(&mut self.transport, &bytes).await?;

        // P2 runs from the moment the last request frame went out.
        let mut decoder = IsoTpDecoder::new(self.address, self.isotp.clone());
        let mut deadline = Instant::now() + self.p2;
        let mut phase = TimeoutPhase::P2;
        let mut pending_seen: u32 = 0;

        loop {
            let payload = self.receive_payload(&mut decoder, deadline, phase).await?;
            let response = UdsResponse::parse(service, &payload);

            if response.nrc() == Some(NegativeResponseCode::RequestCorrectlyReceivedResponsePending)
            {
                pending_seen += 1;
                if pending_seen > self.config.max_pending {
                    warn!(
                        cap = self.config.max_pending,
                        "response-pending cap exceeded"
                    );
                    return Err(DiagError::PendingAbuse(self.config.max_pending));
                }
                debug!(count = pending_seen, "response pending, extending deadline");
                deadline = Instant::now() + self.p2_star;
                phase = TimeoutPhase::P2Star;
                continue;
            }

            return Ok(response);
        }
    }

    /// Feed frames into the reassembler until a payload emerges or a window
    /// closes. Bounded by both the transaction deadline and the decoder's
    /// consecutive-frame window.
    async fn receive_payload(
        &mut self,
        decoder: &mut IsoTpDecoder,
        deadline: Instant,
        phase: TimeoutPhase,
    ) -> Result<Vec<u8>, DiagError> {
        loop {
            let wait_until = decoder.deadline().map_or(deadline, |d| d.min(deadline));
            match self.transport.recv(wait_until).await? {
                None => {
                    let now = Instant::now();
                    decoder.check_deadline(now)?;
                    if now >= deadline {
                        return Err(DiagError::Timeout { phase });
                    }
                }
                Some(frame) => {
                    if frame.id().raw() != self.address.response_id {
                        continue;
                    }
                    match decoder.feed(&frame, Instant::now())? {
                        FeedOutcome::Pending => {}
                        FeedOutcome::SendFlowControl(fc) => {
                            self.transport.send(fc).await?;
                        }
                        FeedOutcome::Complete(payload) => return Ok(payload),
                    }
                }
            }
        }
    }

    // =========================================================================
    // Typed service API
    // =========================================================================

    /// Diagnostic Session Control (0x10).
    ///
    /// The positive response carries the server's P2/P2* budgets; they are
    /// adopted as the client's own timings when
    /// [`ClientConfig::adopt_server_timings`] is set.
    pub async fn start_session(&mut self, session: u8) -> Result<SessionInfo, DiagError> {
        let response = self
            .execute(&UdsRequest::DiagnosticSessionControl { session })
            .await?;
        let body = expect_positive(response)?;
        if body.len() < 5 {
            return Err(DiagError::MalformedResponse {
                service: crate::request::service_id::DIAGNOSTIC_SESSION_CONTROL,
                detail: "session-control body shorter than the timing record".into(),
            });
        }
        let info = SessionInfo {
            session: body[0],
            p2: Duration::from_millis(u64::from(u16::from_be_bytes([body[1], body[2]]))),
            p2_star: Duration::from_millis(u64::from(u16::from_be_bytes([body[3], body[4]]))),
        };
        if self.config.adopt_server_timings {
            self.p2 = info.p2;
            self.p2_star = info.p2_star;
            info!(
                p2_ms = info.p2.as_millis() as u64,
                p2_star_ms = info.p2_star.as_millis() as u64,
                "adopted server timings"
            );
        }
        Ok(info)
    }

    /// Read Data By Identifier (0x22), single DID.
    pub async fn read_data_by_identifier(&mut self, did: u16) -> Result<DataRecord, DiagError> {
        let response = self
            .execute(&UdsRequest::ReadDataByIdentifier { dids: vec![did] })
            .await?;
        let body = expect_positive(response)?;
        if body.len() < 2 {
            return Err(DiagError::MalformedResponse {
                service: crate::request::service_id::READ_DATA_BY_IDENTIFIER,
                detail: "response too short to carry a DID echo".into(),
            });
        }
        let echo = u16::from_be_bytes([body[0], body[1]]);
        if echo != did {
            return Err(DiagError::MalformedResponse {
                service: crate::request::service_id::READ_DATA_BY_IDENTIFIER,
                detail: format!("DID echo 0x{echo:04X} does not match requested 0x{did:04X}"),
            });
        }
        Ok(DataRecord {
            did,
            value: body[2..].to_vec(),
        })
    }

    /// Read Data By Identifier (0x22) with several DIDs in one request.
    ///
    /// The body interleaves DID echoes with values of ECU-defined length, so
    /// it is returned undissected for the caller's DID-to-decoder map.
    pub async fn read_data_by_identifiers(&mut self, dids: &[u16]) -> Result<Vec<u8>, DiagError> {
        let response = self
            .execute(&UdsRequest::ReadDataByIdentifier {
                dids: dids.to_vec(),
            })
            .await?;
        expect_positive(response)
    }

    /// Read all DTCs matching status mask 0xFF (0x19 / 0x02).
    pub async fn read_dtcs(&mut self) -> Result<DtcReport, DiagError> {
        self.read_dtcs_by_status(0xFF).await
    }

    /// Read DTCs matching a status mask (0x19 / 0x02).
    pub async fn read_dtcs_by_status(&mut self, status_mask: u8) -> Result<DtcReport, DiagError> {
        let response = self
            .execute(&UdsRequest::ReadDtcInformation {
                sub_function: dtc::sub_function::REPORT_DTC_BY_STATUS_MASK,
                status_mask,
            })
            .await?;
        let body = expect_positive(response)?;
        Ok(parse_dtc_report(&body))
    }

    /// Clear all diagnostic information (0x14, group 0xFFFFFF).
    pub async fn clear_dtcs(&mut self) -> Result<UdsResponse, DiagError> {
        self.clear_dtc_group(dtc::dtc_group::ALL).await
    }

    /// Clear one DTC group (0x14).
    pub async fn clear_dtc_group(&mut self, group: u32) -> Result<UdsResponse, DiagError> {
        let response = self
            .execute(&UdsRequest::ClearDiagnosticInformation { group })
            .await?;
        require_positive(response)
    }

    /// ECU Reset (0x11). No automatic retransmit; the caller is responsible
    /// for waiting out the reset before talking to the module again.
    pub async fn ecu_reset(&mut self, reset_type: u8) -> Result<UdsResponse, DiagError> {
        let response = self.execute(&UdsRequest::EcuReset { reset_type }).await?;
        require_positive(response)
    }

    /// Tester Present (0x3E) expecting the positive echo, so success is
    /// observable.
    pub async fn tester_present(&mut self) -> Result<(), DiagError> {
        let response = self
            .execute(&UdsRequest::TesterPresent {
                suppress_response: false,
            })
            .await?;
        expect_positive(response)?;
        Ok(())
    }

    /// Tester Present (0x3E) with suppress-positive-response: fire and
    /// forget, nothing is read back.
    pub async fn tester_present_suppressed(&mut self) -> Result<(), DiagError> {
        let request = UdsRequest::TesterPresent {
            suppress_response: true,
        };
        self.encoder
            .send(&mut self.transport, &request.encode())
            .await?;
        Ok(())
    }

    /// Write Data By Identifier (0x2E).
    pub async fn write_data_by_identifier(
        &mut self,
        did: u16,
        data: &[u8],
    ) -> Result<(), DiagError> {
        let response = self
            .execute(&UdsRequest::WriteDataByIdentifier {
                did,
                data: data.to_vec(),
            })
            .await?;
        let body = expect_positive(response)?;
        if body.len() < 2 || u16::from_be_bytes([body[0], body[1]]) != did {
            return Err(DiagError::MalformedResponse {
                service: crate::request::service_id::WRITE_DATA_BY_IDENTIFIER,
                detail: format!("missing or wrong DID echo for 0x{did:04X}"),
            });
        }
        Ok(())
    }

    /// Start a routine (0x31 / 0x01) and return its routine-info bytes.
    pub async fn start_routine(
        &mut self,
        routine_id: u16,
        params: &[u8],
    ) -> Result<Vec<u8>, DiagError> {
        self.routine_control(routine_sub_function::START, routine_id, params)
            .await
    }

    /// Routine Control (0x31) with an explicit sub-function.
    pub async fn routine_control(
        &mut self,
        sub_function: u8,
        routine_id: u16,
        params: &[u8],
    ) -> Result<Vec<u8>, DiagError> {
        let response = self
            .execute(&UdsRequest::RoutineControl {
                sub_function,
                routine_id,
                params: params.to_vec(),
            })
            .await?;
        let body = expect_positive(response)?;
        if body.len() < 3 {
            return Err(DiagError::MalformedResponse {
                service: crate::request::service_id::ROUTINE_CONTROL,
                detail: "routine response shorter than the routine-id echo".into(),
            });
        }
        Ok(body[3..].to_vec())
    }
}

/// Positive body, or the negative response as an error.
pub(crate) fn expect_positive(response: UdsResponse) -> Result<Vec<u8>, DiagError> {
    match response {
        UdsResponse::Positive { body, .. } => Ok(body),
        UdsResponse::Negative { service, code, .. } => {
            Err(DiagError::UdsNegative { service, code })
        }
    }
}

/// The whole positive response, or the negative response as an error.
fn require_positive(response: UdsResponse) -> Result<UdsResponse, DiagError> {
    match response {
        UdsResponse::Positive { .. } => Ok(response),
        UdsResponse::Negative { service, code, .. } => {
            Err(DiagError::UdsNegative { service, code })
        }
    }
}
