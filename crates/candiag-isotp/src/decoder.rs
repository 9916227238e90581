//! Receive-path reassembly.
//!
//! The decoder is a two-state machine, `Idle` or assembling one
//! [`PendingPayload`]. It is fed raw frames by whoever drives the transport
//! and never yields a partial or incorrectly sized payload.

use tokio::time::Instant;
use tracing::{trace, warn};

use crate::config::IsoTpConfig;
use crate::error::IsoTpError;
use crate::frame::{CanFrame, ModuleAddress};
use crate::pci::{FlowStatus, IsoTpFrame};

/// State of one in-progress multi-frame receive.
#[derive(Debug)]
struct PendingPayload {
    total_len: usize,
    collected: Vec<u8>,
    next_sequence: u8,
    deadline: Instant,
}

/// What the driver must do after feeding one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Frame consumed; nothing to deliver yet.
    Pending,
    /// Transmit this flow-control frame back to the sender.
    SendFlowControl(CanFrame),
    /// A complete payload.
    Complete(Vec<u8>),
}

/// Reassembles ISO-TP payloads arriving from one module.
#[derive(Debug)]
pub struct IsoTpDecoder {
    address: ModuleAddress,
    config: IsoTpConfig,
    pending: Option<PendingPayload>,
}

impl IsoTpDecoder {
    pub fn new(address: ModuleAddress, config: IsoTpConfig) -> Self {
        Self {
            address,
            config,
            pending: None,
        }
    }

    /// Whether a segmented transfer is in progress.
    pub fn is_assembling(&self) -> bool {
        self.pending.is_some()
    }

    /// Deadline by which the next consecutive frame must arrive, when assembling.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Abandon any in-progress transfer.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Fail the in-progress transfer if its consecutive-frame window lapsed.
    pub fn check_deadline(&mut self, now: Instant) -> Result<(), IsoTpError> {
        if let Some(pending) = &self.pending {
            if now >= pending.deadline {
                warn!(
                    collected = pending.collected.len(),
                    expected = pending.total_len,
                    "reassembly timed out"
                );
                self.pending = None;
                return Err(IsoTpError::ReassemblyTimeout);
            }
        }
        Ok(())
    }

    /// Process one frame.
    ///
    /// On [`IsoTpError::InterleavedMessage`] the stalled transfer has been
    /// dropped and the decoder is idle again; the offending frame may be fed
    /// a second time if the caller wants to follow the new message instead of
    /// aborting.
    pub fn feed(&mut self, frame: &CanFrame, now: Instant) -> Result<FeedOutcome, IsoTpError> {
        match IsoTpFrame::decode(frame.data())? {
            IsoTpFrame::Single { data } => {
                if self.pending.take().is_some() {
                    return Err(IsoTpError::InterleavedMessage);
                }
                trace!(len = data.len(), "received single-frame payload");
                Ok(FeedOutcome::Complete(data))
            }
            IsoTpFrame::First { total_len, data } => {
                if self.pending.take().is_some() {
                    return Err(IsoTpError::InterleavedMessage);
                }
                let total = usize::from(total_len);
                let mut collected = data;
                collected.truncate(total);
                trace!(total, "first frame opened reassembly");
                self.pending = Some(PendingPayload {
                    total_len: total,
                    collected,
                    next_sequence: 1,
                    deadline: now + self.config.cf_timeout(),
                });
                Ok(FeedOutcome::SendFlowControl(self.flow_control_frame()?))
            }
            IsoTpFrame::Consecutive { sequence, data } => {
                let mut pending = match self.pending.take() {
                    Some(pending) => pending,
                    None => return Err(IsoTpError::UnexpectedConsecutive),
                };
                if sequence != pending.next_sequence {
                    warn!(
                        got = sequence,
                        expected = pending.next_sequence,
                        "consecutive frame out of order"
                    );
                    return Err(IsoTpError::SequenceError);
                }
                let remaining = pending.total_len - pending.collected.len();
                let take = remaining.min(data.len());
                pending.collected.extend_from_slice(&data[..take]);

                if pending.collected.len() == pending.total_len {
                    trace!(len = pending.total_len, "reassembly complete");
                    return Ok(FeedOutcome::Complete(pending.collected));
                }
                pending.next_sequence = (pending.next_sequence + 1) & 0x0F;
                pending.deadline = now + self.config.cf_timeout();
                self.pending = Some(pending);
                Ok(FeedOutcome::Pending)
            }
            // Flow control addressed at us is the sender's concern, not the
            // reassembler's.
            IsoTpFrame::FlowControl { .. } => Ok(FeedOutcome::Pending),
        }
    }

    fn flow_control_frame(&self) -> Result<CanFrame, IsoTpError> {
        let bytes = IsoTpFrame::FlowControl {
            status: FlowStatus::Continue,
            block_size: self.config.block_size,
            st_min: self.config.st_min,
        }
        .encode(self.config.frame_padding());
        CanFrame::new(self.address.request_can_id(), &bytes)
            .map_err(|_| IsoTpError::MalformedFrame)
    }
}
