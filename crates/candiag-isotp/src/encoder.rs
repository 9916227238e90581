//! Send-path segmentation and the flow-control handshake.

use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::config::IsoTpConfig;
use crate::error::{ChannelError, IsoTpError};
use crate::frame::{CanFrame, ModuleAddress};
use crate::pci::{
    decode_st_min, FlowStatus, IsoTpFrame, CONSECUTIVE_FRAME_DATA, FIRST_FRAME_DATA, MAX_PAYLOAD,
    SINGLE_FRAME_MAX,
};
use crate::transport::FrameTransport;

/// Splits payloads of 1..=4095 bytes into CAN frames addressed to one module
/// and transmits them, honouring the receiver's flow control.
#[derive(Debug, Clone)]
pub struct IsoTpEncoder {
    address: ModuleAddress,
    config: IsoTpConfig,
}

impl IsoTpEncoder {
    pub fn new(address: ModuleAddress, config: IsoTpConfig) -> Self {
        Self { address, config }
    }

    pub fn address(&self) -> ModuleAddress {
        self.address
    }

    /// Transmit one complete payload.
    ///
    /// Payloads up to seven bytes go out as a single frame. Longer payloads
    /// open a segmented transfer: first frame, then consecutive frames paced
    /// and batched per the receiver's flow control.
    pub async fn send<T: FrameTransport>(
        &self,
        transport: &mut T,
        payload: &[u8],
    ) -> Result<(), ChannelError> {
        if payload.is_empty() {
            return Err(IsoTpError::EmptyPayload.into());
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(IsoTpError::PayloadTooLarge(payload.len()).into());
        }

        if payload.len() <= SINGLE_FRAME_MAX {
            let frame = self.frame(&IsoTpFrame::Single {
                data: payload.to_vec(),
            })?;
            transport.send(frame).await?;
            trace!(len = payload.len(), "sent single frame");
            return Ok(());
        }

        self.send_segmented(transport, payload).await
    }

    async fn send_segmented<T: FrameTransport>(
        &self,
        transport: &mut T,
        payload: &[u8],
    ) -> Result<(), ChannelError> {
        let first = self.frame(&IsoTpFrame::First {
            total_len: payload.len() as u16,
            data: payload[..FIRST_FRAME_DATA].to_vec(),
        })?;
        transport.send(first).await?;
        debug!(total = payload.len(), "opened segmented transfer");

        let mut offset = FIRST_FRAME_DATA;
        let mut sequence: u8 = 1;

        'blocks: while offset < payload.len() {
            let (block_size, st_min) = self.await_flow_control(transport).await?;
            let pace = decode_st_min(st_min).map_err(ChannelError::Protocol)?;
            trace!(block_size, st_min, "flow control: clear to send");

            let mut remaining_in_block = block_size;
            loop {
                let chunk = CONSECUTIVE_FRAME_DATA.min(payload.len() - offset);
                let frame = self.frame(&IsoTpFrame::Consecutive {
                    sequence,
                    data: payload[offset..offset + chunk].to_vec(),
                })?;
                transport.send(frame).await?;
                offset += chunk;
                sequence = (sequence + 1) & 0x0F;

                if offset >= payload.len() {
                    break 'blocks;
                }
                if block_size > 0 {
                    remaining_in_block -= 1;
                    if remaining_in_block == 0 {
                        // Block exhausted; the receiver owes us another FC.
                        continue 'blocks;
                    }
                }
                if !pace.is_zero() {
                    sleep(pace).await;
                }
            }
        }

        debug!(total = payload.len(), "segmented transfer complete");
        Ok(())
    }

    /// Block until the receiver sends a Continue, bounded by the FC window.
    async fn await_flow_control<T: FrameTransport>(
        &self,
        transport: &mut T,
    ) -> Result<(u8, u8), ChannelError> {
        let mut waits: u32 = 0;
        loop {
            let deadline = Instant::now() + self.config.fc_timeout();
            loop {
                let frame = match transport.recv(deadline).await? {
                    Some(frame) => frame,
                    None => return Err(IsoTpError::FlowControlTimeout.into()),
                };
                if frame.id().raw() != self.address.response_id {
                    continue;
                }
                match IsoTpFrame::decode(frame.data()) {
                    Ok(IsoTpFrame::FlowControl {
                        status,
                        block_size,
                        st_min,
                    }) => match status {
                        FlowStatus::Continue => return Ok((block_size, st_min)),
                        FlowStatus::Wait => {
                            waits += 1;
                            if waits > self.config.max_wait_frames {
                                return Err(IsoTpError::TooManyWaits.into());
                            }
                            trace!(waits, "flow control: wait");
                            // Re-arm the handshake window.
                            break;
                        }
                        FlowStatus::Overflow => {
                            return Err(IsoTpError::FlowControlOverflow.into());
                        }
                    },
                    Err(IsoTpError::FlowControlAbort) => {
                        return Err(IsoTpError::FlowControlAbort.into());
                    }
                    // Anything else on the wire during the handshake is not
                    // ours to interpret here.
                    Ok(_) | Err(_) => continue,
                }
            }
        }
    }

    fn frame(&self, pci: &IsoTpFrame) -> Result<CanFrame, ChannelError> {
        let bytes = pci.encode(self.config.frame_padding());
        CanFrame::new(self.address.request_can_id(), &bytes)
            .map_err(|_| ChannelError::Protocol(IsoTpError::MalformedFrame))
    }
}
