//! Frame-level ECU simulator for client integration tests.
//!
//! Unlike a payload-level mock, this speaks real ISO-TP on both directions:
//! it reassembles segmented requests, answers first frames with flow
//! control, and segments its own multi-byte responses into first/consecutive
//! frames gated on the tester's flow control.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use candiag_uds::{
    CanFrame, CanId, FrameTransport, IsoTpConfig, ModuleAddress, TransportError,
};
use candiag_isotp::{FeedOutcome, FlowStatus, IsoTpDecoder, IsoTpFrame};
use tokio::time::{sleep_until, Instant};

pub fn test_address() -> ModuleAddress {
    ModuleAddress::standard(0x7E0, 0x7E8).unwrap()
}

/// One reply the simulated ECU produces for a matched request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub payload: Vec<u8>,
}

/// Immediate reply.
pub fn reply(payload: &[u8]) -> Reply {
    Reply {
        delay: Duration::ZERO,
        payload: payload.to_vec(),
    }
}

/// Reply delivered `delay_ms` after the request completes (or after the
/// previous reply in the same exchange).
pub fn delayed_reply(delay_ms: u64, payload: &[u8]) -> Reply {
    Reply {
        delay: Duration::from_millis(delay_ms),
        payload: payload.to_vec(),
    }
}

struct Exchange {
    expect: Option<Vec<u8>>,
    replies: Vec<Reply>,
}

enum OutItem {
    /// Relative gap, converted to an absolute instant when first polled.
    Delay(Duration),
    ReadyAt(Instant),
    Frame(CanFrame),
}

/// Scripted ECU behind a [`FrameTransport`].
pub struct EcuSim {
    address: ModuleAddress,
    isotp: IsoTpConfig,
    request_decoder: IsoTpDecoder,
    script: VecDeque<Exchange>,
    outgoing: VecDeque<OutItem>,
    /// Consecutive frames of an in-flight response, released by the
    /// tester's flow control.
    held_consecutive: VecDeque<CanFrame>,
    /// Reassembled UDS requests, in arrival order.
    pub requests: Vec<Vec<u8>>,
    /// Every frame the tester transmitted.
    pub tester_frames: Vec<CanFrame>,
}

impl EcuSim {
    pub fn new() -> Self {
        let address = test_address();
        // The simulator reassembles traffic flowing the other way.
        let mirrored = ModuleAddress::standard(address.response_id, address.request_id).unwrap();
        Self {
            address,
            isotp: IsoTpConfig::default(),
            request_decoder: IsoTpDecoder::new(mirrored, IsoTpConfig::default()),
            script: VecDeque::new(),
            outgoing: VecDeque::new(),
            held_consecutive: VecDeque::new(),
            requests: Vec::new(),
            tester_frames: Vec::new(),
        }
    }

    /// Script one request/response exchange with a single immediate reply.
    pub fn expect(mut self, request: &[u8], response: &[u8]) -> Self {
        self.script.push_back(Exchange {
            expect: Some(request.to_vec()),
            replies: vec![reply(response)],
        });
        self
    }

    /// Script one exchange with explicit replies (delays, pending chains).
    pub fn expect_with_replies(mut self, request: &[u8], replies: Vec<Reply>) -> Self {
        self.script.push_back(Exchange {
            expect: Some(request.to_vec()),
            replies,
        });
        self
    }

    /// Script an exchange that swallows the request without responding.
    pub fn expect_silence(mut self, request: &[u8]) -> Self {
        self.script.push_back(Exchange {
            expect: Some(request.to_vec()),
            replies: Vec::new(),
        });
        self
    }

    /// Queue a raw frame for delivery, bypassing the script.
    pub fn enqueue_frame(&mut self, data: &[u8]) {
        let frame = CanFrame::new(CanId::Standard(self.address.response_id as u16), data).unwrap();
        self.outgoing.push_back(OutItem::Frame(frame));
    }

    fn ecu_frame(&self, data: &[u8]) -> CanFrame {
        CanFrame::new(self.address.response_can_id(), data).unwrap()
    }

    fn on_request(&mut self, request: Vec<u8>) {
        self.requests.push(request.clone());
        let exchange = match self.script.pop_front() {
            Some(exchange) => exchange,
            None => return,
        };
        if let Some(expected) = &exchange.expect {
            assert_eq!(
                &request, expected,
                "simulated ECU received an unexpected request"
            );
        }
        for reply in &exchange.replies {
            self.queue_reply(reply);
        }
    }

    fn queue_reply(&mut self, reply: &Reply) {
        if !reply.delay.is_zero() {
            self.outgoing.push_back(OutItem::Delay(reply.delay));
        }
        let padding = self.isotp.frame_padding();
        if reply.payload.len() <= 7 {
            let bytes = IsoTpFrame::Single {
                data: reply.payload.clone(),
            }
            .encode(padding);
            let frame = self.ecu_frame(&bytes);
            self.outgoing.push_back(OutItem::Frame(frame));
            return;
        }

        let first = IsoTpFrame::First {
            total_len: reply.payload.len() as u16,
            data: reply.payload[..6].to_vec(),
        }
        .encode(padding);
        let first = self.ecu_frame(&first);
        self.outgoing.push_back(OutItem::Frame(first));

        let mut offset = 6;
        let mut sequence: u8 = 1;
        while offset < reply.payload.len() {
            let chunk = 7.min(reply.payload.len() - offset);
            let bytes = IsoTpFrame::Consecutive {
                sequence,
                data: reply.payload[offset..offset + chunk].to_vec(),
            }
            .encode(padding);
            let frame = self.ecu_frame(&bytes);
            self.held_consecutive.push_back(frame);
            offset += chunk;
            sequence = (sequence + 1) & 0x0F;
        }
    }
}

#[async_trait]
impl FrameTransport for EcuSim {
    async fn send(&mut self, frame: CanFrame) -> Result<(), TransportError> {
        self.tester_frames.push(frame.clone());

        if let Ok(IsoTpFrame::FlowControl { status, .. }) = IsoTpFrame::decode(frame.data()) {
            if status == FlowStatus::Continue {
                while let Some(cf) = self.held_consecutive.pop_front() {
                    self.outgoing.push_back(OutItem::Frame(cf));
                }
            }
            return Ok(());
        }

        match self.request_decoder.feed(&frame, Instant::now()) {
            Ok(FeedOutcome::Pending) => {}
            Ok(FeedOutcome::SendFlowControl(fc)) => {
                self.outgoing.push_back(OutItem::Frame(fc));
            }
            Ok(FeedOutcome::Complete(request)) => self.on_request(request),
            Err(e) => panic!("simulated ECU could not parse tester frame: {e}"),
        }
        Ok(())
    }

    async fn recv(&mut self, deadline: Instant) -> Result<Option<CanFrame>, TransportError> {
        loop {
            enum Next {
                Empty,
                Arm(Duration),
                WaitUntil(Instant),
                Pop,
            }
            let next = match self.outgoing.front() {
                None => Next::Empty,
                Some(OutItem::Delay(gap)) => Next::Arm(*gap),
                Some(OutItem::ReadyAt(ready)) => Next::WaitUntil(*ready),
                Some(OutItem::Frame(_)) => Next::Pop,
            };
            match next {
                Next::Empty => {
                    sleep_until(deadline).await;
                    return Ok(None);
                }
                Next::Arm(gap) => {
                    if let Some(item) = self.outgoing.front_mut() {
                        *item = OutItem::ReadyAt(Instant::now() + gap);
                    }
                }
                Next::WaitUntil(ready) => {
                    if deadline < ready {
                        sleep_until(deadline).await;
                        return Ok(None);
                    }
                    sleep_until(ready).await;
                    self.outgoing.pop_front();
                }
                Next::Pop => match self.outgoing.pop_front() {
                    Some(OutItem::Frame(frame)) => return Ok(Some(frame)),
                    _ => unreachable!(),
                },
            }
        }
    }

    fn set_filter(&mut self, _accept: u32) {}
}
