//! Encoder/decoder integration: segmented transfers against a scripted peer.

use std::collections::VecDeque;

use async_trait::async_trait;
use candiag_isotp::{
    CanFrame, CanId, ChannelError, FeedOutcome, FrameTransport, IsoTpConfig, IsoTpDecoder,
    IsoTpEncoder, IsoTpError, ModuleAddress, TransportError,
};
use tokio::time::{sleep_until, Instant};

fn address() -> ModuleAddress {
    ModuleAddress::standard(0x7E0, 0x7E8).unwrap()
}

/// Scripted receiver end of one CAN channel.
///
/// Frames queued via `enqueue` are served to `recv` in order. When `auto_fc`
/// is set, a Continue flow control is produced in response to the first frame
/// and again whenever a block is exhausted.
struct PeerTransport {
    rx: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
    auto_fc: Option<(u8, u8)>,
    cfs_since_fc: u8,
}

impl PeerTransport {
    fn new(auto_fc: Option<(u8, u8)>) -> Self {
        Self {
            rx: VecDeque::new(),
            sent: Vec::new(),
            auto_fc,
            cfs_since_fc: 0,
        }
    }

    fn enqueue(&mut self, data: &[u8]) {
        let frame = CanFrame::new(CanId::Standard(0x7E8), data).unwrap();
        self.rx.push_back(frame);
    }

    fn enqueue_fc(&mut self, block_size: u8, st_min: u8) {
        self.enqueue(&[0x30, block_size, st_min, 0, 0, 0, 0, 0]);
    }
}

#[async_trait]
impl FrameTransport for PeerTransport {
    async fn send(&mut self, frame: CanFrame) -> Result<(), TransportError> {
        if let Some((block_size, st_min)) = self.auto_fc {
            match frame.data().first().map(|b| b >> 4) {
                Some(0x1) => {
                    self.cfs_since_fc = 0;
                    self.enqueue_fc(block_size, st_min);
                }
                Some(0x2) if block_size > 0 => {
                    self.cfs_since_fc += 1;
                    if self.cfs_since_fc == block_size {
                        self.cfs_since_fc = 0;
                        self.enqueue_fc(block_size, st_min);
                    }
                }
                _ => {}
            }
        }
        self.sent.push(frame);
        Ok(())
    }

    async fn recv(&mut self, deadline: Instant) -> Result<Option<CanFrame>, TransportError> {
        match self.rx.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None => {
                sleep_until(deadline).await;
                Ok(None)
            }
        }
    }

    fn set_filter(&mut self, _accept: u32) {}
}

/// Reassemble whatever the encoder transmitted.
fn reassemble(frames: &[CanFrame]) -> Vec<u8> {
    let peer = ModuleAddress::standard(0x7E8, 0x7E0).unwrap();
    let mut decoder = IsoTpDecoder::new(peer, IsoTpConfig::default());
    let now = Instant::now();
    for frame in frames {
        match decoder.feed(frame, now).unwrap() {
            FeedOutcome::Complete(payload) => return payload,
            FeedOutcome::Pending | FeedOutcome::SendFlowControl(_) => {}
        }
    }
    panic!("transfer did not complete");
}

#[tokio::test(start_paused = true)]
async fn round_trip_across_representative_lengths() {
    for len in [1usize, 6, 7, 8, 13, 20, 62, 63, 128, 4095] {
        let payload: Vec<u8> = (0..len).map(|i| (i * 7 + 1) as u8).collect();
        let mut transport = PeerTransport::new(Some((0, 0)));
        let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

        encoder.send(&mut transport, &payload).await.unwrap();
        assert_eq!(reassemble(&transport.sent), payload, "length {len}");
    }
}

#[tokio::test(start_paused = true)]
async fn every_frame_stays_within_eight_bytes() {
    let payload = vec![0x55u8; 200];
    let mut transport = PeerTransport::new(Some((0, 0)));
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    encoder.send(&mut transport, &payload).await.unwrap();
    for frame in &transport.sent {
        assert!(frame.data().len() <= 8);
        assert_eq!(frame.id().raw(), 0x7E0);
    }
}

#[tokio::test(start_paused = true)]
async fn sequence_numbers_wrap_modulo_sixteen() {
    // 6 + 20 * 7 = 146 bytes: enough consecutive frames to wrap past 15.
    let payload = vec![0xA5u8; 146];
    let mut transport = PeerTransport::new(Some((0, 0)));
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    encoder.send(&mut transport, &payload).await.unwrap();

    let sequences: Vec<u8> = transport
        .sent
        .iter()
        .filter(|f| f.data()[0] >> 4 == 0x2)
        .map(|f| f.data()[0] & 0x0F)
        .collect();
    assert_eq!(sequences.len(), 20);
    for (i, sn) in sequences.iter().enumerate() {
        assert_eq!(*sn, ((i + 1) & 0x0F) as u8);
    }
}

#[tokio::test(start_paused = true)]
async fn single_frame_request_matches_compliance_fixture() {
    let mut transport = PeerTransport::new(None);
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    encoder
        .send(&mut transport, &[0x22, 0xF1, 0x90])
        .await
        .unwrap();

    assert_eq!(transport.sent.len(), 1);
    assert_eq!(
        transport.sent[0].data(),
        &[0x03, 0x22, 0xF1, 0x90, 0x00, 0x00, 0x00, 0x00]
    );
}

#[tokio::test(start_paused = true)]
async fn twenty_byte_payload_matches_compliance_fixture() {
    let payload: Vec<u8> = vec![
        0x62, 0xF1, 0x90, 0x31, 0x43, 0x34, 0x52, 0x4A, 0x46, 0x41, 0x47, 0x35, 0x46, 0x43, 0x31,
        0x32, 0x33, 0x34, 0x35, 0x36,
    ];
    let mut transport = PeerTransport::new(Some((0, 0)));
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    encoder.send(&mut transport, &payload).await.unwrap();

    let frames: Vec<&[u8]> = transport.sent.iter().map(|f| f.data()).collect();
    assert_eq!(
        frames,
        vec![
            &[0x10, 0x14, 0x62, 0xF1, 0x90, 0x31, 0x43, 0x34][..],
            &[0x21, 0x52, 0x4A, 0x46, 0x41, 0x47, 0x35, 0x46][..],
            &[0x22, 0x43, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36][..],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn block_size_forces_repeated_flow_control() {
    // 6 + 10 * 7 = 76 bytes: ten consecutive frames, blocks of four.
    let payload = vec![0x11u8; 76];
    let mut transport = PeerTransport::new(Some((4, 0)));
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    encoder.send(&mut transport, &payload).await.unwrap();
    assert_eq!(reassemble(&transport.sent), payload);
}

#[tokio::test(start_paused = true)]
async fn st_min_pacing_is_honoured() {
    let payload = vec![0x22u8; 20];
    let mut transport = PeerTransport::new(Some((0, 0x05)));
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    let start = Instant::now();
    encoder.send(&mut transport, &payload).await.unwrap();
    // One 5 ms gap between the two consecutive frames.
    assert!(start.elapsed() >= std::time::Duration::from_millis(5));
}

#[tokio::test(start_paused = true)]
async fn missing_flow_control_times_out() {
    let payload = vec![0x33u8; 20];
    let mut transport = PeerTransport::new(None);
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    let err = encoder.send(&mut transport, &payload).await.unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Protocol(IsoTpError::FlowControlTimeout)
    ));
}

#[tokio::test(start_paused = true)]
async fn wait_frames_extend_then_abort() {
    let payload = vec![0x44u8; 20];
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    // A handful of waits followed by a Continue succeeds.
    let mut transport = PeerTransport::new(None);
    for _ in 0..3 {
        transport.enqueue(&[0x31, 0x00, 0x00, 0, 0, 0, 0, 0]);
    }
    transport.enqueue_fc(0, 0);
    encoder.send(&mut transport, &payload).await.unwrap();
    assert_eq!(reassemble(&transport.sent), payload);

    // Eleven consecutive waits exceed the default cap of ten.
    let mut transport = PeerTransport::new(None);
    for _ in 0..11 {
        transport.enqueue(&[0x31, 0x00, 0x00, 0, 0, 0, 0, 0]);
    }
    let err = encoder.send(&mut transport, &payload).await.unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Protocol(IsoTpError::TooManyWaits)
    ));
}

#[tokio::test(start_paused = true)]
async fn overflow_aborts_the_transfer() {
    let payload = vec![0x55u8; 20];
    let mut transport = PeerTransport::new(None);
    transport.enqueue(&[0x32, 0x00, 0x00, 0, 0, 0, 0, 0]);

    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());
    let err = encoder.send(&mut transport, &payload).await.unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Protocol(IsoTpError::FlowControlOverflow)
    ));
}

#[tokio::test(start_paused = true)]
async fn reserved_st_min_is_a_protocol_error() {
    let payload = vec![0x66u8; 20];
    let mut transport = PeerTransport::new(None);
    transport.enqueue_fc(0, 0x80);

    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());
    let err = encoder.send(&mut transport, &payload).await.unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Protocol(IsoTpError::InvalidStMin(0x80))
    ));
}

#[tokio::test(start_paused = true)]
async fn reserved_flow_status_aborts() {
    let payload = vec![0x77u8; 20];
    let mut transport = PeerTransport::new(None);
    transport.enqueue(&[0x3F, 0x00, 0x00, 0, 0, 0, 0, 0]);

    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());
    let err = encoder.send(&mut transport, &payload).await.unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Protocol(IsoTpError::FlowControlAbort)
    ));
}

#[tokio::test(start_paused = true)]
async fn empty_and_oversized_payloads_are_rejected() {
    let mut transport = PeerTransport::new(None);
    let encoder = IsoTpEncoder::new(address(), IsoTpConfig::default());

    let err = encoder.send(&mut transport, &[]).await.unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Protocol(IsoTpError::EmptyPayload)
    ));

    let too_big = vec![0u8; 4096];
    let err = encoder.send(&mut transport, &too_big).await.unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Protocol(IsoTpError::PayloadTooLarge(4096))
    ));
}

#[tokio::test(start_paused = true)]
async fn unpadded_channel_sends_short_frames() {
    let config = IsoTpConfig {
        use_padding: false,
        ..IsoTpConfig::default()
    };
    let mut transport = PeerTransport::new(None);
    let encoder = IsoTpEncoder::new(address(), config);

    encoder.send(&mut transport, &[0x3E, 0x00]).await.unwrap();
    assert_eq!(transport.sent[0].data(), &[0x02, 0x3E, 0x00]);
}

#[tokio::test(start_paused = true)]
async fn configured_padding_byte_is_used() {
    let config = IsoTpConfig {
        padding_byte: 0xAA,
        ..IsoTpConfig::default()
    };
    let mut transport = PeerTransport::new(None);
    let encoder = IsoTpEncoder::new(address(), config);

    encoder.send(&mut transport, &[0x3E, 0x00]).await.unwrap();
    assert_eq!(
        transport.sent[0].data(),
        &[0x02, 0x3E, 0x00, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]
    );
}
