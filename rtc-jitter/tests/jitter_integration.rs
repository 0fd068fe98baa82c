//! Integration tests for the jitter receiver.
//!
//! These tests verify that the receiver correctly:
//! - Emits frames in sequence order regardless of arrival order
//! - Treats duplicates idempotently
//! - Bounds its memory under over-delivery
//! - Conceals small gaps and skips large ones
//! - Follows the stream start/end lifecycle
//! - Adopts a non-zero initial sequence

use bytes::Bytes;
use rtc_jitter::{
    BytesCodec, FrameCodec, JitterChannel, JitterReceiver, JitterReceiverBuilder,
    MessageContext, Result, StreamEvent, StreamFrame, StreamMessage, TaggedMessage,
};
use sansio::Protocol;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// =============================================================================
// Helper Functions
// =============================================================================

const STREAM: &str = "voice";
const FRAME_MS: u32 = 40;

fn init_logger() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .is_test(true)
        .try_init()
        .ok();
}

/// Codec that conceals every missing frame with an empty payload.
struct ConcealingCodec;

impl FrameCodec for ConcealingCodec {
    type Payload = Bytes;

    fn decode(&mut self, bytes: &Bytes, _ctx: &MessageContext<'_>) -> Result<Bytes> {
        Ok(bytes.clone())
    }

    fn conceal_missing(&mut self, _sequence: u32) -> Option<Bytes> {
        Some(Bytes::new())
    }
}

fn create_message(seq: u32) -> StreamMessage {
    StreamMessage::new(STREAM, seq, Bytes::from(seq.to_be_bytes().to_vec()))
        .with_frame_duration_ms(FRAME_MS)
}

fn tagged(now: Instant, message: StreamMessage) -> TaggedMessage {
    TaggedMessage::new(now, "peer-1", message)
}

fn receiver<C: FrameCodec>(codec: C) -> JitterReceiver<C> {
    JitterReceiverBuilder::new(STREAM)
        .with_target_buffer(Duration::from_millis(80))
        .with_max_buffer(Duration::from_millis(1000))
        .build(codec)
        .unwrap()
}

fn admit_all<C: FrameCodec>(r: &mut JitterReceiver<C>, now: Instant, seqs: &[u32]) {
    for &seq in seqs {
        r.handle_read(tagged(now, create_message(seq))).unwrap();
    }
}

fn poll_frames<C: FrameCodec>(r: &mut JitterReceiver<C>) -> Vec<StreamFrame<C::Payload>> {
    let mut frames = Vec::new();
    while let Some(frame) = r.poll_read() {
        frames.push(frame);
    }
    frames
}

fn poll_events<C: FrameCodec>(r: &mut JitterReceiver<C>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = r.poll_event() {
        events.push(event);
    }
    events
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_order_preserved_for_shuffled_arrival() {
    init_logger();
    let now = Instant::now();
    let mut r = receiver(BytesCodec);

    // first arrival positions the watermark; the rest arrive scrambled
    let arrival = [0u32, 7, 3, 1, 9, 4, 2, 8, 6, 5, 11, 10];
    admit_all(&mut r, now, &arrival);

    let mut emitted = Vec::new();
    for _ in 0..10 {
        r.handle_timeout(now).unwrap();
        emitted.extend(poll_frames(&mut r).into_iter().map(|f| f.sequence));
    }

    assert_eq!(emitted, (0..12).collect::<Vec<_>>());
    assert_eq!(r.stats().total_dropped, 0);
}

#[test]
fn test_payload_ownership_passes_to_consumer() {
    let now = Instant::now();
    let mut r = receiver(BytesCodec);
    admit_all(&mut r, now, &[0, 1]);
    r.handle_timeout(now).unwrap();

    let frames = poll_frames(&mut r);
    assert_eq!(frames[0].payload, Bytes::from(0u32.to_be_bytes().to_vec()));
    assert_eq!(frames[1].payload, Bytes::from(1u32.to_be_bytes().to_vec()));
    assert_eq!(frames[0].frame_duration_ms, FRAME_MS);
    assert!(!frames[0].is_concealed);
    assert_eq!(r.buffered_len(), 0);
}

// =============================================================================
// Duplicates
// =============================================================================

#[test]
fn test_duplicate_last_write_wins() {
    let now = Instant::now();
    let mut r = receiver(BytesCodec);

    r.handle_read(tagged(now, create_message(0))).unwrap();
    r.handle_read(tagged(
        now,
        StreamMessage::new(STREAM, 0, &b"second"[..])
            .with_frame_duration_ms(FRAME_MS)
            .with_retransmit(true),
    ))
    .unwrap();
    assert_eq!(r.buffered_len(), 1);

    r.handle_read(tagged(now, create_message(1))).unwrap();
    r.handle_timeout(now).unwrap();

    let frames = poll_frames(&mut r);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload, Bytes::from_static(b"second"));
    assert!(frames[0].is_retransmit);
}

#[test]
fn test_duplicate_after_drain_is_noop() {
    let now = Instant::now();
    let mut r = receiver(BytesCodec);
    admit_all(&mut r, now, &[0, 1, 2]);
    r.handle_timeout(now).unwrap();
    assert_eq!(poll_frames(&mut r).len(), 3);

    let before = r.stats();
    admit_all(&mut r, now, &[1, 2]);
    let after = r.stats();

    assert_eq!(after.total_received, before.total_received + 2);
    assert_eq!(after.total_dropped, before.total_dropped);
    assert_eq!(after.expected_sequence, 3);
    assert_eq!(r.buffered_len(), 0);
    r.handle_timeout(now).unwrap();
    assert!(poll_frames(&mut r).is_empty());
}

// =============================================================================
// Memory bound
// =============================================================================

#[test]
fn test_buffer_bounded_under_over_delivery() {
    let now = Instant::now();
    let mut r = JitterReceiverBuilder::new(STREAM)
        .with_target_buffer(Duration::from_millis(80))
        .with_max_buffer(Duration::from_millis(400))
        .build(BytesCodec)
        .unwrap();
    // max(5, 400 / 40) = 10
    let capacity = 10;

    for seq in 0..100 {
        r.handle_read(tagged(now, create_message(seq))).unwrap();
        assert!(r.buffered_len() <= capacity);
    }

    let stats = r.stats();
    assert_eq!(stats.buffered_frames, capacity);
    assert_eq!(stats.total_dropped, 90);
    assert_eq!(stats.expected_sequence, 90);

    let dropped = poll_events(&mut r)
        .into_iter()
        .filter(|e| matches!(e, StreamEvent::FrameDropped { .. }))
        .count();
    assert_eq!(dropped, 90);
}

#[test]
fn test_bounded_floor_of_five_frames() {
    let now = Instant::now();
    let mut r = JitterReceiverBuilder::new(STREAM)
        .with_target_buffer(Duration::from_millis(20))
        .with_max_buffer(Duration::from_millis(40))
        .build(BytesCodec)
        .unwrap();

    for seq in 0..20 {
        r.handle_read(tagged(now, create_message(seq))).unwrap();
    }
    assert_eq!(r.buffered_len(), 5);
}

// =============================================================================
// Loss handling
// =============================================================================

#[test]
fn test_gap_concealment() {
    init_logger();
    let now = Instant::now();
    let mut r = receiver(ConcealingCodec);
    admit_all(&mut r, now, &[0, 1, 3]);

    r.handle_timeout(now).unwrap();
    r.handle_timeout(now).unwrap();

    let frames: Vec<(u32, bool)> = poll_frames(&mut r)
        .into_iter()
        .map(|f| (f.sequence, f.is_concealed))
        .collect();
    assert_eq!(frames, vec![(0, false), (1, false), (2, true), (3, false)]);
    assert_eq!(r.expected_sequence(), 4);
    assert_eq!(r.stats().total_concealed, 1);
    assert_eq!(r.stats().total_dropped, 0);
}

#[test]
fn test_gap_drop_without_concealment() {
    let now = Instant::now();
    let mut r = receiver(BytesCodec);
    admit_all(&mut r, now, &[0, 1, 3]);

    r.handle_timeout(now).unwrap();
    r.handle_timeout(now).unwrap();

    let seqs: Vec<u32> = poll_frames(&mut r).into_iter().map(|f| f.sequence).collect();
    assert_eq!(seqs, vec![0, 1, 3]);
    assert_eq!(
        poll_events(&mut r),
        vec![StreamEvent::FrameDropped { sequence: 2 }]
    );
    assert_eq!(r.expected_sequence(), 4);
}

#[test]
fn test_large_gap_skip() {
    let now = Instant::now();
    let mut r = receiver(ConcealingCodec);
    admit_all(&mut r, now, &[0, 10]);

    r.handle_timeout(now).unwrap();
    assert_eq!(r.stats().total_dropped, 9);
    assert_eq!(r.expected_sequence(), 10);
    assert_eq!(
        poll_events(&mut r),
        (1..10)
            .map(|sequence| StreamEvent::FrameDropped { sequence })
            .collect::<Vec<_>>()
    );

    r.handle_timeout(now).unwrap();
    let seqs: Vec<u32> = poll_frames(&mut r).into_iter().map(|f| f.sequence).collect();
    assert_eq!(seqs, vec![0, 10]);
    assert_eq!(r.expected_sequence(), 11);
    assert_eq!(r.stats().total_concealed, 0);
}

#[test]
fn test_late_frame_reported() {
    let base = Instant::now();
    let mut r = receiver(BytesCodec);
    admit_all(&mut r, base, &[0, 1]);
    r.handle_timeout(base).unwrap();

    r.handle_read(tagged(base, create_message(2))).unwrap();
    r.handle_timeout(base + Duration::from_millis(500)).unwrap();

    assert_eq!(
        poll_events(&mut r),
        vec![StreamEvent::FrameLate {
            sequence: 2,
            lateness: Duration::from_millis(460)
        }]
    );
    assert_eq!(r.stats().total_late, 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_stream_restart_resets_watermarks() {
    let now = Instant::now();
    let mut r = receiver(BytesCodec);

    r.handle_read(tagged(now, create_message(100).stream_start()))
        .unwrap();
    admit_all(&mut r, now, &[101, 102]);
    // repeated start while streaming does not notify again
    r.handle_read(tagged(now, create_message(103).stream_start()))
        .unwrap();
    assert_eq!(r.highest_sequence_received(), 103);

    r.handle_read(tagged(now, StreamMessage::stream_end(STREAM, 104)))
        .unwrap();
    assert!(!r.is_streaming());

    r.handle_read(tagged(now, create_message(0).stream_start()))
        .unwrap();
    assert!(r.is_streaming());
    assert_eq!(r.expected_sequence(), 0);
    assert_eq!(r.highest_sequence_received(), 0);

    assert_eq!(
        poll_events(&mut r),
        vec![
            StreamEvent::StreamStarted,
            StreamEvent::StreamEnded,
            StreamEvent::StreamStarted
        ]
    );
}

#[test]
fn test_reset_zeroes_counters() {
    let now = Instant::now();
    let mut r = receiver(BytesCodec);
    admit_all(&mut r, now, &[0, 10]);
    r.handle_timeout(now).unwrap();
    assert!(r.stats().total_dropped > 0);

    r.reset();
    let stats = r.stats();
    assert_eq!(stats.total_received, 0);
    assert_eq!(stats.total_dropped, 0);
    assert_eq!(stats.total_late, 0);
    assert_eq!(stats.expected_sequence, 0);
    assert_eq!(stats.buffered_frames, 0);
}

// =============================================================================
// Scenario
// =============================================================================

#[test]
fn test_nonzero_initial_sequence() {
    init_logger();
    let now = Instant::now();
    let mut r = receiver(BytesCodec);

    r.handle_read(tagged(now, create_message(5))).unwrap();
    assert_eq!(r.expected_sequence(), 5);
    admit_all(&mut r, now, &[6, 7]);

    r.handle_timeout(now).unwrap();
    r.handle_timeout(now).unwrap();

    let seqs: Vec<u32> = poll_frames(&mut r).into_iter().map(|f| f.sequence).collect();
    assert_eq!(seqs, vec![5, 6, 7]);
    assert_eq!(r.stats().total_dropped, 0);
}

#[test]
fn test_channel_end_to_end() {
    init_logger();
    let base = Instant::now();
    let channel = JitterChannel::new(receiver(ConcealingCodec));

    let frames = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let frames = Arc::clone(&frames);
        channel.set_consumer(move |frame: StreamFrame<Bytes>| {
            frames
                .lock()
                .unwrap()
                .push((frame.sequence, frame.is_concealed));
        });
        let events = Arc::clone(&events);
        channel.add_observer(move |event: &StreamEvent| events.lock().unwrap().push(*event));
    }

    channel.admit_at(base, create_message(20).stream_start(), "peer-1");
    for seq in [21, 23, 24] {
        channel.admit_at(base, create_message(seq), "peer-1");
    }

    let mut now = base;
    while let Some(next) = channel.poll_timeout() {
        now = next.max(now);
        channel.tick_at(now);
    }
    channel.admit_at(now, StreamMessage::stream_end(STREAM, 25), "peer-1");

    assert_eq!(
        *frames.lock().unwrap(),
        vec![
            (20, false),
            (21, false),
            (22, true),
            (23, false),
            (24, false)
        ]
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec![StreamEvent::StreamStarted, StreamEvent::StreamEnded]
    );
    assert_eq!(channel.stats().expected_sequence, 25);
}
