//! Sans-IO jitter receiver.
//!
//! [`JitterReceiver`] owns the buffer and all sequence/statistics state of one
//! logical stream. It performs no I/O and reads no clock: arrival time comes
//! in on each [`TaggedMessage`] and pacing time on each `handle_timeout`.
//!
//! # Flow
//!
//! ```text
//! handle_read(msg)   -> lifecycle -> sequence admission -> decode -> buffer
//! handle_timeout(now) -> warm-up gate -> drain (<= 3) -> gap resolution
//!                                     -> age cleanup -> stale-gap jump
//! poll_read()   -> emitted frames in order
//! poll_event()  -> StreamEvent notifications in order
//! ```

use crate::buffer::{InsertOutcome, JitterBuffer, capacity_frames};
use crate::codec::FrameCodec;
use crate::config::JitterConfig;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink};
use crate::error::{Error, Result};
use crate::event::StreamEvent;
use crate::frame::StreamFrame;
use crate::message::{MessageContext, TaggedMessage};
use crate::stats::ChannelStats;
use log::{Level, debug, trace};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frames drained per tick at most.
const MAX_DRAIN_PER_TICK: usize = 3;
/// Largest gap resolved slot by slot through concealment.
const MAX_CONCEALABLE_GAP: u32 = 3;
/// The initial build-up is abandoned once this many frames have been received.
const WARMUP_RECEIVE_WINDOW: u64 = 10;
/// Minimum frames buffered before the first drain.
const MIN_WARMUP_FRAMES: u32 = 2;
/// Lower bound of the stale-gap jump threshold.
const MIN_STALE_GAP: u32 = 5;
/// Target depth per unit of stale-gap threshold.
const STALE_GAP_DIVISOR_MS: u128 = 40;
/// Per-sequence drop notifications emitted for one skipped gap at most.
/// The drop counter always accounts for the whole gap.
const MAX_GAP_NOTIFICATIONS: u32 = 1024;

/// Jitter buffer engine for one stream.
///
/// Implements [`sansio::Protocol`] with [`TaggedMessage`] as read input,
/// [`StreamFrame`] as read output and [`StreamEvent`] as event output.
/// Not thread-safe on its own; see [`JitterChannel`](crate::JitterChannel).
pub struct JitterReceiver<C: FrameCodec> {
    stream_id: String,
    config: JitterConfig,
    codec: C,
    sink: Box<dyn DiagnosticSink>,

    buffer: JitterBuffer<C::Payload>,

    /// Next sequence the pacer will emit. Only moves backwards on reset or
    /// stream start.
    expected_sequence: u32,
    highest_sequence_received: u32,
    /// Set once the first frame of a segment has positioned the watermark.
    sequence_initialized: bool,
    /// Initial build-up finished; the warm-up gate no longer applies.
    warmed_up: bool,
    is_streaming: bool,
    disposed: bool,
    last_emit_time: Option<Instant>,
    last_tick: Option<Instant>,

    total_received: u64,
    total_dropped: u64,
    total_late: u64,
    total_concealed: u64,
    total_decode_failures: u64,

    read_queue: VecDeque<StreamFrame<C::Payload>>,
    event_queue: VecDeque<StreamEvent>,
}

impl<C: FrameCodec> JitterReceiver<C> {
    pub(crate) fn new(
        stream_id: String,
        config: JitterConfig,
        codec: C,
        sink: Box<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            stream_id,
            config,
            codec,
            sink,
            buffer: JitterBuffer::new(),
            expected_sequence: 0,
            highest_sequence_received: 0,
            sequence_initialized: false,
            warmed_up: false,
            is_streaming: false,
            disposed: false,
            last_emit_time: None,
            last_tick: None,
            total_received: 0,
            total_dropped: 0,
            total_late: 0,
            total_concealed: 0,
            total_decode_failures: 0,
            read_queue: VecDeque::new(),
            event_queue: VecDeque::new(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn config(&self) -> &JitterConfig {
        &self.config
    }

    /// Replace the configuration.
    ///
    /// Turning jitter buffering off flushes anything still buffered, in
    /// sequence order, so no frame is stranded.
    pub fn set_config(&mut self, config: JitterConfig) -> Result<()> {
        config.validate()?;
        let flush = self.config.jitter_buffering && !config.jitter_buffering;
        self.config = config;
        if flush {
            for frame in self.buffer.drain_all() {
                self.expected_sequence = frame.sequence.saturating_add(1);
                self.read_queue.push_back(frame);
            }
        }
        Ok(())
    }

    pub fn expected_sequence(&self) -> u32 {
        self.expected_sequence
    }

    pub fn highest_sequence_received(&self) -> u32 {
        self.highest_sequence_received
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            total_received: self.total_received,
            total_dropped: self.total_dropped,
            total_late: self.total_late,
            total_concealed: self.total_concealed,
            total_decode_failures: self.total_decode_failures,
            expected_sequence: self.expected_sequence,
            highest_sequence_received: self.highest_sequence_received,
            buffered_frames: self.buffer.len(),
            buffered_duration: self.buffer.buffered_duration(),
            is_streaming: self.is_streaming,
        }
    }

    /// Clear the buffer and zero watermarks and counters.
    ///
    /// Configuration and the streaming flag are kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_sequence = 0;
        self.highest_sequence_received = 0;
        self.sequence_initialized = false;
        self.warmed_up = false;
        self.last_emit_time = None;
        self.total_received = 0;
        self.total_dropped = 0;
        self.total_late = 0;
        self.total_concealed = 0;
        self.total_decode_failures = 0;
        self.report(Diagnostic::new(Level::Debug, DiagnosticCode::Reset));
    }

    /// Make the receiver permanently inert.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.buffer.clear();
        self.read_queue.clear();
        self.event_queue.clear();
        self.report(Diagnostic::new(Level::Debug, DiagnosticCode::Disposed));
    }

    /// Admit one inbound message.
    ///
    /// Messages for other streams, and everything after [`dispose`](Self::dispose),
    /// are ignored. Stream conditions never surface as errors.
    pub fn admit(&mut self, msg: TaggedMessage) {
        if self.disposed || msg.message.stream_id != self.stream_id {
            return;
        }
        let TaggedMessage {
            now,
            sender,
            message,
        } = msg;

        if message.is_stream_start && !self.is_streaming {
            self.start_stream();
        }
        if message.is_stream_end {
            if self.is_streaming {
                self.end_stream();
            }
            return;
        }

        let sequence = message.sequence;
        self.total_received += 1;
        self.highest_sequence_received = self.highest_sequence_received.max(sequence);
        if !self.sequence_initialized {
            self.sequence_initialized = true;
            if self.expected_sequence == 0 && sequence != 0 {
                debug!(
                    "[{}] first sequence {} adopted as watermark",
                    self.stream_id, sequence
                );
                self.expected_sequence = sequence;
            }
        }

        if sequence < self.expected_sequence {
            self.report(
                Diagnostic::new(Level::Trace, DiagnosticCode::StaleFrame)
                    .with_sequence(sequence)
                    .with_value(u64::from(self.expected_sequence)),
            );
            return;
        }

        let frame_duration_ms = if message.frame_duration_ms == 0 {
            self.config.default_frame_duration_ms
        } else {
            message.frame_duration_ms
        };
        let ctx = MessageContext {
            stream_id: &self.stream_id,
            sender: &sender,
            sequence,
            capture_timestamp: message.capture_timestamp,
            received_timestamp: now,
            frame_duration_ms,
            is_retransmit: message.is_retransmit,
        };
        let payload = match self.codec.decode(&message.payload, &ctx) {
            Ok(payload) => payload,
            Err(err) => {
                self.total_decode_failures += 1;
                debug!("[{}] dropping seq {}: {}", self.stream_id, sequence, err);
                self.report(
                    Diagnostic::new(Level::Warn, DiagnosticCode::DecodeFailed)
                        .with_sequence(sequence),
                );
                return;
            }
        };

        let frame = StreamFrame {
            sequence,
            payload,
            capture_timestamp: message.capture_timestamp,
            received_timestamp: now,
            frame_duration_ms,
            is_retransmit: message.is_retransmit,
            is_concealed: false,
        };

        if self.config.jitter_buffering {
            self.insert(frame);
        } else {
            self.expected_sequence = sequence.saturating_add(1);
            self.last_emit_time = Some(now);
            self.read_queue.push_back(frame);
        }
    }

    /// Run one pacing step at `now`. Bounded work: at most three drains plus
    /// one gap resolution, one age sweep and one stale-gap check.
    pub fn tick(&mut self, now: Instant) {
        if self.disposed || !self.config.jitter_buffering {
            return;
        }
        self.last_tick = Some(now);

        let Some(first) = self.buffer.first() else {
            if self.is_streaming {
                self.report(Diagnostic::new(Level::Trace, DiagnosticCode::Underrun));
            }
            return;
        };

        if !self.warmed_up
            && self.buffer.len() < self.minimum_frames(first.frame_duration_ms)
            && self.total_received <= WARMUP_RECEIVE_WINDOW
        {
            self.report(
                Diagnostic::new(Level::Trace, DiagnosticCode::Buffering)
                    .with_value(self.buffer.len() as u64),
            );
        } else {
            self.warmed_up = true;
            for _ in 0..MAX_DRAIN_PER_TICK {
                let Some(frame) = self.buffer.take(self.expected_sequence) else {
                    break;
                };
                self.emit_paced(frame, now);
            }
            self.resolve_gap(now);
        }

        // age and stale-gap sweeps run even while the initial buffer builds
        self.remove_aged(now);
        self.skip_stale_gap();
    }

    /// Earliest instant at which another tick can make progress.
    fn next_tick(&self) -> Option<Instant> {
        if self.disposed || !self.config.jitter_buffering {
            return None;
        }
        let first = self.buffer.first()?;
        Some(match self.last_tick {
            Some(last) => last + first.frame_duration(),
            None => first.received_timestamp,
        })
    }

    fn minimum_frames(&self, frame_duration_ms: u32) -> usize {
        let per_frame = u128::from(frame_duration_ms.max(1));
        let frames = usize::try_from(self.config.target_buffer.as_millis() / per_frame)
            .unwrap_or(usize::MAX);
        frames.max(MIN_WARMUP_FRAMES as usize)
    }

    fn stale_gap_threshold(&self) -> u32 {
        let span = u32::try_from(self.config.target_buffer.as_millis() / STALE_GAP_DIVISOR_MS)
            .unwrap_or(u32::MAX);
        span.max(MIN_STALE_GAP)
    }

    fn start_stream(&mut self) {
        self.is_streaming = true;
        self.buffer.clear();
        self.expected_sequence = 0;
        self.highest_sequence_received = 0;
        self.sequence_initialized = false;
        self.warmed_up = false;
        self.last_emit_time = None;
        self.event_queue.push_back(StreamEvent::StreamStarted);
        self.report(Diagnostic::new(Level::Debug, DiagnosticCode::StreamStarted));
    }

    fn end_stream(&mut self) {
        self.is_streaming = false;
        self.buffer.clear();
        self.event_queue.push_back(StreamEvent::StreamEnded);
        self.report(Diagnostic::new(Level::Debug, DiagnosticCode::StreamEnded));
    }

    fn insert(&mut self, frame: StreamFrame<C::Payload>) {
        let sequence = frame.sequence;
        let capacity = capacity_frames(self.config.max_buffer, frame.frame_duration_ms);
        match self.buffer.insert(frame, self.expected_sequence) {
            InsertOutcome::Inserted => {}
            InsertOutcome::Replaced => self.report(
                Diagnostic::new(Level::Trace, DiagnosticCode::DuplicateFrame)
                    .with_sequence(sequence),
            ),
            InsertOutcome::Stale => {
                self.report(
                    Diagnostic::new(Level::Trace, DiagnosticCode::StaleFrame)
                        .with_sequence(sequence),
                );
                return;
            }
        }

        // Evicted slots are gone for good, so the watermark moves past them.
        for evicted in self.buffer.evict_overflow(capacity) {
            if evicted > self.expected_sequence {
                self.skip_to(evicted);
            }
            self.drop_slot(evicted, DiagnosticCode::Overflow);
            self.expected_sequence = evicted.saturating_add(1);
        }
    }

    fn emit_paced(&mut self, frame: StreamFrame<C::Payload>, now: Instant) {
        if let Some(last_emit) = self.last_emit_time {
            let expected_playback = last_emit + frame.frame_duration();
            let tolerance = expected_playback.checked_add(self.config.target_buffer);
            if tolerance.is_some_and(|deadline| now > deadline) {
                let lateness = now - expected_playback;
                self.total_late += 1;
                self.event_queue.push_back(StreamEvent::FrameLate {
                    sequence: frame.sequence,
                    lateness,
                });
                self.report(
                    Diagnostic::new(Level::Debug, DiagnosticCode::LateFrame)
                        .with_sequence(frame.sequence)
                        .with_value(lateness.as_millis() as u64),
                );
            }
        }
        self.last_emit_time = Some(now);
        self.expected_sequence = self.expected_sequence.saturating_add(1);
        self.read_queue.push_back(frame);
    }

    fn resolve_gap(&mut self, now: Instant) {
        if self.buffer.contains(self.expected_sequence) {
            return;
        }
        let Some(next_available) = self.buffer.next_after(self.expected_sequence) else {
            return;
        };

        if !self.config.loss_detection {
            self.expected_sequence = next_available;
        } else if next_available - self.expected_sequence <= MAX_CONCEALABLE_GAP {
            self.conceal_one(now);
        } else {
            self.skip_to(next_available);
        }
    }

    /// Fill the single slot at the watermark, by concealment or by a drop.
    fn conceal_one(&mut self, now: Instant) {
        let sequence = self.expected_sequence;
        match self.codec.conceal_missing(sequence) {
            Some(payload) => {
                let frame_duration_ms = self
                    .buffer
                    .first()
                    .map_or(self.config.default_frame_duration_ms, |f| {
                        f.frame_duration_ms
                    });
                self.total_concealed += 1;
                self.last_emit_time = Some(now);
                self.read_queue.push_back(StreamFrame {
                    sequence,
                    payload,
                    capture_timestamp: Duration::ZERO,
                    received_timestamp: now,
                    frame_duration_ms,
                    is_retransmit: false,
                    is_concealed: true,
                });
                self.report(
                    Diagnostic::new(Level::Debug, DiagnosticCode::Concealed)
                        .with_sequence(sequence),
                );
            }
            None => self.drop_slot(sequence, DiagnosticCode::LostFrame),
        }
        self.expected_sequence = sequence.saturating_add(1);
    }

    /// Give up every slot in `[expected_sequence, next_available)` and jump.
    fn skip_to(&mut self, next_available: u32) {
        let from = self.expected_sequence;
        let span = next_available - from;
        if self.config.loss_detection {
            let notified = span.min(MAX_GAP_NOTIFICATIONS);
            for sequence in from..from + notified {
                self.event_queue
                    .push_back(StreamEvent::FrameDropped { sequence });
            }
            self.total_dropped += u64::from(span);
            self.report(
                Diagnostic::new(Level::Debug, DiagnosticCode::GapSkipped)
                    .with_sequence(from)
                    .with_value(u64::from(span)),
            );
        }
        self.expected_sequence = next_available;
    }

    fn remove_aged(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.config.max_buffer) else {
            return;
        };
        for sequence in self.buffer.remove_received_before(cutoff) {
            self.drop_slot(sequence, DiagnosticCode::AgedOut);
        }
    }

    fn skip_stale_gap(&mut self) {
        let Some(first) = self.buffer.first_sequence() else {
            return;
        };
        if first > self.expected_sequence
            && first - self.expected_sequence > self.stale_gap_threshold()
        {
            trace!(
                "[{}] stale gap {}..{}",
                self.stream_id, self.expected_sequence, first
            );
            self.skip_to(first);
        }
    }

    fn drop_slot(&mut self, sequence: u32, code: DiagnosticCode) {
        self.total_dropped += 1;
        self.event_queue
            .push_back(StreamEvent::FrameDropped { sequence });
        self.report(Diagnostic::new(Level::Debug, code).with_sequence(sequence));
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.sink.report(&self.stream_id, diagnostic);
    }
}

impl<C: FrameCodec> sansio::Protocol<TaggedMessage, (), ()> for JitterReceiver<C> {
    type Rout = StreamFrame<C::Payload>;
    type Wout = ();
    type Eout = StreamEvent;
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedMessage) -> Result<()> {
        self.admit(msg);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.read_queue.pop_front()
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        None
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_queue.pop_front()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<()> {
        self.tick(now);
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.next_tick()
    }

    fn close(&mut self) -> Result<()> {
        self.dispose();
        Ok(())
    }
}
