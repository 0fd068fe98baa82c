//! Inbound stream messages as delivered by the session/transport layer.

use bytes::Bytes;
use std::time::{Duration, Instant};

/// Identity of the peer that sent a message.
pub type SenderId = String;

/// A frame-bearing message for one logical stream.
///
/// The wire framing that produced this value is owned by the transport
/// collaborator; the jitter engine only sees the decoded fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMessage {
    /// Logical stream this message belongs to.
    pub stream_id: String,
    /// Sender-assigned position in the total stream order.
    pub sequence: u32,
    /// Codec-specific encoded payload.
    pub payload: Bytes,
    /// Sender-side capture time, relative to the sender's own clock.
    pub capture_timestamp: Duration,
    /// Nominal playback duration. Zero means unknown.
    pub frame_duration_ms: u32,
    pub is_retransmit: bool,
    /// First message of a stream segment.
    pub is_stream_start: bool,
    /// Last message of a stream segment; carries no payload.
    pub is_stream_end: bool,
}

impl StreamMessage {
    pub fn new(stream_id: impl Into<String>, sequence: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id: stream_id.into(),
            sequence,
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn with_frame_duration_ms(mut self, frame_duration_ms: u32) -> Self {
        self.frame_duration_ms = frame_duration_ms;
        self
    }

    pub fn with_capture_timestamp(mut self, capture_timestamp: Duration) -> Self {
        self.capture_timestamp = capture_timestamp;
        self
    }

    pub fn with_retransmit(mut self, is_retransmit: bool) -> Self {
        self.is_retransmit = is_retransmit;
        self
    }

    /// Build a stream-start message carrying the first frame of a segment.
    pub fn stream_start(mut self) -> Self {
        self.is_stream_start = true;
        self
    }

    /// Build a payload-less stream-end marker.
    pub fn stream_end(stream_id: impl Into<String>, sequence: u32) -> Self {
        Self {
            stream_id: stream_id.into(),
            sequence,
            is_stream_end: true,
            ..Default::default()
        }
    }
}

/// A [`StreamMessage`] tagged with its local arrival time and sender.
///
/// This is the input type of the sans-IO receiver, mirroring how transport
/// messages carry `now` alongside the message body.
#[derive(Debug, Clone)]
pub struct TaggedMessage {
    /// Local monotonic arrival time.
    pub now: Instant,
    pub sender: SenderId,
    pub message: StreamMessage,
}

impl TaggedMessage {
    pub fn new(now: Instant, sender: impl Into<SenderId>, message: StreamMessage) -> Self {
        Self {
            now,
            sender: sender.into(),
            message,
        }
    }
}

/// Per-message metadata handed to the codec alongside the payload bytes.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub stream_id: &'a str,
    pub sender: &'a str,
    pub sequence: u32,
    pub capture_timestamp: Duration,
    pub received_timestamp: Instant,
    pub frame_duration_ms: u32,
    pub is_retransmit: bool,
}
