use std::time::{Duration, Instant};

/// One decoded payload unit, held by the jitter buffer until emitted.
///
/// Once emitted the engine keeps no reference to the frame; the payload is
/// owned by whoever received it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame<P> {
    pub sequence: u32,
    pub payload: P,
    /// Sender-side capture time. Used for latency only, never for ordering.
    pub capture_timestamp: Duration,
    /// Local arrival time. Used for lateness and age cleanup, never for ordering.
    pub received_timestamp: Instant,
    /// Nominal playback duration; the configured fallback when the sender left it unset.
    pub frame_duration_ms: u32,
    pub is_retransmit: bool,
    /// Produced by codec concealment instead of received from the sender.
    pub is_concealed: bool,
}

impl<P> StreamFrame<P> {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.frame_duration_ms))
    }
}
