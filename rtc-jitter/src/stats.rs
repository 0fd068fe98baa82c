use std::time::Duration;

/// Point-in-time snapshot of a receiver's counters and watermarks.
///
/// Counters grow for the life of the receiver and are zeroed only by
/// [`JitterReceiver::reset`](crate::JitterReceiver::reset).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Frame-bearing messages admitted for this stream, stale ones included.
    pub total_received: u64,
    /// Slots given up: evicted, aged out, or lost in a gap.
    pub total_dropped: u64,
    pub total_late: u64,
    /// Slots filled by codec concealment.
    pub total_concealed: u64,
    pub total_decode_failures: u64,
    pub expected_sequence: u32,
    pub highest_sequence_received: u32,
    pub buffered_frames: usize,
    /// Sum of nominal durations of buffered frames.
    pub buffered_duration: Duration,
    pub is_streaming: bool,
}
