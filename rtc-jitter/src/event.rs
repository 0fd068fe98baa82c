//! Outbound notifications.

use std::time::Duration;

/// Notification emitted by the receiver during `admit`/`tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// A stream-start signal moved the channel into streaming.
    StreamStarted,
    /// A stream-end signal moved the channel out of streaming.
    StreamEnded,
    /// A sequence slot was given up: evicted, aged out or skipped as lost.
    FrameDropped { sequence: u32 },
    /// A frame was emitted later than its expected playback time plus the target depth.
    FrameLate { sequence: u32, lateness: Duration },
}

/// Observer of [`StreamEvent`]s.
///
/// Observers are invoked synchronously, in registration order, after the
/// channel lock has been released. They must return quickly and must not call
/// back into `admit`/`tick` of the channel that notified them.
pub trait StreamObserver: Send {
    fn on_event(&mut self, event: &StreamEvent);
}

impl<F> StreamObserver for F
where
    F: FnMut(&StreamEvent) + Send,
{
    fn on_event(&mut self, event: &StreamEvent) {
        self(event)
    }
}
