//! Sequence-ordered frame store backing the receiver.

use crate::frame::StreamFrame;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Lower bound on the eviction ceiling, whatever the configured depth.
const MIN_CAPACITY_FRAMES: usize = 5;

/// Result of [`JitterBuffer::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertOutcome {
    /// Below the watermark; the frame was not stored.
    Stale,
    Inserted,
    /// An entry already existed at this sequence and was overwritten.
    Replaced,
}

/// Maximum number of buffered frames for a `max_buffer` depth.
pub(crate) fn capacity_frames(max_buffer: Duration, frame_duration_ms: u32) -> usize {
    let per_frame = u128::from(frame_duration_ms.max(1));
    let frames = (max_buffer.as_millis() / per_frame) as usize;
    frames.max(MIN_CAPACITY_FRAMES)
}

/// Ordered store keyed by sequence number.
///
/// Holds at most one frame per sequence. The owner passes its watermark on
/// insertion so nothing below it is ever stored.
pub(crate) struct JitterBuffer<P> {
    frames: BTreeMap<u32, StreamFrame<P>>,
}

impl<P> JitterBuffer<P> {
    pub(crate) fn new() -> Self {
        Self {
            frames: BTreeMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    pub(crate) fn contains(&self, sequence: u32) -> bool {
        self.frames.contains_key(&sequence)
    }

    /// Store `frame` unless it is below `watermark`. Last write wins.
    pub(crate) fn insert(&mut self, frame: StreamFrame<P>, watermark: u32) -> InsertOutcome {
        if frame.sequence < watermark {
            return InsertOutcome::Stale;
        }
        match self.frames.insert(frame.sequence, frame) {
            Some(_) => InsertOutcome::Replaced,
            None => InsertOutcome::Inserted,
        }
    }

    /// Evict lowest sequences until at most `capacity` frames remain.
    ///
    /// Returns evicted sequences in ascending order.
    pub(crate) fn evict_overflow(&mut self, capacity: usize) -> Vec<u32> {
        let mut evicted = Vec::new();
        while self.frames.len() > capacity {
            match self.frames.pop_first() {
                Some((sequence, _)) => evicted.push(sequence),
                None => break,
            }
        }
        evicted
    }

    pub(crate) fn take(&mut self, sequence: u32) -> Option<StreamFrame<P>> {
        self.frames.remove(&sequence)
    }

    pub(crate) fn first_sequence(&self) -> Option<u32> {
        self.frames.keys().next().copied()
    }

    /// Earliest buffered frame.
    pub(crate) fn first(&self) -> Option<&StreamFrame<P>> {
        self.frames.values().next()
    }

    /// Remove and return every buffered frame in sequence order.
    pub(crate) fn drain_all(&mut self) -> Vec<StreamFrame<P>> {
        std::mem::take(&mut self.frames).into_values().collect()
    }

    /// Smallest buffered sequence strictly greater than `sequence`.
    pub(crate) fn next_after(&self, sequence: u32) -> Option<u32> {
        let start = sequence.checked_add(1)?;
        self.frames.range(start..).next().map(|(&seq, _)| seq)
    }

    /// Remove every frame received before `cutoff`.
    ///
    /// Returns removed sequences in ascending order.
    pub(crate) fn remove_received_before(&mut self, cutoff: Instant) -> Vec<u32> {
        let expired: Vec<u32> = self
            .frames
            .iter()
            .filter(|(_, f)| f.received_timestamp < cutoff)
            .map(|(&seq, _)| seq)
            .collect();
        for seq in &expired {
            self.frames.remove(seq);
        }
        expired
    }

    /// Sum of nominal durations of all buffered frames.
    pub(crate) fn buffered_duration(&self) -> Duration {
        self.frames.values().map(StreamFrame::frame_duration).sum()
    }
}
