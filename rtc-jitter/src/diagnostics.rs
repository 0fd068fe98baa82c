//! Structured diagnostics.
//!
//! The engine never logs free-form text from inside the algorithm. Instead it
//! reports a [`Diagnostic`] to an injected [`DiagnosticSink`]. The default
//! [`LogSink`] forwards to the `log` facade.

use log::Level;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    StreamStarted,
    StreamEnded,
    /// Sequence below the watermark, discarded.
    StaleFrame,
    /// A buffered entry was overwritten by a later copy.
    DuplicateFrame,
    DecodeFailed,
    /// Oldest frame evicted because the buffer exceeded its ceiling.
    Overflow,
    /// Warm-up: waiting for the minimum depth before draining.
    Buffering,
    /// Buffer ran dry while streaming.
    Underrun,
    LateFrame,
    Concealed,
    /// A single missing slot was dropped after concealment declined.
    LostFrame,
    /// A gap too large to conceal was skipped.
    GapSkipped,
    /// Frame older than the max buffer depth removed.
    AgedOut,
    Reset,
    Disposed,
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticCode::StreamStarted => "stream_started",
            DiagnosticCode::StreamEnded => "stream_ended",
            DiagnosticCode::StaleFrame => "stale_frame",
            DiagnosticCode::DuplicateFrame => "duplicate_frame",
            DiagnosticCode::DecodeFailed => "decode_failed",
            DiagnosticCode::Overflow => "overflow",
            DiagnosticCode::Buffering => "buffering",
            DiagnosticCode::Underrun => "underrun",
            DiagnosticCode::LateFrame => "late_frame",
            DiagnosticCode::Concealed => "concealed",
            DiagnosticCode::LostFrame => "lost_frame",
            DiagnosticCode::GapSkipped => "gap_skipped",
            DiagnosticCode::AgedOut => "aged_out",
            DiagnosticCode::Reset => "reset",
            DiagnosticCode::Disposed => "disposed",
        };
        write!(f, "{s}")
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub code: DiagnosticCode,
    pub sequence: Option<u32>,
    /// Code-specific measurement: a millisecond duration, a frame count or a
    /// sequence span.
    pub value: Option<u64>,
}

impl Diagnostic {
    pub fn new(level: Level, code: DiagnosticCode) -> Self {
        Self {
            level,
            code,
            sequence: None,
            value: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_value(mut self, value: u64) -> Self {
        self.value = Some(value);
        self
    }
}

/// Receiver of diagnostics for one stream.
pub trait DiagnosticSink: Send {
    fn report(&mut self, stream_id: &str, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, stream_id: &str, diagnostic: Diagnostic) {
        if !log::log_enabled!(diagnostic.level) {
            return;
        }
        match (diagnostic.sequence, diagnostic.value) {
            (Some(seq), Some(value)) => log::log!(
                diagnostic.level,
                "[{stream_id}] {} seq={seq} value={value}",
                diagnostic.code
            ),
            (Some(seq), None) => {
                log::log!(diagnostic.level, "[{stream_id}] {} seq={seq}", diagnostic.code)
            }
            (None, Some(value)) => log::log!(
                diagnostic.level,
                "[{stream_id}] {} value={value}",
                diagnostic.code
            ),
            (None, None) => log::log!(diagnostic.level, "[{stream_id}] {}", diagnostic.code),
        }
    }
}

/// Collects diagnostics in memory. Handy for assertions and for hosts that
/// batch diagnostics into their own telemetry.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<Diagnostic>,
}

impl MemorySink {
    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.records.iter().filter(|d| d.code == code).count()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&mut self, _stream_id: &str, diagnostic: Diagnostic) {
        self.records.push(diagnostic);
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Box<S> {
    fn report(&mut self, stream_id: &str, diagnostic: Diagnostic) {
        (**self).report(stream_id, diagnostic)
    }
}

impl<S: DiagnosticSink> DiagnosticSink for Arc<Mutex<S>> {
    fn report(&mut self, stream_id: &str, diagnostic: Diagnostic) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .report(stream_id, diagnostic)
    }
}
