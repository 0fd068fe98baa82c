//! Receiver configuration and builder.

use crate::codec::FrameCodec;
use crate::diagnostics::{DiagnosticSink, LogSink};
use crate::error::{Error, Result};
use crate::receiver::JitterReceiver;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub(crate) const DEFAULT_TARGET_BUFFER: Duration = Duration::from_millis(100);
pub(crate) const DEFAULT_MAX_BUFFER: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_FRAME_DURATION_MS: u32 = 20;
/// Upper bound on either depth; keeps deadline arithmetic on `Instant` in range.
pub(crate) const MAX_BUFFER_LIMIT: Duration = Duration::from_secs(60);

/// Tunables for one jitter receiver.
///
/// Owned by the receiver; the owner may replace it between calls with
/// [`JitterReceiver::set_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Depth to build before draining and the lateness tolerance.
    #[serde(with = "millis")]
    pub target_buffer: Duration,
    /// Memory ceiling, also the maximum residency of a buffered frame.
    #[serde(with = "millis")]
    pub max_buffer: Duration,
    /// When off, frames are emitted on arrival with no ordering or gap handling.
    pub jitter_buffering: bool,
    /// When off, gaps are skipped silently instead of concealed or counted.
    pub loss_detection: bool,
    /// Duration assumed for frames that arrive without one.
    pub default_frame_duration_ms: u32,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            target_buffer: DEFAULT_TARGET_BUFFER,
            max_buffer: DEFAULT_MAX_BUFFER,
            jitter_buffering: true,
            loss_detection: true,
            default_frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
        }
    }
}

impl JitterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_frame_duration_ms == 0 {
            return Err(Error::ErrInvalidFrameDuration);
        }
        if self.target_buffer.is_zero() {
            return Err(Error::ErrZeroTargetBuffer);
        }
        if self.max_buffer < self.target_buffer {
            return Err(Error::ErrMaxBufferBelowTarget {
                target_ms: self.target_buffer.as_millis(),
                max_ms: self.max_buffer.as_millis(),
            });
        }
        if self.max_buffer > MAX_BUFFER_LIMIT {
            return Err(Error::ErrBufferTooLarge {
                max_ms: self.max_buffer.as_millis(),
                limit_ms: MAX_BUFFER_LIMIT.as_millis(),
            });
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Builder for a [`JitterReceiver`].
///
/// # Example
///
/// ```ignore
/// use rtc_jitter::{BytesCodec, JitterReceiverBuilder};
/// use std::time::Duration;
///
/// let receiver = JitterReceiverBuilder::new("voice")
///     .with_target_buffer(Duration::from_millis(60))
///     .with_max_buffer(Duration::from_millis(400))
///     .build(BytesCodec)?;
/// ```
pub struct JitterReceiverBuilder {
    stream_id: String,
    config: JitterConfig,
    sink: Option<Box<dyn DiagnosticSink>>,
}

impl JitterReceiverBuilder {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            config: JitterConfig::default(),
            sink: None,
        }
    }

    pub fn with_config(mut self, config: JitterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_target_buffer(mut self, target_buffer: Duration) -> Self {
        self.config.target_buffer = target_buffer;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: Duration) -> Self {
        self.config.max_buffer = max_buffer;
        self
    }

    pub fn with_jitter_buffering(mut self, enabled: bool) -> Self {
        self.config.jitter_buffering = enabled;
        self
    }

    pub fn with_loss_detection(mut self, enabled: bool) -> Self {
        self.config.loss_detection = enabled;
        self
    }

    pub fn with_default_frame_duration_ms(mut self, frame_duration_ms: u32) -> Self {
        self.config.default_frame_duration_ms = frame_duration_ms;
        self
    }

    /// Route diagnostics to `sink` instead of the `log` facade.
    pub fn with_diagnostic_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn build<C: FrameCodec>(self, codec: C) -> Result<JitterReceiver<C>> {
        if self.stream_id.is_empty() {
            return Err(Error::ErrStreamIdEmpty);
        }
        self.config.validate()?;
        let sink = self.sink.unwrap_or_else(|| Box::new(LogSink));
        Ok(JitterReceiver::new(self.stream_id, self.config, codec, sink))
    }
}
