//! RTC Jitter - Sans-IO stream reassembly for lossy peer-to-peer media.
//!
//! This crate turns an unordered, lossy, duplicate-prone sequence of
//! timestamped frames into a gap-tolerant, ordered, paced sequence of decoded
//! frames for playback. It is codec-agnostic: decoding and loss concealment go
//! through a single [`FrameCodec`] extension point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`JitterReceiver`] | Single-owner engine implementing [`sansio::Protocol`]: admission, buffering, pacing, loss policy |
//! | [`JitterChannel`] | Thread-safe owner for split ingestion/pacing threads, with consumer and observer delivery |
//! | [`JitterReceiverBuilder`] | Builder for receivers with a validated [`JitterConfig`] |
//! | [`FrameCodec`] | Decode and concealment hooks; [`BytesCodec`] passes payloads through |
//! | [`DiagnosticSink`] | Structured diagnostics; [`LogSink`] forwards to the `log` facade |
//!
//! # Pacing
//!
//! The receiver does not own a timer. The host calls `handle_timeout(now)`
//! (or [`JitterChannel::tick`]) from its update loop; `poll_timeout` tells
//! it when the next tick can make progress. Each tick:
//!
//! 1. defers while the initial buffer is still building,
//! 2. drains at most three contiguous frames starting at the watermark,
//! 3. resolves a gap at the watermark: one slot is concealed or dropped for
//!    gaps of up to three, larger gaps are skipped at once,
//! 4. drops frames resident longer than the maximum buffer depth,
//! 5. jumps over a gap that has grown stale.
//!
//! # Quick Start
//!
//! ```ignore
//! use rtc_jitter::{BytesCodec, JitterReceiverBuilder, StreamMessage, TaggedMessage};
//! use sansio::Protocol;
//! use std::time::{Duration, Instant};
//!
//! let mut receiver = JitterReceiverBuilder::new("voice")
//!     .with_target_buffer(Duration::from_millis(60))
//!     .build(BytesCodec)?;
//!
//! let now = Instant::now();
//! receiver.handle_read(TaggedMessage::new(
//!     now,
//!     "peer-1",
//!     StreamMessage::new("voice", 0, payload).with_frame_duration_ms(20),
//! ))?;
//!
//! receiver.handle_timeout(now)?;
//! while let Some(frame) = receiver.poll_read() {
//!     play(frame.payload);
//! }
//! while let Some(event) = receiver.poll_event() {
//!     log::debug!("{:?}", event);
//! }
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub(crate) mod buffer;
mod channel;
mod codec;
mod config;
pub mod diagnostics;
pub mod error;
mod event;
mod frame;
mod message;
mod receiver;
mod stats;

pub use channel::JitterChannel;
pub use codec::{BytesCodec, FrameCodec};
pub use config::{JitterConfig, JitterReceiverBuilder};
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, LogSink, MemorySink};
pub use error::{Error, Result};
pub use event::{StreamEvent, StreamObserver};
pub use frame::StreamFrame;
pub use message::{MessageContext, SenderId, StreamMessage, TaggedMessage};
pub use receiver::JitterReceiver;
pub use stats::ChannelStats;
