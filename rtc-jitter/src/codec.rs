//! Codec extension point.
//!
//! The engine is codec-agnostic. A [`FrameCodec`] turns raw payload bytes into
//! a typed payload and may synthesize a substitute for a frame that never
//! arrived.

use crate::error::Result;
use crate::message::MessageContext;
use bytes::Bytes;

/// Codec-specific decode and concealment hooks.
///
/// Both hooks run while the owning receiver is borrowed mutably (and, for a
/// [`JitterChannel`](crate::JitterChannel), while its lock is held). They must be fast and
/// non-blocking.
pub trait FrameCodec {
    /// Decoded payload type handed to the consumer.
    type Payload;

    /// Decode `bytes` into a payload. An `Err` discards the frame.
    fn decode(&mut self, bytes: &Bytes, ctx: &MessageContext<'_>) -> Result<Self::Payload>;

    /// Produce a substitute payload for the missing `sequence`.
    ///
    /// Returning `None` makes the pacer count the slot as dropped.
    fn conceal_missing(&mut self, _sequence: u32) -> Option<Self::Payload> {
        None
    }
}

/// Pass-through codec for opaque payloads. Never conceals.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesCodec;

impl FrameCodec for BytesCodec {
    type Payload = Bytes;

    fn decode(&mut self, bytes: &Bytes, _ctx: &MessageContext<'_>) -> Result<Bytes> {
        Ok(bytes.clone())
    }
}
