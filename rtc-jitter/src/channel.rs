//! Thread-safe owner of a [`JitterReceiver`].
//!
//! Ingestion (network receive path) and pacing (host update loop) may run on
//! different threads. [`JitterChannel`] serializes both through one mutex and
//! delivers output only after that mutex is released.
//!
//! # Re-entrancy
//!
//! The frame consumer and the observers are called synchronously from
//! [`admit`](JitterChannel::admit) and [`tick`](JitterChannel::tick). They must
//! be fast (enqueue and return) and must not call `admit`, `tick`,
//! `add_observer` or `set_consumer` on the same channel; doing so deadlocks.

use crate::codec::FrameCodec;
use crate::config::JitterConfig;
use crate::error::Result;
use crate::event::{StreamEvent, StreamObserver};
use crate::frame::StreamFrame;
use crate::message::{SenderId, StreamMessage, TaggedMessage};
use crate::receiver::JitterReceiver;
use crate::stats::ChannelStats;
use sansio::Protocol;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

type FrameConsumer<P> = Box<dyn FnMut(StreamFrame<P>) + Send>;

/// Output collected under the receiver lock, delivered after it is released.
struct Output<P> {
    frames: Vec<StreamFrame<P>>,
    events: Vec<StreamEvent>,
}

struct Delivery<P> {
    consumer: Option<FrameConsumer<P>>,
    observers: Vec<Box<dyn StreamObserver>>,
}

/// One logical stream's jitter buffer, shareable across threads.
///
/// Drive [`tick`](Self::tick) from a single update loop. Output is handed to
/// the consumer after the lock is released, so two overlapping ticks (or
/// overlapping `admit` calls with buffering disabled) may deliver frames out
/// of sequence order.
pub struct JitterChannel<C: FrameCodec> {
    receiver: Mutex<JitterReceiver<C>>,
    delivery: Mutex<Delivery<C::Payload>>,
}

impl<C: FrameCodec> JitterChannel<C> {
    pub fn new(receiver: JitterReceiver<C>) -> Self {
        Self {
            receiver: Mutex::new(receiver),
            delivery: Mutex::new(Delivery {
                consumer: None,
                observers: Vec::new(),
            }),
        }
    }

    /// Install the consumer that takes ownership of every emitted frame.
    ///
    /// Frames emitted while no consumer is installed are discarded.
    pub fn set_consumer(&self, consumer: impl FnMut(StreamFrame<C::Payload>) + Send + 'static) {
        self.delivery().consumer = Some(Box::new(consumer));
    }

    /// Register an observer. Observers run in registration order.
    pub fn add_observer(&self, observer: impl StreamObserver + 'static) {
        self.delivery().observers.push(Box::new(observer));
    }

    /// Admit an inbound message received now.
    pub fn admit(&self, message: StreamMessage, sender: impl Into<SenderId>) {
        self.admit_at(Instant::now(), message, sender);
    }

    /// Admit an inbound message with an explicit arrival time.
    pub fn admit_at(&self, now: Instant, message: StreamMessage, sender: impl Into<SenderId>) {
        let output = {
            let mut receiver = self.receiver();
            if receiver.is_disposed() {
                return;
            }
            receiver.admit(TaggedMessage::new(now, sender, message));
            Self::collect(&mut receiver)
        };
        self.deliver(output);
    }

    /// Run one pacing step now.
    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    /// Run one pacing step at an explicit time.
    pub fn tick_at(&self, now: Instant) {
        let output = {
            let mut receiver = self.receiver();
            if receiver.is_disposed() {
                return;
            }
            receiver.tick(now);
            Self::collect(&mut receiver)
        };
        self.deliver(output);
    }

    /// Instant at which the next tick can make progress, if any.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.receiver().poll_timeout()
    }

    pub fn reset(&self) {
        self.receiver().reset();
    }

    /// Make the channel permanently inert. An in-flight `admit`/`tick` on
    /// another thread completes; later calls do nothing.
    pub fn dispose(&self) {
        self.receiver().dispose();
        let mut delivery = self.delivery();
        delivery.consumer = None;
        delivery.observers.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.receiver().is_disposed()
    }

    pub fn stats(&self) -> ChannelStats {
        self.receiver().stats()
    }

    pub fn config(&self) -> JitterConfig {
        *self.receiver().config()
    }

    pub fn set_config(&self, config: JitterConfig) -> Result<()> {
        let output = {
            let mut receiver = self.receiver();
            receiver.set_config(config)?;
            Self::collect(&mut receiver)
        };
        self.deliver(output);
        Ok(())
    }

    fn collect(receiver: &mut JitterReceiver<C>) -> Output<C::Payload> {
        let mut output = Output {
            frames: Vec::new(),
            events: Vec::new(),
        };
        while let Some(frame) = receiver.poll_read() {
            output.frames.push(frame);
        }
        while let Some(event) = receiver.poll_event() {
            output.events.push(event);
        }
        output
    }

    fn deliver(&self, output: Output<C::Payload>) {
        if output.frames.is_empty() && output.events.is_empty() {
            return;
        }
        let mut delivery = self.delivery();
        let Delivery {
            consumer,
            observers,
        } = &mut *delivery;
        for event in &output.events {
            for observer in observers.iter_mut() {
                observer.on_event(event);
            }
        }
        if let Some(consumer) = consumer {
            for frame in output.frames {
                consumer(frame);
            }
        }
    }

    fn receiver(&self) -> MutexGuard<'_, JitterReceiver<C>> {
        self.receiver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery(&self) -> MutexGuard<'_, Delivery<C::Payload>> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
