//! Ordered fan-out of detection events.
//!
//! Publishes from any thread are stamped with a sequence number and queued
//! under one lock. The first publisher to find the bus idle drains the queue
//! and delivers each event to a snapshot of the subscriber list, so delivery
//! order is receipt order and a handler that publishes sees its event
//! delivered after the one it is handling.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, trace};

use feedwatch_ipc::{DetectionEvent, SourceChannel};

use crate::normalize::{normalize, RawPayload};

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Handler = Box<dyn Fn(&DetectionEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    active: AtomicBool,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    next_sequence: u64,
    next_subscriber: u64,
    queue: VecDeque<DetectionEvent>,
    draining: bool,
    subscribers: Vec<Arc<Subscriber>>,
}

struct BusInner {
    state: Mutex<BusState>,
}

/// Clears the draining flag if a handler panics mid-delivery.
struct DrainGuard<'a> {
    inner: &'a BusInner,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.state.lock().draining = false;
        }
    }
}

/// Broadcast bus for canonical detection events.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    /// Normalize a payload and deliver it to every subscriber.
    ///
    /// Returns the sequence number assigned to the event.
    pub fn publish(&self, payload: RawPayload, channel: SourceChannel) -> u64 {
        let sequence = {
            let mut state = self.inner.state.lock();
            state.next_sequence += 1;
            let sequence = state.next_sequence;
            let event = normalize(payload, channel, sequence, Local::now());
            trace!(sequence, channel = channel.name(), feed_id = %event.feed_id, "Event queued");
            state.queue.push_back(event);

            if state.draining {
                return sequence;
            }
            state.draining = true;
            sequence
        };

        self.drain();
        sequence
    }

    fn drain(&self) {
        let mut guard = DrainGuard {
            inner: &self.inner,
            finished: false,
        };

        loop {
            let (event, subscribers) = {
                let mut state = self.inner.state.lock();
                match state.queue.pop_front() {
                    Some(event) => (event, state.subscribers.clone()),
                    None => {
                        state.draining = false;
                        guard.finished = true;
                        return;
                    }
                }
            };

            for subscriber in &subscribers {
                if subscriber.active.load(Ordering::SeqCst) {
                    (subscriber.handler)(&event);
                }
            }
        }
    }

    /// Register a handler. It receives every event published after this call.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DetectionEvent) + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        state.next_subscriber += 1;
        let id = SubscriptionId(state.next_subscriber);
        state.subscribers.push(Arc::new(Subscriber {
            id,
            active: AtomicBool::new(true),
            handler: Box::new(handler),
        }));
        debug!(%id, "Subscribed");
        id
    }

    /// Subscribe with a channel instead of a callback.
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<DetectionEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = self.subscribe(move |event| {
            if tx.send(event.clone()).is_err() {
                trace!(sequence = event.sequence, "Subscriber channel closed");
            }
        });
        (id, rx)
    }

    /// Remove a subscriber. Safe to call from inside a handler; the removed
    /// subscriber receives nothing further, others are unaffected.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        match state.subscribers.iter().position(|s| s.id == id) {
            Some(index) => {
                let subscriber = state.subscribers.remove(index);
                subscriber.active.store(false, Ordering::SeqCst);
                debug!(%id, "Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Number of events published so far.
    pub fn published(&self) -> u64 {
        self.inner.state.lock().next_sequence
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
