//! # Subscriptions
//!
//! A [`Subscription`] is one registered receiver for a topic: the sending
//! half of its queue, the `once` flag and, for persistent subscriptions, the
//! private [`Serializer`] that restores publish order.
//!
//! The [`Unsubscribe`] handle is what callers get back from every
//! subscribe-family call.

use crate::receiver::Envelope;
use crate::serializer::Serializer;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Stable identity of a subscription, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The event reached the queue (and, on a hand-off bus, the reader).
    Delivered,
    /// The subscription was closed before the event could be queued.
    Closed,
    /// The receiver was dropped.
    ReceiverGone,
}

/// A registered receiver for one topic.
pub(crate) struct Subscription<T> {
    id: SubscriptionId,
    once: bool,
    handoff: bool,
    /// `None` once closed.
    sender: Mutex<Option<mpsc::Sender<Envelope<T>>>>,
    /// Cancelled on close; wakes deliveries waiting for queue space.
    closed: CancellationToken,
    /// Present only for persistent subscriptions.
    serializer: Option<Serializer>,
}

impl<T> Subscription<T> {
    /// Persistent subscription whose first event carries `first_sequence`.
    pub(crate) fn persistent(
        sender: mpsc::Sender<Envelope<T>>,
        handoff: bool,
        first_sequence: u64,
    ) -> Self {
        Self::build(
            sender,
            handoff,
            false,
            Some(Serializer::starting_at(first_sequence)),
        )
    }

    /// Once-subscription. At most one delivery occurs, so no Serializer.
    pub(crate) fn once(sender: mpsc::Sender<Envelope<T>>, handoff: bool) -> Self {
        Self::build(sender, handoff, true, None)
    }

    fn build(
        sender: mpsc::Sender<Envelope<T>>,
        handoff: bool,
        once: bool,
        serializer: Option<Serializer>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            once,
            handoff,
            sender: Mutex::new(Some(sender)),
            closed: CancellationToken::new(),
            serializer,
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn is_once(&self) -> bool {
        self.once
    }

    pub(crate) fn serializer(&self) -> Option<&Serializer> {
        self.serializer.as_ref()
    }

    /// Close the queue. Returns `true` only for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        let sender = self.sender.lock().take();
        self.closed.cancel();
        sender.is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl<T: Send + 'static> Subscription<T> {
    /// Push one event into the queue, waiting for capacity (and, on a
    /// hand-off bus, for the reader to take it).
    pub(crate) async fn deliver(&self, event: T) -> Delivery {
        let Some(sender) = self.sender.lock().clone() else {
            return Delivery::Closed;
        };
        let (envelope, taken) = Envelope::new(event, self.handoff);

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Delivery::Closed,
            sent = sender.send(envelope) => {
                if sent.is_err() {
                    return Delivery::ReceiverGone;
                }
            }
        }
        drop(sender);

        if let Some(taken) = taken {
            tokio::select! {
                biased;
                _ = self.closed.cancelled() => {}
                _ = taken => {}
            }
        }
        Delivery::Delivered
    }
}

/// Removal side of the bus, type-erased so [`Unsubscribe`] is not generic.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, topic: &str, id: SubscriptionId);
}

/// Idempotent unsubscribe action returned by every subscribe-family call.
///
/// Cloning yields another handle to the same subscription. Calling
/// [`unsubscribe`](Self::unsubscribe) more than once, after a once-subscription
/// already fired, or after the bus was dropped, does nothing.
///
/// Dropping the handle does **not** unsubscribe.
#[derive(Clone)]
pub struct Unsubscribe {
    topic: Arc<str>,
    id: SubscriptionId,
    bus: Weak<dyn Detach>,
    /// Stop signal of an `on`/`once` consumer loop.
    listener: Option<CancellationToken>,
}

impl Unsubscribe {
    pub(crate) fn new(topic: Arc<str>, id: SubscriptionId, bus: Weak<dyn Detach>) -> Self {
        Self {
            topic,
            id,
            bus,
            listener: None,
        }
    }

    pub(crate) fn with_listener(mut self, token: CancellationToken) -> Self {
        self.listener = Some(token);
        self
    }

    /// Remove the subscription and close its queue.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(&self.topic, self.id);
        }
        if let Some(listener) = &self.listener {
            listener.cancel();
        }
    }

    /// Topic of the subscription.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Identity of the subscription.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
