//! # Bus
//!
//! Topic registry plus the publish/subscribe/unsubscribe paths.
//!
//! ## Locking
//!
//! The registry (topic → subscriptions, topic → next sequence) lives behind
//! one short-held `parking_lot` mutex. `publish()` holds it only to assign a
//! sequence number, snapshot subscribers and remove once-subscriptions; all
//! queue writes happen in spawned delivery tasks. Each Serializer has its own
//! lock, so no lock is ever shared between subscribers.

use crate::config::BusConfig;
use crate::error::ConfigError;
use crate::receiver::EventReceiver;
use crate::subscription::{Delivery, Detach, Subscription, SubscriptionId, Unsubscribe};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Topic bookkeeping.
struct Registry<T> {
    /// Subscriptions by topic. A topic is present only while it has subscribers.
    subscriptions: HashMap<String, Vec<Arc<Subscription<T>>>>,
    /// Next sequence number to assign, by topic. Pruned with the list.
    sequences: HashMap<String, u64>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            sequences: HashMap::new(),
        }
    }

    /// Remove a subscription by identity, pruning the topic when it empties.
    fn remove(&mut self, topic: &str, id: SubscriptionId) -> Option<Arc<Subscription<T>>> {
        let subs = self.subscriptions.get_mut(topic)?;
        let index = subs.iter().position(|sub| sub.id() == id)?;
        let removed = subs.remove(index);

        if subs.is_empty() {
            self.subscriptions.remove(topic);
            self.sequences.remove(topic);
        }
        Some(removed)
    }
}

pub(crate) struct BusInner<T> {
    registry: Mutex<Registry<T>>,
    config: BusConfig,
    runtime: OnceLock<Handle>,
    events_published: AtomicU64,
}

impl<T> BusInner<T> {
    /// Handle set by `with_runtime`, else the ambient runtime if there is one.
    fn spawner(&self) -> Option<Handle> {
        self.runtime
            .get()
            .cloned()
            .or_else(|| Handle::try_current().ok())
    }
}

impl<T: Send + 'static> Detach for BusInner<T> {
    fn detach(&self, topic: &str, id: SubscriptionId) {
        let removed = self.registry.lock().remove(topic, id);
        let Some(sub) = removed else {
            return;
        };
        if sub.close() {
            debug!(topic, subscription = %id, "Unsubscribed");
        }
    }
}

/// Topic-based publish/subscribe bus.
///
/// Cheap to clone; clones share the same registry. Each `Bus` created with
/// [`Bus::new`] / [`Bus::with_config`] is fully independent of every other.
///
/// `publish()` and the `on`/`once` listeners spawn Tokio tasks, on the handle
/// given to [`Bus::with_runtime`] or otherwise on the current runtime. Without
/// either, publishes are dropped and listeners are not started, with a warning.
pub struct Bus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Bus<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a bus with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(BusConfig::default())
    }

    /// Create a bus with a validated configuration.
    pub fn with_config(config: BusConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::new()),
                config,
                runtime: OnceLock::new(),
                events_published: AtomicU64::new(0),
            }),
        }
    }

    /// Spawn delivery tasks and listeners on `handle` instead of the
    /// current runtime, so `publish()` also works outside a runtime context.
    ///
    /// Applies to every clone of this bus. Only the first handle set is kept.
    #[must_use]
    pub fn with_runtime(self, handle: Handle) -> Self {
        if self.inner.runtime.set(handle).is_err() {
            debug!("Runtime already set, keeping the first handle");
        }
        self
    }

    /// Subscribe to every event published on `topic` from now on.
    ///
    /// Returns the queue handle and an idempotent unsubscribe action.
    pub fn subscribe(&self, topic: &str) -> (EventReceiver<T>, Unsubscribe) {
        self.subscribe_with(topic, false)
    }

    /// Subscribe to the next single event published on `topic`.
    ///
    /// The queue closes after that event. Unsubscribing before it arrives
    /// cancels the subscription; unsubscribing afterwards does nothing.
    pub fn subscribe_once(&self, topic: &str) -> (EventReceiver<T>, Unsubscribe) {
        self.subscribe_with(topic, true)
    }

    pub(crate) fn subscribe_with(&self, topic: &str, once: bool) -> (EventReceiver<T>, Unsubscribe) {
        let config = &self.inner.config;
        let (sender, receiver) = mpsc::channel(config.channel_capacity());

        let id = {
            let mut registry = self.inner.registry.lock();
            let next_sequence = *registry.sequences.entry(topic.to_string()).or_insert(0);

            let sub = if once {
                Subscription::once(sender, config.is_handoff())
            } else {
                Subscription::persistent(sender, config.is_handoff(), next_sequence)
            };
            let id = sub.id();

            registry
                .subscriptions
                .entry(topic.to_string())
                .or_default()
                .push(Arc::new(sub));
            id
        };

        debug!(topic, subscription = %id, once, "Subscribed");

        let detach: Arc<dyn Detach> = self.inner.clone();
        let unsubscribe = Unsubscribe::new(Arc::from(topic), id, Arc::downgrade(&detach));
        (EventReceiver::new(receiver, topic.to_string()), unsubscribe)
    }

    /// Publish `event` to every subscriber of `topic`.
    ///
    /// Returns immediately. Each subscriber gets its own delivery task; a
    /// persistent subscriber sees events in publish order, a once-subscriber
    /// sees only the first event published after it subscribed. Publishing to
    /// a topic with no subscribers does nothing.
    pub fn publish(&self, topic: &str, event: T) {
        let Some(runtime) = self.inner.spawner() else {
            warn!(topic, "No Tokio runtime available, dropping event");
            return;
        };

        let (sequence, targets) = {
            let mut registry = self.inner.registry.lock();

            let Some(subs) = registry.subscriptions.get(topic) else {
                trace!(topic, "Publish to topic without subscribers");
                return;
            };
            let targets: Vec<Arc<Subscription<T>>> = subs.clone();

            let counter = registry.sequences.entry(topic.to_string()).or_insert(0);
            let sequence = *counter;
            *counter += 1;

            for sub in targets.iter().filter(|sub| sub.is_once()) {
                registry.remove(topic, sub.id());
            }
            (sequence, targets)
        };

        self.inner.events_published.fetch_add(1, Ordering::Relaxed);
        debug!(
            topic,
            sequence,
            subscribers = targets.len(),
            "Event published"
        );

        let bus = Arc::downgrade(&self.inner);
        for sub in targets {
            runtime.spawn(deliver(
                bus.clone(),
                topic.to_string(),
                sub,
                event.clone(),
                sequence,
            ));
        }
    }

    /// Number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.inner.registry.lock().subscriptions.len()
    }

    /// Number of subscriptions currently registered on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .registry
            .lock()
            .subscriptions
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Next sequence number for `topic`, or `None` when the topic has no
    /// bookkeeping (never subscribed, or every subscriber left).
    #[must_use]
    pub fn sequence(&self, topic: &str) -> Option<u64> {
        self.inner.registry.lock().sequences.get(topic).copied()
    }

    /// Total number of publishes that reached at least one subscriber.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.inner.events_published.load(Ordering::Relaxed)
    }

    /// Configuration this bus was built with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub(crate) fn runtime(&self) -> Option<Handle> {
        self.inner.spawner()
    }
}

impl<T> Default for Bus<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Bus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// One delivery task: carries `event` to `sub`.
async fn deliver<T>(
    bus: Weak<BusInner<T>>,
    topic: String,
    sub: Arc<Subscription<T>>,
    event: T,
    sequence: u64,
) where
    T: Send + Sync + 'static,
{
    if sub.is_closed() {
        trace!(topic = %topic, subscription = %sub.id(), sequence, "Skipping closed subscription");
        return;
    }

    let Some(serializer) = sub.serializer() else {
        let outcome = sub.deliver(event).await;
        trace!(topic = %topic, subscription = %sub.id(), sequence, ?outcome, "Once delivery");
        sub.close();
        return;
    };

    let target = sub.clone();
    serializer
        .execute(
            async move {
                let outcome = target.deliver(event).await;
                trace!(topic = %topic, subscription = %target.id(), sequence, ?outcome, "Delivery");
                if outcome == Delivery::ReceiverGone {
                    if let Some(bus) = bus.upgrade() {
                        debug!(topic = %topic, subscription = %target.id(), "Receiver dropped, pruning");
                        bus.detach(&topic, target.id());
                    }
                }
            },
            sequence,
        )
        .await;
}
