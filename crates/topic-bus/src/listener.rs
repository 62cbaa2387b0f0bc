//! # Listeners
//!
//! Push-style consumption: [`Bus::on`] / [`Bus::once`] subscribe and run a
//! dedicated consumer loop that invokes a callback for every received event.
//!
//! ```text
//! subscribe(topic) ──► EventReceiver ──► consumer loop ──► callback(event)
//!                                            ▲
//!                       Unsubscribe ─────────┘ (cancel token)
//! ```
//!
//! The loop ends when the queue closes or the returned [`Unsubscribe`] is
//! called, and always releases its subscription on the way out. A panicking
//! callback is logged and the loop keeps consuming.

use crate::bus::Bus;
use crate::receiver::EventReceiver;
use crate::subscription::Unsubscribe;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Async event handler driven by a listener loop.
///
/// # Example
///
/// ```ignore
/// struct Audit;
///
/// #[async_trait::async_trait]
/// impl EventHandler<String> for Audit {
///     async fn handle(&self, event: String) {
///         // write audit record...
///     }
/// }
///
/// let unsubscribe = bus.on_handler("audit", Arc::new(Audit));
/// ```
#[async_trait]
pub trait EventHandler<T>: Send + Sync + 'static {
    /// Handle one event.
    async fn handle(&self, event: T);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts a synchronous `FnMut` callback.
struct Callback<F>(Mutex<F>);

#[async_trait]
impl<T, F> EventHandler<T> for Callback<F>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    async fn handle(&self, event: T) {
        (self.0.lock())(event);
    }

    fn name(&self) -> &'static str {
        "callback"
    }
}

/// Adapts a synchronous `FnOnce` callback; later calls are ignored.
struct OnceCallback<F>(Mutex<Option<F>>);

#[async_trait]
impl<T, F> EventHandler<T> for OnceCallback<F>
where
    T: Send + 'static,
    F: FnOnce(T) + Send + 'static,
{
    async fn handle(&self, event: T) {
        let callback = self.0.lock().take();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn name(&self) -> &'static str {
        "once-callback"
    }
}

impl<T> Bus<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Invoke `callback` for every event published on `topic`, in publish order.
    ///
    /// Returns an idempotent action that unsubscribes and stops the loop.
    pub fn on<F>(&self, topic: &str, callback: F) -> Unsubscribe
    where
        F: FnMut(T) + Send + 'static,
    {
        self.listen(topic, false, Arc::new(Callback(Mutex::new(callback))))
    }

    /// Invoke `callback` for the next event published on `topic` only.
    ///
    /// Calling the returned action before the event arrives cancels it.
    pub fn once<F>(&self, topic: &str, callback: F) -> Unsubscribe
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.listen(
            topic,
            true,
            Arc::new(OnceCallback(Mutex::new(Some(callback)))),
        )
    }

    /// Like [`on`](Self::on), with an async handler.
    pub fn on_handler(&self, topic: &str, handler: Arc<dyn EventHandler<T>>) -> Unsubscribe {
        self.listen(topic, false, handler)
    }

    /// Like [`once`](Self::once), with an async handler.
    pub fn once_handler(&self, topic: &str, handler: Arc<dyn EventHandler<T>>) -> Unsubscribe {
        self.listen(topic, true, handler)
    }

    fn listen(&self, topic: &str, once: bool, handler: Arc<dyn EventHandler<T>>) -> Unsubscribe {
        let (receiver, unsubscribe) = self.subscribe_with(topic, once);
        let stop = CancellationToken::new();
        let unsubscribe = unsubscribe.with_listener(stop.clone());

        let Some(runtime) = self.runtime() else {
            warn!(
                topic,
                handler = handler.name(),
                "No Tokio runtime available, listener not started"
            );
            unsubscribe.unsubscribe();
            return unsubscribe;
        };
        runtime.spawn(consume(receiver, handler, once, stop, unsubscribe.clone()));
        unsubscribe
    }
}

async fn consume<T>(
    mut receiver: EventReceiver<T>,
    handler: Arc<dyn EventHandler<T>>,
    once: bool,
    stop: CancellationToken,
    release: Unsubscribe,
) where
    T: Send + 'static,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let handled = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
        if let Err(panic) = handled {
            error!(
                topic = receiver.topic(),
                handler = handler.name(),
                panic = panic_message(panic.as_ref()),
                "Event handler panicked"
            );
        }

        if once {
            break;
        }
    }

    release.unsubscribe();
    debug!(topic = receiver.topic(), subscription = %release.id(), "Listener stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown"
    }
}
