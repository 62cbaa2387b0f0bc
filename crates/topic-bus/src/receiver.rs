//! # Event Receiver
//!
//! Pull-style queue handle returned by [`Bus::subscribe`](crate::Bus::subscribe)
//! and [`Bus::subscribe_once`](crate::Bus::subscribe_once).

use crate::error::RecvError;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;

/// An event in flight to one subscriber.
///
/// On a hand-off bus (capacity 0) the envelope carries an acknowledgement
/// that fires when the reader takes the event.
pub(crate) struct Envelope<T> {
    event: T,
    taken: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    /// Wrap an event. Returns the acknowledgement receiver when `handoff` is set.
    pub(crate) fn new(event: T, handoff: bool) -> (Self, Option<oneshot::Receiver<()>>) {
        if handoff {
            let (tx, rx) = oneshot::channel();
            (
                Self {
                    event,
                    taken: Some(tx),
                },
                Some(rx),
            )
        } else {
            (Self { event, taken: None }, None)
        }
    }

    fn open(self) -> T {
        if let Some(taken) = self.taken {
            let _ = taken.send(());
        }
        self.event
    }
}

/// Receiving side of a subscription.
///
/// Yields events in publish order. Returns `None` once the subscription is
/// closed (unsubscribed, once-delivery done, or bus dropped) and every
/// buffered event has been read.
///
/// Dropping the receiver does not unsubscribe immediately; the bus prunes the
/// subscription the next time a delivery finds the receiver gone.
pub struct EventReceiver<T> {
    receiver: mpsc::Receiver<Envelope<T>>,
    topic: String,
}

impl<T> EventReceiver<T> {
    pub(crate) fn new(receiver: mpsc::Receiver<Envelope<T>>, topic: String) -> Self {
        Self { receiver, topic }
    }

    /// Receive the next event.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next event in publish order
    /// - `None` - The subscription was closed
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await.map(Envelope::open)
    }

    /// Try to receive the next event without waiting.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was available
    /// - `Ok(None)` - No event available yet
    /// - `Err(RecvError::Closed)` - The subscription was closed and drained
    pub fn try_recv(&mut self) -> Result<Option<T>, RecvError> {
        match self.receiver.try_recv() {
            Ok(envelope) => Ok(Some(envelope.open())),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(RecvError::Closed),
        }
    }

    /// Topic this receiver is subscribed to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<T> Stream for EventReceiver<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver
            .poll_recv(cx)
            .map(|envelope| envelope.map(Envelope::open))
    }
}

impl<T> std::fmt::Debug for EventReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
