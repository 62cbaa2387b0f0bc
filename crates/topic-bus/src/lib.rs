//! # Topic Bus - Ordered In-Process Publish/Subscribe
//!
//! Producers publish typed events to named topics; consumers subscribe to a
//! topic and receive events through a pull-style [`EventReceiver`] or a
//! push-style callback registered with [`Bus::on`] / [`Bus::once`].
//!
//! ## Delivery Model
//!
//! ```text
//!                 publish(topic, ev)
//!                        │  (registry lock: seq = counter++, snapshot)
//!        ┌───────────────┼───────────────┐
//!        ▼               ▼               ▼
//!  [delivery task]  [delivery task]  [delivery task]     one per subscriber
//!        │               │               │
//!        ▼               ▼               ▼
//!  Serializer S1    Serializer S2    (once: none)        reorder by seq
//!        │               │               │
//!        ▼               ▼               ▼
//!    queue S1         queue S2         queue S3          bounded, per subscriber
//! ```
//!
//! - **Non-blocking publish:** `publish()` only assigns a sequence number and
//!   spawns delivery tasks. It never waits for a subscriber.
//! - **Per-subscriber FIFO:** each persistent subscription owns a
//!   [`Serializer`] that releases deliveries strictly in publish order.
//! - **Isolation:** a subscriber that never reads only stalls its own
//!   delivery tasks (backpressure is per subscriber).
//! - **Once semantics:** once-subscriptions are removed from the registry under
//!   the lock, so they receive at most one event even under concurrent publishing.
//!
//! ## Usage
//!
//! ```ignore
//! use topic_bus::{Bus, BusConfig};
//!
//! let bus = Bus::<u64>::with_config(BusConfig::default().with_queue_capacity(16))?;
//!
//! let (mut rx, unsubscribe) = bus.subscribe("blocks");
//! bus.publish("blocks", 1);
//! bus.publish("blocks", 2);
//!
//! assert_eq!(rx.recv().await, Some(1));
//! assert_eq!(rx.recv().await, Some(2));
//! unsubscribe.unsubscribe();
//! ```
//!
//! ## Known Limitation
//!
//! If a low-sequence delivery task is descheduled indefinitely, every
//! later delivery for that subscriber waits in its Serializer. The pending
//! queue is not bounded in size or time.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
pub mod error;
pub mod listener;
pub mod receiver;
pub mod serializer;
pub mod subscription;

// Re-export main types
pub use bus::Bus;
pub use config::BusConfig;
pub use error::{ConfigError, RecvError};
pub use listener::EventHandler;
pub use receiver::EventReceiver;
pub use serializer::Serializer;
pub use subscription::{SubscriptionId, Unsubscribe};

/// Default per-subscriber queue capacity (0 = synchronous hand-off).
pub const DEFAULT_QUEUE_CAPACITY: usize = 0;

/// Largest accepted per-subscriber queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Environment variable read by [`BusConfig::from_env`].
pub const QUEUE_CAPACITY_ENV: &str = "TOPIC_BUS_QUEUE_CAPACITY";
