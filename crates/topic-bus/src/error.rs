//! Error types for the topic bus.
//!
//! The bus itself reports no runtime errors: publishing to an empty topic,
//! unsubscribing twice, or unsubscribing a fired once-subscription are all
//! silent no-ops. Errors only exist at the edges (configuration and the
//! non-blocking receive path).

use thiserror::Error;

/// Errors from bus configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Queue capacity could not be parsed.
    #[error("Invalid queue capacity: {value:?}")]
    InvalidQueueCapacity { value: String },

    /// Queue capacity exceeds the supported maximum.
    #[error("Queue capacity too large: {capacity} > {max}")]
    QueueCapacityTooLarge { capacity: usize, max: usize },
}

/// Errors from receiving on an [`EventReceiver`](crate::EventReceiver).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecvError {
    /// The subscription was closed and every buffered event has been read.
    #[error("Subscription closed")]
    Closed,
}
