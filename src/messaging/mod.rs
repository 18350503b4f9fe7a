//! Messaging Transport & Queue Manager
//!
//! Moves UMF envelopes between service instances over the shared store.
//!
//! ## Core Concepts
//! - **Channels**: every registered instance listens on its service's broadcast channel and
//!   on a direct channel of its own. Payloads travel in short form and are expanded into
//!   canonical envelopes before the application sees them.
//! - **Inbound delivery**: decoded messages land on a bounded channel. A slow consumer
//!   loses messages (with a warning) instead of stalling the subscribers.
//! - **Reliable queue**: the received, in-progress and incomplete lists give at-most-one
//!   claim of each queued item.
//!
//! ## Submodules
//! - **`transport`**: Subscriptions, listener tasks and publishing.
//! - **`queue`**: `MessageQueue` and `QueueItem`.

pub mod queue;
pub mod transport;

pub use queue::{DEFAULT_FAILURE_REASON, MessageQueue, QueueItem};
pub use transport::{MESSAGE_CHANNEL_CAPACITY, MessageTransport, publish};

#[cfg(test)]
mod tests;
