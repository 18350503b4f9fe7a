//! Presence & Health Engine
//!
//! Publishes the liveness of a service instance to the shared store and reads back the
//! liveness of others.
//!
//! ## Core Concepts
//! - **Presence record**: a key holding the instance ID with a 3 second TTL, created with
//!   `NX` once per second. An instance is alive exactly as long as this key exists; there
//!   is no explicit "down" event.
//! - **Node directory**: a hash of the last presence payload of every instance. It never
//!   expires, so it answers "where was this instance" and never "is it alive".
//! - **Health snapshot**: process statistics written every 5 seconds with the same TTL,
//!   plus a week-long retention on the instance's health log key.
//!
//! ## Submodules
//! - **`types`**: Records, lifecycle states and timing constants.
//! - **`service`**: `PresenceService`, the timers and the deregistration transaction.
//! - **`directory`**: Discovery reads over presence, health and the node directory.

pub mod directory;
pub mod service;
pub mod types;

pub use service::{PresenceService, PresenceTimers};
pub use types::{
    HealthSnapshot, KEY_EXPIRATION_TTL, Lifecycle, PresenceEntry, ServiceDescriptor,
    ServiceIdentity,
};
