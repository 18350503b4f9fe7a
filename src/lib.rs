//! Hydra Service Mesh Core
//!
//! This library crate implements the coordination core shared by every service instance
//! of the mesh. Instances never talk to each other directly: all coordination goes through
//! a shared key/value and pub/sub store. It serves as the foundation for the binary
//! executable (`main.rs`).
//!
//! ## Architecture Modules
//!
//! - **`umf`**: The message envelope (long and short forms, signing, validation) and the
//!   parser for its `to` routing address.
//! - **`store`**: The store capability trait plus an in-process implementation with the
//!   TTL, list, transaction and pub/sub semantics the protocol depends on.
//! - **`keys`**: The wire-visible key and channel namespace.
//! - **`presence`**: Heartbeat publishing (presence and health records with short TTLs)
//!   and the discovery reads built on them.
//! - **`messaging`**: Channel subscriptions, inbound delivery and the reliable
//!   received/in-progress/incomplete queue.
//! - **`host`**: Address resolution and process statistics collaborators.
//! - **`registry`**: The `Hydra` facade tying it all together for one instance.
//! - **`config`** / **`error`**: Service configuration and the shared error type.

pub mod config;
pub mod error;
pub mod host;
pub mod keys;
pub mod messaging;
pub mod presence;
pub mod registry;
pub mod store;
pub mod umf;

pub use config::HydraConfig;
pub use error::{HydraError, Result};
pub use registry::{Hydra, ServiceRegistration};
pub use store::{MemoryStore, Store};
pub use umf::Umf;
