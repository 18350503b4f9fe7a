//! Service Registry Facade
//!
//! `Hydra` is the one object an application holds. It ties the subsystems together for a
//! single service instance:
//!
//! 1. **Init**: validate the configuration, resolve the advertised address, derive a
//!    fresh instance ID and sample the host.
//! 2. **Register**: write the service descriptor, subscribe to the broadcast and direct
//!    channels, then start presence and health publishing.
//! 3. **Operate**: queue and claim work, send direct, broadcast and reply messages,
//!    read inbound messages from `take_messages()`, and discover other services.
//! 4. **Shutdown**: cancel the timers, withdraw presence, close every store connection.

pub mod hydra;

pub use hydra::{Hydra, ServiceRegistration};
