//! Host Collaborators
//!
//! Two capabilities the coordination core needs from its environment, each behind a trait
//! so tests and embedders can substitute their own:
//!
//! - **`network`**: `AddressResolver` decides which IP address an instance advertises.
//! - **`stats`**: `StatsCollector` samples process statistics for health snapshots.

pub mod network;
pub mod stats;

pub use network::{AddressResolver, ConfigResolver, InterfaceRecord, InterfaceSpec};
pub use stats::{MemoryUsage, ProcessStats, StatsCollector, SystemStats};
