use crate::host::ProcessStats;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL of presence and health records. An instance silent for longer is considered gone.
pub const KEY_EXPIRATION_TTL: Duration = Duration::from_secs(3);
pub const PRESENCE_UPDATE_INTERVAL: Duration = Duration::from_secs(1);
pub const HEALTH_UPDATE_INTERVAL: Duration = Duration::from_secs(5);
/// One week.
pub const HEALTH_LOG_RETENTION: Duration = Duration::from_secs(604_800);
/// TTL applied to health records on shutdown so they disappear almost immediately.
pub const SHUTDOWN_TTL: Duration = Duration::from_secs(1);

/// Everything an instance says about itself, fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service_name: String,
    pub service_description: String,
    pub service_type: String,
    pub service_version: String,
    pub instance_id: String,
    pub service_ip: String,
    pub service_port: u16,
    pub host_name: String,
    pub process_id: u32,
}

/// Durable record written once per service at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub service_name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub registered_on: String,
}

/// Liveness payload. Stored in the node directory and returned by discovery lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub service_name: String,
    pub service_description: String,
    pub version: String,
    #[serde(rename = "instanceID")]
    pub instance_id: String,
    pub updated_on: String,
    #[serde(rename = "processID")]
    pub process_id: u32,
    pub ip: String,
    pub port: u16,
    pub host_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub updated_on: String,
    pub service_name: String,
    #[serde(rename = "instanceID")]
    pub instance_id: String,
    pub service_version: String,
    pub stats: ProcessStats,
}

/// Registration lifecycle of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unregistered,
    Registered,
    ShuttingDown,
    Deregistered,
}
