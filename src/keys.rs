//! Key & Channel Namespace
//!
//! Every key and channel name used on the shared store. These strings are wire-visible:
//! other implementations of the protocol read and write the same names.

pub const REDIS_PRE_KEY: &str = "hydra:service";
pub const MC_MESSAGE_KEY: &str = "hydra:service:mc";

/// The three lists of a service's reliable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueList {
    Received,
    InProgress,
    Incomplete,
}

impl QueueList {
    // "mqrecieved" is the established spelling on the wire.
    pub fn suffix(&self) -> &'static str {
        match self {
            QueueList::Received => "mqrecieved",
            QueueList::InProgress => "mqinprogress",
            QueueList::Incomplete => "mqincomplete",
        }
    }
}

pub fn service_key(service_name: &str) -> String {
    format!("{}:{}:service", REDIS_PRE_KEY, service_name)
}

/// Glob matching every service descriptor.
pub fn service_pattern() -> String {
    format!("{}:*:service", REDIS_PRE_KEY)
}

pub fn presence_key(service_name: &str, instance_id: &str) -> String {
    format!("{}:{}:{}:presence", REDIS_PRE_KEY, service_name, instance_id)
}

/// Glob matching the presence keys of every instance of a service.
pub fn presence_pattern(service_name: &str) -> String {
    format!("{}:{}:*:presence", REDIS_PRE_KEY, service_name)
}

pub fn health_key(service_name: &str, instance_id: &str) -> String {
    format!("{}:{}:{}:health", REDIS_PRE_KEY, service_name, instance_id)
}

pub fn health_pattern(service_name: &str) -> String {
    format!("{}:{}:*:health", REDIS_PRE_KEY, service_name)
}

pub fn health_log_key(service_name: &str, instance_id: &str) -> String {
    format!("{}:{}:{}:health:log", REDIS_PRE_KEY, service_name, instance_id)
}

pub fn nodes_key() -> String {
    format!("{}:nodes", REDIS_PRE_KEY)
}

pub fn queue_key(service_name: &str, list: QueueList) -> String {
    format!("{}:{}:{}", REDIS_PRE_KEY, service_name, list.suffix())
}

pub fn broadcast_channel(service_name: &str) -> String {
    format!("{}:{}", MC_MESSAGE_KEY, service_name)
}

pub fn direct_channel(service_name: &str, instance_id: &str) -> String {
    format!("{}:{}:{}", MC_MESSAGE_KEY, service_name, instance_id)
}

/// Extracts the instance ID from a key shaped `<prefix>:<service>:<instance>:<suffix>`.
pub fn instance_from_key<'a>(key: &'a str, service_name: &str, suffix: &str) -> Option<&'a str> {
    key.strip_prefix(REDIS_PRE_KEY)?
        .strip_prefix(':')?
        .strip_prefix(service_name)?
        .strip_prefix(':')?
        .strip_suffix(suffix)?
        .strip_suffix(':')
}
