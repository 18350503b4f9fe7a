//! Shared Store Capability
//!
//! Everything the coordination protocol persists or publishes goes through the `Store`
//! trait: presence keys with TTLs, the node directory hash, queue lists, and pub/sub channels.
//!
//! ## Core Concepts
//! - **Transactions**: `Transaction` batches `Command`s that are applied all-or-nothing.
//!   Presence, health and deregistration writes are always transactional.
//! - **Duplicated handles**: `duplicate()` derives an independent handle onto the same
//!   logical store. Subscriptions use their own handle so blocking receives never starve
//!   command execution, and `quit()` closes only the handle it is called on.
//! - **Lists**: `rpoplpush` is the atomic hand-off between queue lists.
//!
//! `MemoryStore` implements the trait in-process with Redis semantics. A networked
//! backend plugs in by implementing the same trait.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection is closed")]
    Closed,
    #[error("WRONGTYPE operation against key {0} holding the wrong kind of value")]
    WrongType(String),
    #[error("invalid key pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A single write inside a `Transaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
        only_if_absent: bool,
    },
    HSet {
        key: String,
        field: String,
        value: String,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Del {
        key: String,
    },
}

/// Builder for an atomic batch of commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    commands: Vec<Command>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SET key value EX ttl NX`: create with a TTL only if the key does not exist.
    pub fn set_nx_ex(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value: value.into(),
            ttl: Some(ttl),
            only_if_absent: true,
        });
        self
    }

    /// `SETEX key ttl value`: unconditional write with a TTL.
    pub fn set_ex(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value: value.into(),
            ttl: Some(ttl),
            only_if_absent: false,
        });
        self
    }

    pub fn hset(
        mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.commands.push(Command::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.commands.push(Command::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn del(mut self, key: impl Into<String>) -> Self {
        self.commands.push(Command::Del { key: key.into() });
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A live channel subscription. Yields raw payloads until the owning handle quits.
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, receiver: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next payload. `None` once the subscription's connection is closed.
    pub async fn next_message(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Durable write without expiry.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remaining time to live; `None` for missing keys and keys without expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Keys matching a glob pattern (`*` and `?` wildcards).
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Pushes onto the head of a list, returning the new length.
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<usize>;

    /// Pushes onto the tail of a list, returning the new length.
    async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize>;

    /// Atomically pops the tail of `source` and pushes it onto the head of `destination`.
    async fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>>;

    /// Removes up to `count` occurrences of `value`; negative counts scan from the tail,
    /// zero removes all. Returns the number removed.
    async fn lrem(&self, key: &str, count: i64, value: &str) -> StoreResult<usize>;

    /// Inclusive range with Redis-style negative indices.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    async fn llen(&self, key: &str) -> StoreResult<usize>;

    /// Applies every command of the transaction or none of them.
    async fn exec(&self, transaction: Transaction) -> StoreResult<()>;

    /// Publishes a payload, returning the number of subscribers that received it.
    async fn publish(&self, channel: &str, message: &str) -> StoreResult<usize>;

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription>;

    /// Derives an independent handle sharing this handle's logical session.
    fn duplicate(&self) -> Arc<dyn Store>;

    /// True once `quit` has begun on this handle.
    fn is_closing(&self) -> bool;

    async fn quit(&self) -> StoreResult<()>;
}
