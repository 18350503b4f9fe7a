//! In-Memory Store
//!
//! A single-process implementation of the `Store` capability with the semantics the
//! coordination protocol relies on: lazily-expired TTL keys, `NX` sets, hashes, lists with
//! an atomic tail-to-head transfer, glob key scans and pub/sub fan-out.
//!
//! Expiry is measured with `tokio::time::Instant`, so tests can drive TTLs with a paused clock.

use super::{Command, Store, StoreError, StoreResult, Subscription, Transaction};

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Hash,
    List,
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn kind(&self) -> Kind {
        match self.value {
            Value::Str(_) => Kind::Str,
            Value::Hash(_) => Kind::Hash,
            Value::List(_) => Kind::List,
        }
    }
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    fn purge(&mut self, key: &str, now: Instant) {
        if self.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.entries.remove(key);
        }
    }

    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        self.purge(key, now);
        self.entries.get_mut(key)
    }

    fn kind(&mut self, key: &str, now: Instant) -> Option<Kind> {
        self.live(key, now).map(|entry| entry.kind())
    }

    fn list(&mut self, key: &str, now: Instant) -> StoreResult<Option<&mut VecDeque<String>>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(Some(list)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn list_or_create(&mut self, key: &str, now: Instant) -> StoreResult<&mut VecDeque<String>> {
        self.purge(key, now);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        match &mut entry.value {
            Value::List(list) => Ok(list),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    /// Redis drops a list key as soon as its last element is removed.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = matches!(
            self.entries.get(key),
            Some(Entry { value: Value::List(list), .. }) if list.is_empty()
        );
        if empty {
            self.entries.remove(key);
        }
    }

    /// Rejects a transaction up front if any command would hit a key of the wrong kind,
    /// taking the effect of earlier commands in the same batch into account.
    fn check(&mut self, commands: &[Command], now: Instant) -> StoreResult<()> {
        let mut pending: HashMap<&str, Option<Kind>> = HashMap::new();

        for command in commands {
            match command {
                Command::Set {
                    key,
                    only_if_absent,
                    ..
                } => {
                    let current = match pending.get(key.as_str()) {
                        Some(kind) => *kind,
                        None => self.kind(key, now),
                    };
                    if !(*only_if_absent && current.is_some()) {
                        pending.insert(key.as_str(), Some(Kind::Str));
                    }
                }
                Command::HSet { key, .. } => {
                    let current = match pending.get(key.as_str()) {
                        Some(kind) => *kind,
                        None => self.kind(key, now),
                    };
                    if current.is_some_and(|kind| kind != Kind::Hash) {
                        return Err(StoreError::WrongType(key.clone()));
                    }
                    pending.insert(key.as_str(), Some(Kind::Hash));
                }
                Command::Del { key } => {
                    pending.insert(key.as_str(), None);
                }
                Command::Expire { .. } => {}
            }
        }

        Ok(())
    }

    fn apply(&mut self, command: &Command, now: Instant) {
        match command {
            Command::Set {
                key,
                value,
                ttl,
                only_if_absent,
            } => {
                if *only_if_absent && self.live(key, now).is_some() {
                    return;
                }
                let entry = Entry {
                    value: Value::Str(value.clone()),
                    expires_at: ttl.map(|ttl| now + ttl),
                };
                self.entries.insert(key.clone(), entry);
            }
            Command::HSet { key, field, value } => {
                self.purge(key, now);
                let entry = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
                if let Value::Hash(hash) = &mut entry.value {
                    hash.insert(field.clone(), value.clone());
                }
            }
            Command::Expire { key, ttl } => {
                if let Some(entry) = self.live(key, now) {
                    entry.expires_at = Some(now + *ttl);
                }
            }
            Command::Del { key } => {
                self.entries.remove(key);
            }
        }
    }
}

struct Subscriber {
    handle_id: u64,
    sender: mpsc::UnboundedSender<String>,
}

struct Shared {
    keyspace: Mutex<Keyspace>,
    channels: DashMap<String, Vec<Subscriber>>,
    next_handle: AtomicU64,
}

/// One handle onto an in-process keyspace. `duplicate()` hands out sibling handles.
pub struct MemoryStore {
    shared: Arc<Shared>,
    handle_id: u64,
    closing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let shared = Arc::new(Shared {
            keyspace: Mutex::new(Keyspace::default()),
            channels: DashMap::new(),
            next_handle: AtomicU64::new(1),
        });

        Arc::new(Self {
            shared,
            handle_id: 0,
            closing: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        match keyspace.live(key, Instant::now()) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        keyspace
            .entries
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        Ok(keyspace.live(key, Instant::now()).is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut keyspace = self.shared.keyspace.lock().await;
        Ok(keyspace
            .live(key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        let keyspace = self.shared.keyspace.lock().await;

        let mut keys: Vec<String> = keyspace
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        match keyspace.live(key, Instant::now()) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.get(field).cloned()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        match keyspace.live(key, Instant::now()) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        let list = keyspace.list_or_create(key, Instant::now())?;
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        let list = keyspace.list_or_create(key, Instant::now())?;
        list.push_back(value.to_string());
        Ok(list.len())
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut keyspace = self.shared.keyspace.lock().await;

        if keyspace
            .kind(destination, now)
            .is_some_and(|kind| kind != Kind::List)
        {
            return Err(StoreError::WrongType(destination.to_string()));
        }

        let item = match keyspace.list(source, now)? {
            Some(list) => list.pop_back(),
            None => None,
        };
        let Some(item) = item else {
            return Ok(None);
        };
        keyspace.drop_if_empty(source);

        keyspace
            .list_or_create(destination, now)?
            .push_front(item.clone());
        Ok(Some(item))
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        let Some(list) = keyspace.list(key, Instant::now())? else {
            return Ok(0);
        };

        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0;

        if count >= 0 {
            let mut index = 0;
            while index < list.len() && removed < limit {
                if list[index] == value {
                    list.remove(index);
                    removed += 1;
                } else {
                    index += 1;
                }
            }
        } else {
            let mut index = list.len();
            while index > 0 && removed < limit {
                index -= 1;
                if list[index] == value {
                    list.remove(index);
                    removed += 1;
                }
            }
        }

        keyspace.drop_if_empty(key);
        Ok(removed)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        let Some(list) = keyspace.list(key, Instant::now())? else {
            return Ok(Vec::new());
        };

        let len = list.len() as i64;
        let start = (if start < 0 { len + start } else { start }).max(0);
        let stop = (if stop < 0 { len + stop } else { stop }).min(len - 1);
        if start > stop {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn llen(&self, key: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        let mut keyspace = self.shared.keyspace.lock().await;
        Ok(keyspace
            .list(key, Instant::now())?
            .map(|list| list.len())
            .unwrap_or(0))
    }

    async fn exec(&self, transaction: Transaction) -> StoreResult<()> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut keyspace = self.shared.keyspace.lock().await;

        keyspace.check(transaction.commands(), now)?;
        for command in transaction.commands() {
            keyspace.apply(command, now);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<usize> {
        self.ensure_open()?;
        let Some(mut subscribers) = self.shared.channels.get_mut(channel) else {
            return Ok(0);
        };

        subscribers.retain(|subscriber| subscriber.sender.send(message.to_string()).is_ok());
        Ok(subscribers.len())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        self.ensure_open()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.shared
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber {
                handle_id: self.handle_id,
                sender,
            });

        tracing::debug!("Handle {} subscribed to {}", self.handle_id, channel);
        Ok(Subscription::new(channel, receiver))
    }

    fn duplicate(&self) -> Arc<dyn Store> {
        Arc::new(Self {
            shared: self.shared.clone(),
            handle_id: self.shared.next_handle.fetch_add(1, Ordering::SeqCst),
            closing: AtomicBool::new(false),
        })
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    async fn quit(&self) -> StoreResult<()> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Dropping the senders ends every subscription opened through this handle.
        for mut channel in self.shared.channels.iter_mut() {
            channel
                .value_mut()
                .retain(|subscriber| subscriber.handle_id != self.handle_id);
        }

        tracing::debug!("Store handle {} closed", self.handle_id);
        Ok(())
    }
}

fn glob_to_regex(pattern: &str) -> StoreResult<Regex> {
    let mut expression = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            other => expression.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push('$');

    Regex::new(&expression).map_err(|e| StoreError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
