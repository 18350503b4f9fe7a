//! Reliable Queue
//!
//! Three lists per service hold serialized short-form envelopes:
//! `received` (new work), `in-progress` (claimed) and `incomplete` (failed).
//!
//! Producers push onto the head of `received`; consumers claim with an atomic tail-pop /
//! head-push into `in-progress`, so items are claimed in arrival order and by exactly one
//! consumer. Marking an item removes it from `in-progress`; failed items move to
//! `incomplete` with the failure reason written into their body and are not retried here.

use crate::error::{HydraError, Result};
use crate::keys::{self, QueueList};
use crate::store::Store;
use crate::umf::{Umf, parse_route};

use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_FAILURE_REASON: &str = "reason not provided";

/// A claimed queue entry.
///
/// `raw` is the exact stored string; marking removes that string from the in-progress list.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub service_name: String,
    pub raw: String,
    pub message: Umf,
}

pub struct MessageQueue {
    store: Arc<dyn Store>,
}

impl MessageQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Validates and routes `partial`, then appends it to the target service's received list.
    ///
    /// Returns the caller's message unchanged.
    pub async fn queue_message(&self, partial: &Value) -> Result<Value> {
        let message = Umf::create(partial);
        if !message.validate() {
            return Err(HydraError::InvalidMessage);
        }

        let short = message.to_short();
        let route = parse_route(&short.to)?;
        let key = keys::queue_key(&route.service_name, QueueList::Received);
        let raw = serde_json::to_string(&short)?;

        let depth = self.store.lpush(&key, &raw).await?;
        debug!("Queued {} for {} (depth {})", message.mid, route.service_name, depth);
        Ok(partial.clone())
    }

    /// Claims the oldest received item of `service_name`, if any.
    pub async fn get_queued_message(&self, service_name: &str) -> Result<Option<QueueItem>> {
        let received = keys::queue_key(service_name, QueueList::Received);
        let in_progress = keys::queue_key(service_name, QueueList::InProgress);

        let Some(raw) = self.store.rpoplpush(&received, &in_progress).await? else {
            return Ok(None);
        };

        let message = match Umf::parse(&raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Parking undecodable item for {}: {}", service_name, e);
                let reason = format!("undecodable payload: {}", e);
                self.park_undecodable(service_name, &raw, &reason).await?;
                return Err(e.into());
            }
        };
        debug!("Claimed {} from {}", message.mid, service_name);

        Ok(Some(QueueItem {
            service_name: service_name.to_string(),
            raw,
            message,
        }))
    }

    /// Takes a payload that is not an envelope out of `in-progress` and parks it in
    /// `incomplete`, wrapped in an envelope whose body records the reason and the original text.
    async fn park_undecodable(&self, service_name: &str, raw: &str, reason: &str) -> Result<()> {
        let in_progress = keys::queue_key(service_name, QueueList::InProgress);
        let incomplete = keys::queue_key(service_name, QueueList::Incomplete);

        let wrapped = Umf::create(&json!({
            "to": format!("{}:/", service_name),
            "body": { "reason": reason, "payload": raw },
        }));
        self.store.lrem(&in_progress, -1, raw).await?;
        self.store.rpush(&incomplete, &wrapped.to_wire()?).await?;
        Ok(())
    }

    /// Releases a claimed item. Failed items are annotated and parked in `incomplete`.
    pub async fn mark_queue_message(
        &self,
        item: QueueItem,
        completed: bool,
        reason: Option<&str>,
    ) -> Result<Umf> {
        let in_progress = keys::queue_key(&item.service_name, QueueList::InProgress);
        let removed = self.store.lrem(&in_progress, -1, &item.raw).await?;
        if removed == 0 {
            warn!(
                "Item {} was not in progress for {}",
                item.message.mid, item.service_name
            );
        }

        let mut message = item.message;
        if completed {
            debug!("Completed {} for {}", message.mid, item.service_name);
            return Ok(message);
        }

        let reason = reason.unwrap_or(DEFAULT_FAILURE_REASON);
        annotate_failure(&mut message, reason);

        let incomplete = keys::queue_key(&item.service_name, QueueList::Incomplete);
        self.store.rpush(&incomplete, &message.to_wire()?).await?;
        info!(
            "Moved {} to incomplete for {}: {}",
            message.mid, item.service_name, reason
        );
        Ok(message)
    }
}

fn annotate_failure(message: &mut Umf, reason: &str) {
    match message.body.as_mut() {
        Some(Value::Object(body)) => {
            body.insert("reason".to_string(), Value::from(reason));
        }
        None | Some(Value::Null) => {
            let mut body = Map::new();
            body.insert("reason".to_string(), Value::from(reason));
            message.body = Some(Value::Object(body));
        }
        Some(_) => {
            warn!("Body of {} is not an object, failure reason not recorded", message.mid);
        }
    }
}
