//! Read side of the presence data: which services exist and which instances are alive.

use crate::error::Result;
use crate::keys;
use crate::store::Store;

use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::types::{HealthSnapshot, PresenceEntry, ServiceDescriptor};

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Skipping undecodable record {}: {}", key, e);
            None
        }
    }
}

pub async fn services(store: &dyn Store) -> Result<Vec<ServiceDescriptor>> {
    let mut descriptors = Vec::new();
    for key in store.keys(&keys::service_pattern()).await? {
        if let Some(raw) = store.get(&key).await? {
            descriptors.extend(decode(&key, &raw));
        }
    }
    Ok(descriptors)
}

/// Instance IDs whose presence record currently exists.
pub async fn live_instances(store: &dyn Store, service_name: &str) -> Result<Vec<String>> {
    let pattern = keys::presence_pattern(service_name);
    let instances = store
        .keys(&pattern)
        .await?
        .iter()
        .filter_map(|key| keys::instance_from_key(key, service_name, "presence"))
        .map(str::to_string)
        .collect();
    Ok(instances)
}

/// A uniformly chosen live instance, if any.
pub async fn pick_instance(store: &dyn Store, service_name: &str) -> Result<Option<String>> {
    let instances = live_instances(store, service_name).await?;
    Ok(instances.choose(&mut rand::thread_rng()).cloned())
}

/// Directory entries of the live instances of a service.
pub async fn presence(store: &dyn Store, service_name: &str) -> Result<Vec<PresenceEntry>> {
    let nodes = keys::nodes_key();
    let mut entries = Vec::new();
    for instance_id in live_instances(store, service_name).await? {
        if let Some(raw) = store.hget(&nodes, &instance_id).await? {
            entries.extend(decode(&nodes, &raw));
        }
    }
    Ok(entries)
}

pub async fn health(store: &dyn Store, service_name: &str) -> Result<Vec<HealthSnapshot>> {
    let mut snapshots = Vec::new();
    for key in store.keys(&keys::health_pattern(service_name)).await? {
        if let Some(raw) = store.get(&key).await? {
            snapshots.extend(decode(&key, &raw));
        }
    }
    Ok(snapshots)
}

/// Every directory entry ever written, including instances that have since died.
pub async fn nodes(store: &dyn Store) -> Result<Vec<PresenceEntry>> {
    let nodes = keys::nodes_key();
    let mut entries: Vec<PresenceEntry> = store
        .hgetall(&nodes)
        .await?
        .values()
        .filter_map(|raw| decode(&nodes, raw))
        .collect();
    entries.sort_by(|a, b| {
        (a.service_name.as_str(), a.instance_id.as_str())
            .cmp(&(b.service_name.as_str(), b.instance_id.as_str()))
    });
    Ok(entries)
}
