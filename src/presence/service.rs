use crate::error::Result;
use crate::host::StatsCollector;
use crate::keys;
use crate::store::{Store, Transaction};
use crate::umf::message::timestamp;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::types::{
    HEALTH_LOG_RETENTION, HEALTH_UPDATE_INTERVAL, HealthSnapshot, KEY_EXPIRATION_TTL,
    PRESENCE_UPDATE_INTERVAL, PresenceEntry, SHUTDOWN_TTL, ServiceDescriptor, ServiceIdentity,
};

pub struct PresenceService {
    pub identity: ServiceIdentity,
    store: Arc<dyn Store>,
    stats: Arc<dyn StatsCollector>,
}

/// Handles to the two periodic publishers started by [`PresenceService::start`].
pub struct PresenceTimers {
    presence: JoinHandle<()>,
    health: JoinHandle<()>,
}

impl PresenceTimers {
    /// Stops both timers and waits until neither can fire again.
    pub async fn cancel(self) {
        self.presence.abort();
        self.health.abort();
        for handle in [self.presence, self.health] {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Presence timer ended abnormally: {}", e);
                }
            }
        }
    }
}

impl PresenceService {
    pub fn new(
        store: Arc<dyn Store>,
        identity: ServiceIdentity,
        stats: Arc<dyn StatsCollector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            store,
            stats,
        })
    }

    pub async fn write_descriptor(&self) -> Result<ServiceDescriptor> {
        let descriptor = ServiceDescriptor {
            service_name: self.identity.service_name.clone(),
            service_type: self.identity.service_type.clone(),
            registered_on: timestamp(),
        };
        let key = keys::service_key(&self.identity.service_name);
        self.store
            .set(&key, &serde_json::to_string(&descriptor)?)
            .await?;
        debug!("Wrote service descriptor {}", key);
        Ok(descriptor)
    }

    pub fn presence_entry(&self) -> PresenceEntry {
        PresenceEntry {
            service_name: self.identity.service_name.clone(),
            service_description: self.identity.service_description.clone(),
            version: self.identity.service_version.clone(),
            instance_id: self.identity.instance_id.clone(),
            updated_on: timestamp(),
            process_id: self.identity.process_id,
            ip: self.identity.service_ip.clone(),
            port: self.identity.service_port,
            host_name: self.identity.host_name.clone(),
        }
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            updated_on: timestamp(),
            service_name: self.identity.service_name.clone(),
            instance_id: self.identity.instance_id.clone(),
            service_version: self.identity.service_version.clone(),
            stats: self.stats.collect(),
        }
    }

    /// Creates the presence record if absent and refreshes this instance's directory entry.
    ///
    /// Returns `false` without touching the store when the connection is closing.
    pub async fn publish_presence(&self) -> Result<bool> {
        if self.store.is_closing() {
            debug!("Store closing, skipping presence update");
            return Ok(false);
        }

        let identity = &self.identity;
        let entry = serde_json::to_string(&self.presence_entry())?;
        let transaction = Transaction::new()
            .set_nx_ex(
                keys::presence_key(&identity.service_name, &identity.instance_id),
                identity.instance_id.clone(),
                KEY_EXPIRATION_TTL,
            )
            .hset(keys::nodes_key(), identity.instance_id.clone(), entry);

        self.store.exec(transaction).await?;
        Ok(true)
    }

    /// Writes a fresh health snapshot and extends the retention of the health log.
    pub async fn publish_health(&self) -> Result<bool> {
        if self.store.is_closing() {
            debug!("Store closing, skipping health update");
            return Ok(false);
        }

        let identity = &self.identity;
        let snapshot = serde_json::to_string(&self.health_snapshot())?;
        let transaction = Transaction::new()
            .set_ex(
                keys::health_key(&identity.service_name, &identity.instance_id),
                snapshot,
                KEY_EXPIRATION_TTL,
            )
            .expire(
                keys::health_log_key(&identity.service_name, &identity.instance_id),
                HEALTH_LOG_RETENTION,
            );

        self.store.exec(transaction).await?;
        Ok(true)
    }

    /// Publishes presence once, then starts the presence and health timers.
    pub async fn start(self: &Arc<Self>) -> PresenceTimers {
        if let Err(e) = self.publish_presence().await {
            warn!("Initial presence update failed: {}", e);
        }

        let presence = {
            let service = self.clone();
            tokio::spawn(async move {
                service.presence_loop().await;
            })
        };

        let health = {
            let service = self.clone();
            tokio::spawn(async move {
                service.health_loop().await;
            })
        };

        info!(
            "Presence started for {} instance {}",
            self.identity.service_name, self.identity.instance_id
        );

        PresenceTimers { presence, health }
    }

    fn ticker(period: Duration) -> tokio::time::Interval {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    async fn presence_loop(self: Arc<Self>) {
        let mut interval = Self::ticker(PRESENCE_UPDATE_INTERVAL);

        loop {
            interval.tick().await;

            if let Err(e) = self.publish_presence().await {
                warn!("Presence update failed: {}", e);
            }
        }
    }

    async fn health_loop(self: Arc<Self>) {
        let mut interval = Self::ticker(HEALTH_UPDATE_INTERVAL);

        loop {
            interval.tick().await;

            if let Err(e) = self.publish_health().await {
                warn!("Health update failed: {}", e);
            }
        }
    }

    /// Shortens the health TTLs and deletes the presence record in one transaction.
    pub async fn deregister(&self) -> Result<()> {
        let identity = &self.identity;
        let transaction = Transaction::new()
            .expire(
                keys::health_key(&identity.service_name, &identity.instance_id),
                SHUTDOWN_TTL,
            )
            .expire(
                keys::health_log_key(&identity.service_name, &identity.instance_id),
                SHUTDOWN_TTL,
            )
            .del(keys::presence_key(&identity.service_name, &identity.instance_id));

        self.store.exec(transaction).await?;
        info!(
            "Deregistered {} instance {}",
            identity.service_name, identity.instance_id
        );
        Ok(())
    }
}
