use crate::config::HydraConfig;
use crate::error::{HydraError, Result};
use crate::host::{AddressResolver, ConfigResolver, StatsCollector, SystemStats};
use crate::keys;
use crate::messaging::{
    MESSAGE_CHANNEL_CAPACITY, MessageQueue, MessageTransport, QueueItem, publish,
};
use crate::presence::directory;
use crate::presence::{
    HealthSnapshot, Lifecycle, PresenceEntry, PresenceService, PresenceTimers, ServiceDescriptor,
    ServiceIdentity,
};
use crate::store::Store;
use crate::umf::{Umf, parse_route};

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// What `register_service` reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistration {
    pub service_name: String,
    #[serde(rename = "serviceIP")]
    pub service_ip: String,
    pub service_port: u16,
}

struct Running {
    timers: PresenceTimers,
    transport: MessageTransport,
}

struct Session {
    lifecycle: Lifecycle,
    /// Handed to the transport on registration.
    sender: Option<mpsc::Sender<Umf>>,
    running: Option<Running>,
}

/// One service instance taking part in the mesh.
pub struct Hydra {
    config: HydraConfig,
    identity: ServiceIdentity,
    store: Arc<dyn Store>,
    presence: Arc<PresenceService>,
    queue: MessageQueue,
    session: Mutex<Session>,
    inbound: std::sync::Mutex<Option<mpsc::Receiver<Umf>>>,
}

impl Hydra {
    /// Initializes an instance with the default address resolver and process statistics.
    pub async fn init(config: HydraConfig, store: Arc<dyn Store>) -> Result<Arc<Self>> {
        Self::init_with(
            config,
            store,
            &ConfigResolver::new(),
            Arc::new(SystemStats::new()),
        )
        .await
    }

    pub async fn init_with(
        config: HydraConfig,
        store: Arc<dyn Store>,
        resolver: &dyn AddressResolver,
        stats: Arc<dyn StatsCollector>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let service_ip = resolver.resolve(&config).await?;
        let host = stats.collect();
        let identity = ServiceIdentity {
            service_name: config.service_name.clone(),
            service_description: config.service_description.clone(),
            service_type: config.service_type.clone(),
            service_version: config.service_version.clone(),
            // No dashes, so the ID never splits an `instance-subID@` route prefix.
            instance_id: uuid::Uuid::new_v4().simple().to_string(),
            service_ip,
            service_port: config.service_port,
            host_name: host.host_name,
            process_id: host.process_id,
        };

        info!(
            "Initialized {} instance {} at {}:{}",
            identity.service_name,
            identity.instance_id,
            identity.service_ip,
            identity.service_port
        );

        let (sender, receiver) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let presence = PresenceService::new(store.clone(), identity.clone(), stats);

        Ok(Arc::new(Self {
            config,
            identity,
            queue: MessageQueue::new(store.clone()),
            store,
            presence,
            session: Mutex::new(Session {
                lifecycle: Lifecycle::Unregistered,
                sender: Some(sender),
                running: None,
            }),
            inbound: std::sync::Mutex::new(Some(receiver)),
        }))
    }

    pub fn config(&self) -> &HydraConfig {
        &self.config
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn service_name(&self) -> &str {
        &self.identity.service_name
    }

    pub fn instance_id(&self) -> &str {
        &self.identity.instance_id
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        self.session.lock().await.lifecycle
    }

    /// The receiving end of inbound messages. Only the first call gets it.
    pub fn take_messages(&self) -> Option<mpsc::Receiver<Umf>> {
        self.inbound.lock().ok()?.take()
    }

    // ============================================================
    // LIFECYCLE
    // ============================================================

    /// Announces the instance: descriptor, subscriptions, then presence and health timers.
    pub async fn register_service(&self) -> Result<ServiceRegistration> {
        let mut session = self.session.lock().await;
        if session.lifecycle != Lifecycle::Unregistered {
            return Err(HydraError::AlreadyRegistered(self.identity.service_name.clone()));
        }
        let Some(sender) = session.sender.clone() else {
            return Err(HydraError::AlreadyRegistered(self.identity.service_name.clone()));
        };

        self.presence.write_descriptor().await?;
        let transport = MessageTransport::open(
            &self.store,
            &self.identity.service_name,
            &self.identity.instance_id,
            sender,
        )
        .await?;
        let timers = self.presence.start().await;

        session.sender = None;
        session.running = Some(Running { timers, transport });
        session.lifecycle = Lifecycle::Registered;

        info!(
            "Registered {} instance {}",
            self.identity.service_name, self.identity.instance_id
        );

        Ok(ServiceRegistration {
            service_name: self.identity.service_name.clone(),
            service_ip: self.identity.service_ip.clone(),
            service_port: self.identity.service_port,
        })
    }

    /// Stops the timers, withdraws presence and closes every store connection.
    ///
    /// Calling it again after a completed shutdown is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        match session.lifecycle {
            Lifecycle::Unregistered => {
                return Err(HydraError::NotRegistered(self.identity.service_name.clone()));
            }
            Lifecycle::ShuttingDown | Lifecycle::Deregistered => return Ok(()),
            Lifecycle::Registered => {}
        }

        session.lifecycle = Lifecycle::ShuttingDown;
        info!(
            "Shutting down {} instance {}",
            self.identity.service_name, self.identity.instance_id
        );

        let (timers, transport) = match session.running.take() {
            Some(Running { timers, transport }) => (Some(timers), Some(transport)),
            None => (None, None),
        };

        if let Some(timers) = timers {
            timers.cancel().await;
        }

        let deregistered = self.presence.deregister().await;
        if let Err(e) = &deregistered {
            warn!("Failed to withdraw presence: {}", e);
        }

        let close_transport = async {
            if let Some(transport) = transport {
                transport.close().await;
            }
        };
        let (_, quit) = tokio::join!(close_transport, self.store.quit());
        if let Err(e) = quit {
            warn!("Failed to close command connection: {}", e);
        }

        session.lifecycle = Lifecycle::Deregistered;
        info!("Shutdown complete for {}", self.identity.service_name);
        deregistered
    }

    // ============================================================
    // QUEUE
    // ============================================================

    pub async fn queue_message(&self, partial: &Value) -> Result<Value> {
        self.queue.queue_message(partial).await
    }

    pub async fn get_queued_message(&self, service_name: &str) -> Result<Option<QueueItem>> {
        self.queue.get_queued_message(service_name).await
    }

    pub async fn mark_queue_message(
        &self,
        item: QueueItem,
        completed: bool,
        reason: Option<&str>,
    ) -> Result<Umf> {
        self.queue.mark_queue_message(item, completed, reason).await
    }

    // ============================================================
    // MESSAGING
    // ============================================================

    pub fn create_umf_message(&self, partial: &Value) -> Umf {
        Umf::create(partial)
    }

    /// Sends to the instance named in the route, or to a random live instance of the service.
    pub async fn send_message(&self, partial: &Value) -> Result<Umf> {
        self.send(Umf::create(partial)).await
    }

    /// Publishes to every instance of the target service.
    pub async fn send_broadcast_message(&self, partial: &Value) -> Result<Umf> {
        let message = Umf::create(partial);
        if !message.validate() {
            return Err(HydraError::InvalidMessage);
        }
        let route = parse_route(&message.to)?;

        let channel = keys::broadcast_channel(&route.service_name);
        publish(self.store.as_ref(), &channel, &message).await?;
        Ok(message)
    }

    /// Builds a reply to `original`: addressed back to its sender and linked by `rmid`.
    pub fn create_reply(&self, original: &Umf, partial: &Value) -> Umf {
        let mut reply = Umf::create(partial);
        reply.rmid = Some(original.mid.clone());
        reply.to = original.from.clone().unwrap_or_default();
        reply.from = Some(original.to.clone());
        reply
    }

    pub async fn send_reply_message(&self, original: &Umf, partial: &Value) -> Result<Umf> {
        self.send(self.create_reply(original, partial)).await
    }

    async fn send(&self, message: Umf) -> Result<Umf> {
        if !message.validate() {
            return Err(HydraError::InvalidMessage);
        }
        let route = parse_route(&message.to)?;

        let instance = if route.targets_instance() {
            route.instance.clone()
        } else {
            directory::pick_instance(self.store.as_ref(), &route.service_name)
                .await?
                .ok_or_else(|| HydraError::ServiceUnavailable(route.service_name.clone()))?
        };

        let channel = keys::direct_channel(&route.service_name, &instance);
        let receivers = publish(self.store.as_ref(), &channel, &message).await?;
        if receivers == 0 {
            debug!("No listener on {} for {}", channel, message.mid);
        }
        Ok(message)
    }

    // ============================================================
    // DISCOVERY
    // ============================================================

    pub async fn get_services(&self) -> Result<Vec<ServiceDescriptor>> {
        directory::services(self.store.as_ref()).await
    }

    pub async fn get_service_presence(&self, service_name: &str) -> Result<Vec<PresenceEntry>> {
        directory::presence(self.store.as_ref(), service_name).await
    }

    pub async fn get_service_health(&self, service_name: &str) -> Result<Vec<HealthSnapshot>> {
        directory::health(self.store.as_ref(), service_name).await
    }

    pub async fn get_service_nodes(&self) -> Result<Vec<PresenceEntry>> {
        directory::nodes(self.store.as_ref()).await
    }
}
