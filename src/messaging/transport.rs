//! Pub/sub transport for one service instance.

use crate::error::Result;
use crate::keys;
use crate::store::{Store, Subscription};
use crate::umf::Umf;
use crate::umf::message::is_truthy;

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the inbound message channel handed to the application.
pub const MESSAGE_CHANNEL_CAPACITY: usize = 1024;

/// The broadcast and direct subscriptions of a registered instance.
///
/// Each subscription runs on its own duplicated store handle.
pub struct MessageTransport {
    connections: Vec<Arc<dyn Store>>,
    listeners: Vec<JoinHandle<()>>,
}

impl MessageTransport {
    pub async fn open(
        store: &Arc<dyn Store>,
        service_name: &str,
        instance_id: &str,
        sender: mpsc::Sender<Umf>,
    ) -> Result<Self> {
        let channels = [
            keys::broadcast_channel(service_name),
            keys::direct_channel(service_name, instance_id),
        ];

        let mut connections = Vec::with_capacity(channels.len());
        let mut listeners = Vec::with_capacity(channels.len());

        for channel in channels {
            let connection = store.duplicate();
            let subscription = connection.subscribe(&channel).await?;
            debug!("Subscribed to {}", channel);

            let sender = sender.clone();
            listeners.push(tokio::spawn(async move {
                listen(subscription, sender).await;
            }));
            connections.push(connection);
        }

        Ok(Self {
            connections,
            listeners,
        })
    }

    /// Quits both subscriber connections in parallel and waits for the listeners to drain.
    pub async fn close(self) {
        let results = join_all(self.connections.iter().map(|connection| connection.quit())).await;
        for result in results {
            if let Err(e) = result {
                warn!("Failed to close subscriber connection: {}", e);
            }
        }

        for listener in self.listeners {
            if let Err(e) = listener.await {
                warn!("Message listener ended abnormally: {}", e);
            }
        }
    }
}

async fn listen(mut subscription: Subscription, sender: mpsc::Sender<Umf>) {
    while let Some(payload) = subscription.next_message().await {
        deliver(subscription.channel(), &payload, &sender);
    }
    info!("Listener on {} stopped", subscription.channel());
}

/// Decodes one raw payload and hands it to the application without blocking.
fn deliver(channel: &str, payload: &str, sender: &mpsc::Sender<Umf>) {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            warn!("Dropping undecodable payload on {}: {}", channel, e);
            return;
        }
    };

    let empty = value.as_object().is_some_and(|fields| fields.is_empty());
    if !is_truthy(&value) || empty {
        debug!("Ignoring empty payload on {}", channel);
        return;
    }

    let message = Umf::create(&value);
    match sender.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(message)) => {
            warn!("Inbound queue full, dropping {} from {}", message.mid, channel);
        }
        Err(TrySendError::Closed(message)) => {
            debug!("No receiver for {} from {}", message.mid, channel);
        }
    }
}

/// Publishes the short form of `message` on `channel`, returning the number of receivers.
pub async fn publish(store: &dyn Store, channel: &str, message: &Umf) -> Result<usize> {
    let receivers = store.publish(channel, &message.to_wire()?).await?;
    debug!("Published {} on {} to {} receivers", message.mid, channel, receivers);
    Ok(receivers)
}
