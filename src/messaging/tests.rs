//! Messaging Module Tests
//!
//! ## Test Scopes
//! - **Queue**: Validation and routing on enqueue, FIFO claims, single-winner claims,
//!   completion and failure marking.
//! - **Transport**: Broadcast and direct delivery, payload filtering, back-pressure drops
//!   and connection shutdown.

#[cfg(test)]
mod tests {
    use crate::error::HydraError;
    use crate::keys::{self, QueueList};
    use crate::messaging::queue::{DEFAULT_FAILURE_REASON, MessageQueue};
    use crate::messaging::transport::{MessageTransport, publish};
    use crate::store::{MemoryStore, Store};
    use crate::umf::{RouteError, Umf};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn work(to: &str, n: u64) -> serde_json::Value {
        json!({ "to": to, "from": "client:/", "body": { "n": n } })
    }

    async fn list(store: &Arc<dyn Store>, service: &str, which: QueueList) -> Vec<String> {
        store
            .lrange(&keys::queue_key(service, which), 0, -1)
            .await
            .unwrap()
    }

    // ============================================================
    // QUEUE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_queue_message_stores_short_form() {
        // ARRANGE
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store.clone());
        let partial = work("worker:[post]/jobs", 1);

        // ACT
        let returned = queue.queue_message(&partial).await.unwrap();

        // ASSERT
        assert_eq!(returned, partial);
        let received = list(&store, "worker", QueueList::Received).await;
        assert_eq!(received.len(), 1);
        let stored: serde_json::Value = serde_json::from_str(&received[0]).unwrap();
        assert_eq!(stored["to"], "worker:[post]/jobs");
        assert_eq!(stored["frm"], "client:/");
        assert_eq!(stored["bdy"]["n"], 1);
        assert!(stored.get("from").is_none());
    }

    #[tokio::test]
    async fn test_queue_rejects_invalid_message() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store.clone());

        let result = queue
            .queue_message(&json!({ "to": "worker:/", "from": "client:/" }))
            .await;

        assert!(matches!(result, Err(HydraError::InvalidMessage)));
        assert!(store.keys("*").await.unwrap().is_empty(), "nothing written");
    }

    #[tokio::test]
    async fn test_queue_rejects_unroutable_address() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store.clone());

        let result = queue.queue_message(&work("worker", 1)).await;
        let bad_verb = queue.queue_message(&work("worker:[get/x", 1)).await;

        assert!(matches!(
            result,
            Err(HydraError::Route(RouteError::InvalidSegmentCount))
        ));
        assert!(matches!(
            bad_verb,
            Err(HydraError::Route(RouteError::IllFormedVerb))
        ));
        assert!(store.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claims_follow_arrival_order() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store.clone());
        for n in 1..=3 {
            queue.queue_message(&work("worker:/jobs", n)).await.unwrap();
        }

        let mut seen = Vec::new();
        while let Some(item) = queue.get_queued_message("worker").await.unwrap() {
            seen.push(item.message.body.unwrap()["n"].as_u64().unwrap());
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(list(&store, "worker", QueueList::InProgress).await.len(), 3);
        assert!(list(&store, "worker", QueueList::Received).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_queue_is_not_an_error() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store);

        assert!(queue.get_queued_message("idle").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        // ARRANGE
        let store: Arc<dyn Store> = MemoryStore::new();
        MessageQueue::new(store.clone())
            .queue_message(&work("worker:/jobs", 7))
            .await
            .unwrap();
        let first = MessageQueue::new(store.duplicate());
        let second = MessageQueue::new(store.duplicate());

        // ACT
        let (a, b) = tokio::join!(
            first.get_queued_message("worker"),
            second.get_queued_message("worker")
        );

        // ASSERT
        let claimed: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
        assert_eq!(claimed.len(), 1);
        assert_eq!(list(&store, "worker", QueueList::InProgress).await.len(), 1);
        assert!(list(&store, "worker", QueueList::Received).await.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_claim_is_parked_in_incomplete() {
        // ARRANGE
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store.clone());
        store
            .lpush(&keys::queue_key("worker", QueueList::Received), "not json")
            .await
            .unwrap();

        // ACT
        let first = queue.get_queued_message("worker").await;
        let second = queue.get_queued_message("worker").await.unwrap();

        // ASSERT
        assert!(matches!(first, Err(HydraError::Serialization(_))));
        assert!(second.is_none());
        assert!(list(&store, "worker", QueueList::InProgress).await.is_empty());
        let incomplete = list(&store, "worker", QueueList::Incomplete).await;
        assert_eq!(incomplete.len(), 1);
        let parked = Umf::parse(&incomplete[0]).unwrap();
        let body = parked.body.unwrap();
        assert_eq!(body["payload"], "not json");
        assert!(body["reason"].as_str().unwrap().starts_with("undecodable payload"));
    }

    #[tokio::test]
    async fn test_mark_failed_moves_to_incomplete_with_reason() {
        // ARRANGE
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store.clone());
        queue.queue_message(&work("worker:/jobs", 1)).await.unwrap();
        let item = queue.get_queued_message("worker").await.unwrap().unwrap();
        let mid = item.message.mid.clone();

        // ACT
        let marked = queue
            .mark_queue_message(item, false, Some("boom"))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(marked.body.as_ref().unwrap()["reason"], "boom");
        assert!(list(&store, "worker", QueueList::InProgress).await.is_empty());
        let incomplete = list(&store, "worker", QueueList::Incomplete).await;
        assert_eq!(incomplete.len(), 1);
        let parked = Umf::parse(&incomplete[0]).unwrap();
        assert_eq!(parked.mid, mid);
        assert_eq!(parked.body.unwrap()["reason"], "boom");
    }

    #[tokio::test]
    async fn test_mark_failed_without_reason_uses_default() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store.clone());
        queue.queue_message(&work("worker:/jobs", 1)).await.unwrap();
        let item = queue.get_queued_message("worker").await.unwrap().unwrap();

        let marked = queue.mark_queue_message(item, false, None).await.unwrap();

        assert_eq!(marked.body.unwrap()["reason"], DEFAULT_FAILURE_REASON);
    }

    #[tokio::test]
    async fn test_mark_completed_only_removes_from_in_progress() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let queue = MessageQueue::new(store.clone());
        queue.queue_message(&work("worker:/jobs", 1)).await.unwrap();
        queue.queue_message(&work("worker:/jobs", 2)).await.unwrap();
        let item = queue.get_queued_message("worker").await.unwrap().unwrap();

        let marked = queue.mark_queue_message(item, true, None).await.unwrap();

        assert!(marked.body.unwrap().get("reason").is_none());
        assert!(list(&store, "worker", QueueList::InProgress).await.is_empty());
        assert!(list(&store, "worker", QueueList::Incomplete).await.is_empty());
        assert_eq!(list(&store, "worker", QueueList::Received).await.len(), 1);
    }

    // ============================================================
    // TRANSPORT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_broadcast_and_direct_delivery() {
        // ARRANGE
        let store: Arc<dyn Store> = MemoryStore::new();
        let (sender, mut inbox) = mpsc::channel(8);
        let transport = MessageTransport::open(&store, "svc", "inst1", sender)
            .await
            .unwrap();
        let outgoing = Umf::create(&json!({ "to": "svc:/", "frm": "peer:/", "bdy": { "hi": 1 } }));

        // ACT
        let broadcast_receivers =
            publish(store.as_ref(), &keys::broadcast_channel("svc"), &outgoing)
                .await
                .unwrap();
        let direct_receivers = publish(
            store.as_ref(),
            &keys::direct_channel("svc", "inst1"),
            &outgoing,
        )
        .await
        .unwrap();

        // ASSERT
        assert_eq!(broadcast_receivers, 1);
        assert_eq!(direct_receivers, 1);
        for _ in 0..2 {
            let received = inbox.recv().await.unwrap();
            assert_eq!(received.mid, outgoing.mid);
            assert_eq!(received.from.as_deref(), Some("peer:/"));
            assert_eq!(received.body, Some(json!({ "hi": 1 })));
        }

        transport.close().await;
    }

    #[tokio::test]
    async fn test_empty_and_garbage_payloads_are_ignored() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let (sender, mut inbox) = mpsc::channel(8);
        let transport = MessageTransport::open(&store, "svc", "inst1", sender)
            .await
            .unwrap();
        let channel = keys::broadcast_channel("svc");

        store.publish(&channel, "not json").await.unwrap();
        store.publish(&channel, "{}").await.unwrap();
        store.publish(&channel, "null").await.unwrap();
        store
            .publish(&channel, r#"{"to":"svc:/","mid":"m-1"}"#)
            .await
            .unwrap();

        let received = inbox.recv().await.unwrap();
        assert_eq!(received.mid, "m-1");

        transport.close().await;
        assert!(inbox.recv().await.is_none(), "listeners drop their senders on close");
    }

    #[tokio::test]
    async fn test_full_inbox_drops_new_messages() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let (sender, mut inbox) = mpsc::channel(1);
        let transport = MessageTransport::open(&store, "svc", "inst1", sender)
            .await
            .unwrap();
        let channel = keys::direct_channel("svc", "inst1");

        store.publish(&channel, r#"{"to":"svc:/","mid":"first"}"#).await.unwrap();
        store.publish(&channel, r#"{"to":"svc:/","mid":"second"}"#).await.unwrap();
        transport.close().await;

        assert_eq!(inbox.recv().await.unwrap().mid, "first");
        assert!(inbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_quits_only_subscriber_connections() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let (sender, _inbox) = mpsc::channel(8);
        let transport = MessageTransport::open(&store, "svc", "inst1", sender)
            .await
            .unwrap();

        transport.close().await;

        assert!(!store.is_closing());
        assert_eq!(
            store
                .publish(&keys::broadcast_channel("svc"), "{}")
                .await
                .unwrap(),
            0
        );
    }
}
