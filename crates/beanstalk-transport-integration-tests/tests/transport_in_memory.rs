//! Integration tests for the transport over the in-memory queue
//!
//! These tests verify:
//! - Send/get round trips preserve message content and headers
//! - Ack deletes and reject buries the received job
//! - Transports on different tubes are isolated
//! - Malformed payloads are discarded and stay reserved

mod common;

use beanstalk_transport::{
    Envelope, HeaderStamp, InMemoryQueue, PutOptions, QueueClient, Transport,
    TransportMessageIdStamp,
};
use bytes::Bytes;
use common::{in_memory_transport, invoice, tube};

/// Verify a consumer receives what a producer sent, with one id stamp.
#[tokio::test]
async fn test_round_trip_between_producer_and_consumer() {
    let queue = InMemoryQueue::new();
    let mut producer = in_memory_transport(&queue, "billing");
    let mut consumer = in_memory_transport(&queue, "billing");

    let original = Envelope::new(invoice(1))
        .with(HeaderStamp::new("correlation-id", "c-1"))
        .with(HeaderStamp::new("message-type", "invoice.issued"));
    let sent = producer.send(&original).await.unwrap();

    let mut received = consumer.get().await.unwrap();
    assert_eq!(received.len(), 1);
    let received = received.remove(0);

    assert_eq!(received.message(), original.message());
    let headers: Vec<(&str, &str)> = received
        .all::<HeaderStamp>()
        .into_iter()
        .map(|h| (h.name(), h.value()))
        .collect();
    assert_eq!(
        headers,
        vec![("correlation-id", "c-1"), ("message-type", "invoice.issued")]
    );
    assert_eq!(received.all::<TransportMessageIdStamp>().len(), 1);
    assert_eq!(
        received.last::<TransportMessageIdStamp>().unwrap().id(),
        sent.last::<TransportMessageIdStamp>().unwrap().id()
    );
}

/// Verify each get consumes exactly one job.
#[tokio::test]
async fn test_get_consumes_one_job_per_call() {
    let queue = InMemoryQueue::new();
    let mut transport = in_memory_transport(&queue, "billing");

    for number in 1..=3 {
        transport.send(&Envelope::new(invoice(number))).await.unwrap();
    }

    let first = transport.get().await.unwrap();
    assert_eq!(first.len(), 1);
    let stats = queue.stats_tube(&tube("billing"));
    assert_eq!(stats.reserved, 1);
    assert_eq!(stats.ready, 2);
}

/// Verify the full consume cycle leaves only rejected jobs behind.
#[tokio::test]
async fn test_ack_and_reject_cycle() {
    let queue = InMemoryQueue::new();
    let mut producer = in_memory_transport(&queue, "billing");
    let mut consumer = in_memory_transport(&queue, "billing");

    for number in 1..=4 {
        producer.send(&Envelope::new(invoice(number))).await.unwrap();
    }

    let mut rejected = Vec::new();
    while let Some(envelope) = consumer.get().await.unwrap().pop() {
        if envelope.message().amount_cents % 200 == 0 {
            consumer.reject(&envelope).await.unwrap();
            rejected.push(envelope.last::<TransportMessageIdStamp>().unwrap().id());
        } else {
            consumer.ack(&envelope).await.unwrap();
        }
    }

    let stats = queue.stats_tube(&tube("billing"));
    assert_eq!(stats.buried, 2);
    assert_eq!(stats.total(), 2);
    for id in rejected {
        assert!(queue.peek(id).is_some());
    }
}

/// Verify acknowledging the same envelope twice reports the missing job.
#[tokio::test]
async fn test_double_ack_fails() {
    let queue = InMemoryQueue::new();
    let mut transport = in_memory_transport(&queue, "billing");

    transport.send(&Envelope::new(invoice(1))).await.unwrap();
    let envelope = transport.get().await.unwrap().remove(0);

    transport.ack(&envelope).await.unwrap();
    let second = transport.ack(&envelope).await;

    assert!(second.is_err());
    assert!(!second.unwrap_err().is_transient());
}

/// Verify transports bound to different tubes never see each other's jobs.
#[tokio::test]
async fn test_tube_isolation() {
    let queue = InMemoryQueue::new();
    let mut billing = in_memory_transport(&queue, "billing");
    let mut shipping = in_memory_transport(&queue, "shipping");
    let mut default = in_memory_transport(&queue, "default");

    billing.send(&Envelope::new(invoice(1))).await.unwrap();
    shipping.send(&Envelope::new(invoice(2))).await.unwrap();

    let from_default = default.get().await.unwrap();
    let from_shipping = shipping.get().await.unwrap();
    let from_billing = billing.get().await.unwrap();

    assert!(from_default.is_empty());
    assert_eq!(from_shipping[0].message(), &invoice(2));
    assert_eq!(from_billing[0].message(), &invoice(1));
}

/// Verify a malformed job is skipped and a following valid job is delivered.
#[tokio::test]
async fn test_malformed_job_does_not_block_consumer() {
    let queue = InMemoryQueue::new();
    let mut raw = queue.connect();
    raw.use_tube(&tube("billing")).await.unwrap();
    raw.put(Bytes::from_static(b"{\"truncated\":"), &PutOptions::default())
        .await
        .unwrap();

    let mut producer = in_memory_transport(&queue, "billing");
    let mut consumer = in_memory_transport(&queue, "billing");
    producer.send(&Envelope::new(invoice(7))).await.unwrap();

    assert!(consumer.get().await.unwrap().is_empty());
    let next = consumer.get().await.unwrap();

    assert_eq!(next[0].message(), &invoice(7));
    assert_eq!(queue.stats_tube(&tube("billing")).reserved, 2);
}
