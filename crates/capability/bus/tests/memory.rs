use domain::{OutboundMessage, QosLevel, topics};
use rain_bus::{Bus, BusError, MemoryBroker};
use std::time::Duration;

fn message(topic: &str, payload: &str) -> OutboundMessage {
    OutboundMessage {
        topic: topic.to_string(),
        qos: QosLevel::AtLeastOnce,
        retained: false,
        payload: payload.as_bytes().to_vec(),
    }
}

#[tokio::test]
async fn delivers_only_to_subscribed_topics() {
    let broker = MemoryBroker::new();
    let (publisher, _publisher_rx) = broker.connect();
    let (subscriber, mut inbound) = broker.connect();

    subscriber
        .subscribe(topics::RAIN_TOPIC, QosLevel::AtLeastOnce)
        .await
        .expect("subscribe");

    publisher
        .publish(message(topics::TEMPERATURE_TOPIC, "{}"))
        .await
        .expect("publish");
    publisher
        .publish(message(topics::RAIN_TOPIC, "{\"Millimeters\":0.2794}"))
        .await
        .expect("publish");

    let received = inbound.recv().await.expect("message");
    assert_eq!(received.topic, topics::RAIN_TOPIC);
    assert!(inbound.try_recv().is_err());
    assert_eq!(broker.published().len(), 2);
}

#[tokio::test]
async fn unsubscribe_and_disconnect() {
    let broker = MemoryBroker::new();
    let (bus, mut inbound) = broker.connect();
    for topic in topics::ALL_TOPICS {
        bus.subscribe(topic, QosLevel::AtMostOnce).await.expect("subscribe");
    }
    assert_eq!(broker.subscription_count(), 5);

    bus.unsubscribe(topics::RAIN_TOPIC).await.expect("unsubscribe");
    assert_eq!(broker.subscription_count(), 4);

    bus.disconnect(Duration::from_millis(10)).await.expect("disconnect");
    bus.disconnect(Duration::from_millis(10)).await.expect("disconnect again");
    assert_eq!(broker.subscription_count(), 0);
    assert!(inbound.recv().await.is_none());

    let err = bus
        .publish(message(topics::RAIN_TOPIC, "{}"))
        .await
        .expect_err("disconnected");
    assert!(matches!(err, BusError::Disconnected));
}
