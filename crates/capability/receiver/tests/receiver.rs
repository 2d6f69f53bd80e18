use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use domain::{OutboundMessage, QosLevel, Tag, topics};
use rain_bus::{Bus, MemoryBroker, MemoryBus};
use rain_receiver::{Receiver, ReceiverConfig};
use rain_storage::{EventFilter, EventReader, InMemoryEventStore};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    broker: MemoryBroker,
    publisher: MemoryBus,
    store: Arc<InMemoryEventStore>,
    receiver: Arc<Receiver>,
}

async fn start() -> Harness {
    let broker = MemoryBroker::new();
    let (publisher, _publisher_rx) = broker.connect();
    let (bus, inbound) = broker.connect();
    let store = Arc::new(InMemoryEventStore::new());
    let config = ReceiverConfig {
        quiescence: Duration::from_millis(200),
        ..ReceiverConfig::default()
    };
    let receiver = Receiver::start(Arc::new(bus), inbound, store.clone(), config)
        .await
        .expect("receiver");
    Harness {
        broker,
        publisher,
        store,
        receiver: Arc::new(receiver),
    }
}

async fn publish(bus: &MemoryBus, topic: &str, payload: serde_json::Value) {
    bus.publish(OutboundMessage {
        topic: topic.to_string(),
        qos: QosLevel::AtLeastOnce,
        retained: false,
        payload: serde_json::to_vec(&payload).expect("json"),
    })
    .await
    .expect("publish");
}

async fn wait_for_rows(store: &InMemoryEventStore, expected: (usize, usize, usize, usize)) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.row_counts() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("rows written in time");
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

#[tokio::test]
async fn subscribes_to_all_five_topics() {
    let harness = start().await;
    assert_eq!(harness.broker.subscription_count(), 5);
    harness.receiver.close().await.expect("close");
    assert_eq!(harness.broker.subscription_count(), 0);
}

#[tokio::test]
async fn rain_round_trip() {
    let harness = start().await;
    let t = Utc::now().trunc_subsecs(3);

    publish(
        &harness.publisher,
        topics::RAIN_TOPIC,
        serde_json::json!({ "Millimeters": 0.2794, "Timestamp": rfc3339(t) }),
    )
    .await;
    wait_for_rows(&harness.store, (1, 0, 0, 0)).await;

    let last = harness
        .store
        .get_last_rain_time()
        .await
        .expect("query")
        .expect("rain recorded");
    assert!((last - t).num_milliseconds().abs() <= 1000);

    let total = harness
        .store
        .total_rain_mm_from(t - ChronoDuration::minutes(1), t + ChronoDuration::minutes(1))
        .await
        .expect("query");
    assert!((total - 0.2794).abs() < 1e-9);

    harness.receiver.close().await.expect("close");
}

#[tokio::test]
async fn dispatches_each_topic_to_its_storage_call() {
    let harness = start().await;
    let t = Utc::now();

    publish(
        &harness.publisher,
        topics::TEMPERATURE_TOPIC,
        serde_json::json!({ "TempC": -24, "Timestamp": rfc3339(t) }),
    )
    .await;
    publish(
        &harness.publisher,
        topics::SENSOR_EVENT_TOPIC,
        serde_json::json!({ "Tag": 2, "Value": 1, "Event": "sensorSoftReset", "Timestamp": rfc3339(t) }),
    )
    .await;
    publish(
        &harness.publisher,
        topics::GATEWAY_STATUS_TOPIC,
        serde_json::json!({ "OK": true, "Timestamp": rfc3339(t) }),
    )
    .await;
    // 不健康的心跳不入库
    publish(
        &harness.publisher,
        topics::SENSOR_STATUS_TOPIC,
        serde_json::json!({ "OK": false, "Timestamp": rfc3339(t) }),
    )
    .await;
    wait_for_rows(&harness.store, (0, 1, 1, 1)).await;

    assert_eq!(harness.store.get_last_temp_c().await.expect("query"), Some(-24));
    assert!(harness.store.is_gateway_up(Duration::from_secs(60)).await.expect("query"));
    assert!(!harness.store.is_sensor_up(Duration::from_secs(60)).await.expect("query"));
    let events = harness
        .store
        .get_event_messages_since(EventFilter::Tag(Tag::SoftReset), t - ChronoDuration::seconds(1))
        .await
        .expect("query");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].value, 1);

    harness.receiver.close().await.expect("close");
}

#[tokio::test]
async fn accepts_legacy_payload_spellings() {
    let harness = start().await;
    let t = Utc::now();

    publish(
        &harness.publisher,
        topics::RAIN_TOPIC,
        serde_json::json!({ "Millimeters": "0.2794", "Timestamp": rfc3339(t) }),
    )
    .await;
    publish(
        &harness.publisher,
        topics::TEMPERATURE_TOPIC,
        serde_json::json!({ "Tempc": 21, "Timestamp": rfc3339(t) }),
    )
    .await;
    publish(
        &harness.publisher,
        topics::SENSOR_EVENT_TOPIC,
        serde_json::json!({ "Status": "sensorPause", "Timestamp": rfc3339(t) }),
    )
    .await;
    wait_for_rows(&harness.store, (1, 1, 1, 0)).await;

    let events = harness
        .store
        .get_event_messages_since(EventFilter::All, t - ChronoDuration::seconds(1))
        .await
        .expect("query");
    assert_eq!(events[0].tag, Tag::Pause);
    assert_eq!(events[0].value, 1);

    harness.receiver.close().await.expect("close");
}

#[tokio::test]
async fn bad_payloads_are_dropped() {
    let harness = start().await;
    let t = Utc::now();

    publish(
        &harness.publisher,
        topics::RAIN_TOPIC,
        serde_json::json!({ "Millimeters": 0.2794, "Timestamp": "yesterday" }),
    )
    .await;
    publish(
        &harness.publisher,
        topics::SENSOR_EVENT_TOPIC,
        serde_json::json!({ "Event": "sensorExplode", "Timestamp": rfc3339(t) }),
    )
    .await;
    harness
        .publisher
        .publish(OutboundMessage {
            topic: topics::TEMPERATURE_TOPIC.to_string(),
            qos: QosLevel::AtLeastOnce,
            retained: false,
            payload: b"not json".to_vec(),
        })
        .await
        .expect("publish");
    // 之后的正常消息照常处理
    publish(
        &harness.publisher,
        topics::RAIN_TOPIC,
        serde_json::json!({ "Millimeters": 0.2794, "Timestamp": rfc3339(t) }),
    )
    .await;
    wait_for_rows(&harness.store, (1, 0, 0, 0)).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.store.row_counts(), (1, 0, 0, 0));

    harness.receiver.close().await.expect("close");
}

#[tokio::test]
async fn concurrent_close_leaves_no_tasks() {
    let baseline = tokio::runtime::Handle::current()
        .metrics()
        .num_alive_tasks();
    let harness = start().await;
    publish(
        &harness.publisher,
        topics::RAIN_TOPIC,
        serde_json::json!({ "Millimeters": 0.2794, "Timestamp": rfc3339(Utc::now()) }),
    )
    .await;

    let closers: Vec<_> = (0..4)
        .map(|_| {
            let receiver = harness.receiver.clone();
            tokio::spawn(async move { receiver.close().await })
        })
        .collect();
    for closer in closers {
        closer.await.expect("join").expect("close");
    }

    assert!(harness.store.is_closed());
    assert_eq!(harness.broker.subscription_count(), 0);

    let metrics = tokio::runtime::Handle::current().metrics();
    tokio::time::timeout(Duration::from_secs(2), async {
        while metrics.num_alive_tasks() > baseline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("background tasks finished");
}
