use chrono::{TimeDelta, Utc};
use domain::{Asset, Tag};
use rain_storage::{EventFilter, EventReader, EventWriter, InMemoryEventStore};
use std::time::Duration;

#[tokio::test]
async fn status_freshness_window() {
    let store = InMemoryEventStore::new();
    let five_minutes_ago = Utc::now() - TimeDelta::minutes(5);
    store
        .add_status_update(Asset::Sensor, five_minutes_ago)
        .await
        .expect("status");

    assert!(store.is_sensor_up(Duration::from_secs(6 * 60)).await.expect("query"));
    assert!(!store.is_sensor_up(Duration::from_secs(4 * 60)).await.expect("query"));
    // 网关没有心跳
    assert!(!store.is_gateway_up(Duration::from_secs(6 * 60)).await.expect("query"));
}

#[tokio::test]
async fn most_recent_status_decides() {
    let store = InMemoryEventStore::new();
    let now = Utc::now();
    store
        .add_status_update(Asset::Gateway, now - TimeDelta::hours(2))
        .await
        .expect("old status");
    store
        .add_status_update(Asset::Gateway, now - TimeDelta::seconds(10))
        .await
        .expect("fresh status");

    assert!(store.is_gateway_up(Duration::from_secs(60)).await.expect("query"));
}

#[tokio::test]
async fn rain_totals_and_ordering() {
    let store = InMemoryEventStore::new();
    let t = Utc::now();
    store
        .add_rain_mm_event(0.2794, t)
        .await
        .expect("rain");
    store
        .add_rain_mm_event(0.2794, t - TimeDelta::seconds(30))
        .await
        .expect("rain");
    store
        .add_rain_mm_event(0.2794, t - TimeDelta::hours(3))
        .await
        .expect("rain");

    let window = store
        .total_rain_mm_from(t - TimeDelta::minutes(1), t + TimeDelta::minutes(1))
        .await
        .expect("total");
    assert!((window - 2.0 * 0.2794).abs() < 1e-9);

    let since = store
        .total_rain_mm_since(t - TimeDelta::days(1))
        .await
        .expect("total");
    assert!((since - 3.0 * 0.2794).abs() < 1e-9);

    let entries = store
        .get_rain_mm_from(t - TimeDelta::minutes(1), t)
        .await
        .expect("entries");
    assert_eq!(entries.len(), 2);
    assert!(entries[0].timestamp < entries[1].timestamp);
    assert_eq!(store.get_last_rain_time().await.expect("last"), Some(t));

    let written = store.last_written_at().expect("server timestamp");
    assert!(written >= t);
}

#[tokio::test]
async fn temperature_latest_and_range() {
    let store = InMemoryEventStore::new();
    let t = Utc::now();
    store
        .add_temp_c_value(-24, t - TimeDelta::minutes(10))
        .await
        .expect("temp");
    store.add_temp_c_value(18, t).await.expect("temp");

    assert_eq!(store.get_last_temp_c().await.expect("last"), Some(18));
    let since = store
        .get_temp_data_c_since(t - TimeDelta::minutes(5))
        .await
        .expect("since");
    assert_eq!(since.len(), 1);
    assert_eq!(since[0].temp_c, 18);
}

#[tokio::test]
async fn event_messages_filter_by_tag() {
    let store = InMemoryEventStore::new();
    let t = Utc::now();
    store.add_tag_value(Tag::Pause, 1, t).await.expect("pause");
    store
        .add_tag_value(Tag::Unpause, 1, t + TimeDelta::seconds(1))
        .await
        .expect("unpause");
    store
        .add_tag_value(Tag::Rain, 1, t + TimeDelta::seconds(2))
        .await
        .expect("rain tally");

    let all = store
        .get_event_messages_since(EventFilter::All, t - TimeDelta::seconds(1))
        .await
        .expect("all");
    assert_eq!(
        all.iter().map(|e| e.tag).collect::<Vec<_>>(),
        vec![Tag::Pause, Tag::Unpause, Tag::Rain]
    );

    let pauses = store
        .get_event_messages_from(EventFilter::Tag(Tag::Pause), t, t + TimeDelta::seconds(5))
        .await
        .expect("pauses");
    assert_eq!(pauses.len(), 1);
    assert_eq!(pauses[0].value, 1);
}

#[tokio::test]
async fn empty_store_returns_empty_results() {
    let store = InMemoryEventStore::new();
    let t = Utc::now();
    assert_eq!(store.total_rain_mm_since(t).await.expect("total"), 0.0);
    assert_eq!(store.get_last_rain_time().await.expect("last"), None);
    assert_eq!(store.get_last_temp_c().await.expect("last"), None);
    assert!(store
        .get_event_messages_since(EventFilter::All, t)
        .await
        .expect("events")
        .is_empty());
}

#[tokio::test]
async fn close_is_idempotent_and_rejects_later_writes() {
    let store = InMemoryEventStore::new();
    EventWriter::close(&store).await.expect("close");
    EventWriter::close(&store).await.expect("close again");
    assert!(store.is_closed());
    assert!(store.add_rain_mm_event(0.2794, Utc::now()).await.is_err());
    assert!(store.insert("delete from rain").await.is_err());
}

#[tokio::test]
async fn raw_statements_are_unsupported_in_memory() {
    let store = InMemoryEventStore::new();
    let err = store
        .insert("insert into rain values (0.2794)")
        .await
        .expect_err("unsupported");
    assert!(err.message().contains("not supported"));
    assert_eq!(store.row_counts(), (0, 0, 0, 0));
}
