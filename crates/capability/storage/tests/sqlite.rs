use chrono::{TimeDelta, Utc};
use domain::{Asset, Tag};
use rain_storage::{EventFilter, EventReader, EventWriter, SqliteEventStore};
use std::path::PathBuf;
use std::time::Duration;

fn db_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("rain-{}-{name}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

async fn memory_store() -> SqliteEventStore {
    SqliteEventStore::connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite")
}

#[tokio::test]
async fn rain_windows_and_last_time() {
    let store = memory_store().await;
    let t = Utc::now();
    for offset in [TimeDelta::zero(), TimeDelta::seconds(30), TimeDelta::hours(3)] {
        store
            .add_rain_mm_event(0.2794, t - offset)
            .await
            .expect("rain");
    }

    let window = store
        .total_rain_mm_from(t - TimeDelta::minutes(1), t + TimeDelta::minutes(1))
        .await
        .expect("total");
    assert!((window - 2.0 * 0.2794).abs() < 1e-9);

    let since = store
        .get_rain_mm_since(t - TimeDelta::hours(4))
        .await
        .expect("entries");
    assert_eq!(since.len(), 3);
    assert!(since.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));

    let last = store.get_last_rain_time().await.expect("last");
    assert_eq!(last.map(|ts| ts.timestamp_micros()), Some(t.timestamp_micros()));
    // 没有数据的窗口合计为 0
    let empty = store
        .total_rain_mm_since(t + TimeDelta::hours(1))
        .await
        .expect("total");
    assert_eq!(empty, 0.0);
}

#[tokio::test]
async fn temperature_and_events_by_tag() {
    let store = memory_store().await;
    let t = Utc::now();
    store
        .add_temp_c_value(18, t - TimeDelta::minutes(2))
        .await
        .expect("temp");
    store.add_temp_c_value(-24, t).await.expect("temp");
    store.add_tag_value(Tag::Rain, 1, t).await.expect("tag");
    store.add_tag_value(Tag::Pause, 1, t).await.expect("tag");
    store
        .add_tag_value(Tag::Temperature, -24, t)
        .await
        .expect("tag");

    assert_eq!(store.get_last_temp_c().await.expect("last"), Some(-24));
    let temps = store
        .get_temp_data_c_since(t - TimeDelta::hours(1))
        .await
        .expect("temps");
    assert_eq!(
        temps.iter().map(|entry| entry.temp_c).collect::<Vec<_>>(),
        vec![18, -24]
    );

    let all = store
        .get_event_messages_since(EventFilter::All, t - TimeDelta::seconds(1))
        .await
        .expect("events");
    assert_eq!(all.len(), 3);
    let pauses = store
        .get_event_messages_from(
            EventFilter::Tag(Tag::Pause),
            t - TimeDelta::seconds(1),
            t + TimeDelta::seconds(1),
        )
        .await
        .expect("events");
    assert_eq!(pauses.len(), 1);
    assert_eq!(pauses[0].tag, Tag::Pause);
}

#[tokio::test]
async fn status_freshness_window() {
    let store = memory_store().await;
    store
        .add_status_update(Asset::Sensor, Utc::now() - TimeDelta::minutes(5))
        .await
        .expect("status");

    assert!(store.is_sensor_up(Duration::from_secs(6 * 60)).await.expect("query"));
    assert!(!store.is_sensor_up(Duration::from_secs(4 * 60)).await.expect("query"));
    assert!(!store.is_gateway_up(Duration::from_secs(6 * 60)).await.expect("query"));
}

#[tokio::test]
async fn log_survives_reopen_and_rejects_writes_after_close() {
    let path = db_path("reopen");
    let url = format!("sqlite://{}", path.display());
    let t = Utc::now();

    let store = SqliteEventStore::connect(&url).await.expect("create");
    store.add_rain_mm_event(0.2794, t).await.expect("rain");
    store.add_tag_value(Tag::Rain, 1, t).await.expect("tag");
    EventWriter::close(&store).await.expect("close");
    assert!(store.add_tag_value(Tag::Rain, 1, t).await.is_err());

    let reopened = SqliteEventStore::connect(&url).await.expect("reopen");
    let total = reopened
        .total_rain_mm_since(t - TimeDelta::seconds(1))
        .await
        .expect("total");
    assert!((total - 0.2794).abs() < 1e-9);
    EventReader::close(&reopened).await.expect("close");
    let _ = std::fs::remove_file(&path);
}
