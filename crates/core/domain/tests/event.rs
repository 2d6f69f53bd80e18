use chrono::Utc;
use domain::{Asset, Event, EventKind, Frame, Tag, topics};

#[test]
fn frames_map_to_event_kinds() {
    let now = Utc::now();
    let temperature = Frame {
        tag: 1,
        length: 4,
        value: -24,
    };
    assert_eq!(
        Event::from_frame(&temperature, now).kind,
        EventKind::Temperature { celsius: -24 }
    );

    for tag in Tag::ALL.into_iter().filter(|tag| *tag != Tag::Temperature) {
        let frame = Frame {
            tag: tag.code(),
            length: 1,
            value: 1,
        };
        assert_eq!(Event::from_frame(&frame, now).kind.tag(), Some(tag));
    }
}

#[test]
fn unknown_tag_is_kept_for_logging() {
    let frame = Frame {
        tag: 9,
        length: 1,
        value: 1,
    };
    let event = Event::from_frame(&frame, Utc::now());
    assert_eq!(event.kind, EventKind::Unknown { tag: 9, value: 1 });
    assert!(event.kind.tag().is_none());
    assert!(event.kind.event_name().is_none());
}

#[test]
fn assets_have_fixed_codes_and_topics() {
    assert_eq!(Asset::Sensor.code(), 1);
    assert_eq!(Asset::Gateway.code(), 2);
    assert_eq!(Asset::from_code(2), Some(Asset::Gateway));
    assert_eq!(Asset::Sensor.status_topic(), topics::SENSOR_STATUS_TOPIC);
    assert_eq!(Asset::Gateway.status_topic(), topics::GATEWAY_STATUS_TOPIC);
}
