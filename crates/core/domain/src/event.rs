use crate::frame::{Frame, Tag};
use crate::topics;
use chrono::{DateTime, Utc};

/// 网关解码后的事件。
///
/// 时间戳取网关本地时钟（解码时刻）。事件只在串口读取与发布之间流转，
/// 生成出站消息和存储记录后即丢弃。
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

/// 事件种类。
///
/// `Unknown` 保留无法识别的标签，由发布侧记录日志后丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Rain,
    Temperature { celsius: i32 },
    SoftReset,
    HardReset,
    Pause,
    Unpause,
    Unknown { tag: u8, value: i32 },
}

impl Event {
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self { kind, timestamp }
    }

    /// 由协议帧构造事件。
    pub fn from_frame(frame: &Frame, timestamp: DateTime<Utc>) -> Self {
        let kind = match Tag::from_code(frame.tag) {
            Some(Tag::Rain) => EventKind::Rain,
            Some(Tag::Temperature) => EventKind::Temperature {
                celsius: frame.value,
            },
            Some(Tag::SoftReset) => EventKind::SoftReset,
            Some(Tag::HardReset) => EventKind::HardReset,
            Some(Tag::Pause) => EventKind::Pause,
            Some(Tag::Unpause) => EventKind::Unpause,
            None => EventKind::Unknown {
                tag: frame.tag,
                value: frame.value,
            },
        };
        Self { kind, timestamp }
    }
}

impl EventKind {
    /// 协议标签（未知标签返回 None）。
    pub fn tag(&self) -> Option<Tag> {
        match self {
            EventKind::Rain => Some(Tag::Rain),
            EventKind::Temperature { .. } => Some(Tag::Temperature),
            EventKind::SoftReset => Some(Tag::SoftReset),
            EventKind::HardReset => Some(Tag::HardReset),
            EventKind::Pause => Some(Tag::Pause),
            EventKind::Unpause => Some(Tag::Unpause),
            EventKind::Unknown { .. } => None,
        }
    }

    /// 传感器事件（复位/暂停/恢复）的可读名称。
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            EventKind::SoftReset => Some(topics::SENSOR_SOFT_RESET_EVENT),
            EventKind::HardReset => Some(topics::SENSOR_HARD_RESET_EVENT),
            EventKind::Pause => Some(topics::SENSOR_PAUSE_EVENT),
            EventKind::Unpause => Some(topics::SENSOR_UNPAUSE_EVENT),
            _ => None,
        }
    }
}

/// 心跳所描述的资产。
///
/// 数值编码与状态表中的 `asset` 列一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    Sensor,
    Gateway,
}

impl Asset {
    pub fn code(self) -> i32 {
        match self {
            Asset::Sensor => 1,
            Asset::Gateway => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Asset::Sensor),
            2 => Some(Asset::Gateway),
            _ => None,
        }
    }

    /// 该资产心跳使用的主题。
    pub fn status_topic(self) -> &'static str {
        match self {
            Asset::Sensor => topics::SENSOR_STATUS_TOPIC,
            Asset::Gateway => topics::GATEWAY_STATUS_TOPIC,
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Sensor => f.write_str("sensor"),
            Asset::Gateway => f.write_str("gateway"),
        }
    }
}
