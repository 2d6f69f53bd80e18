//! 事件到出站消息与存储调用的映射。

use chrono::{DateTime, Utc};
use domain::{
    Event, EventKind, OutboundPayload, RainPayload, SensorEventPayload, Tag, TemperaturePayload,
};
use rain_storage::{EventWriter, StorageError};

/// 事件对应的存储调用。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StorageCall {
    TagValue { tag: Tag, value: i32 },
    TempC(i32),
}

impl StorageCall {
    pub async fn apply(
        self,
        writer: &dyn EventWriter,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        match self {
            StorageCall::TagValue { tag, value } => {
                writer.add_tag_value(tag, value, gateway_ts).await
            }
            StorageCall::TempC(temp_c) => writer.add_temp_c_value(temp_c, gateway_ts).await,
        }
    }
}

/// 一个事件的去向：出站负载 + 存储调用。
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub payload: OutboundPayload,
    pub storage: StorageCall,
}

/// 按事件种类选择去向；未知标签返回 `None`。
pub fn route(event: &Event, rain_mm_per_tip: f64) -> Option<Route> {
    let timestamp = event.timestamp;
    let route = match event.kind {
        EventKind::Rain => Route {
            payload: OutboundPayload::Rain(RainPayload {
                millimeters: rain_mm_per_tip,
                timestamp,
            }),
            storage: StorageCall::TagValue {
                tag: Tag::Rain,
                value: domain::CONSTANT_VALUE,
            },
        },
        EventKind::Temperature { celsius } => Route {
            payload: OutboundPayload::Temperature(TemperaturePayload {
                temp_c: celsius,
                timestamp,
            }),
            storage: StorageCall::TempC(celsius),
        },
        EventKind::SoftReset | EventKind::HardReset | EventKind::Pause | EventKind::Unpause => {
            let tag = event.kind.tag()?;
            let name = event.kind.event_name()?;
            Route {
                payload: OutboundPayload::SensorEvent(SensorEventPayload {
                    tag: Some(tag.code()),
                    value: Some(domain::CONSTANT_VALUE),
                    event: name.to_string(),
                    timestamp,
                }),
                storage: StorageCall::TagValue {
                    tag,
                    value: domain::CONSTANT_VALUE,
                },
            }
        }
        EventKind::Unknown { .. } => return None,
    };
    Some(route)
}
