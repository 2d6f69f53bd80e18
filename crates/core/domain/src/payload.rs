//! 总线消息负载。
//!
//! 每条消息是一个扁平 JSON 对象，字段名沿用固件/网关的大驼峰写法，
//! 时间戳为 RFC3339 字符串。

use crate::event::Asset;
use crate::frame::Tag;
use crate::topics;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// 负载编解码错误。
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("encode error: {0}")]
    Encode(serde_json::Error),
    #[error("decode error: {0}")]
    Decode(serde_json::Error),
}

/// 总线服务质量等级。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QosLevel {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QosLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QosLevel::AtMostOnce),
            1 => Ok(QosLevel::AtLeastOnce),
            2 => Ok(QosLevel::ExactlyOnce),
            other => Err(other),
        }
    }
}

/// 雨量事件：每次翻斗一条。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainPayload {
    /// 旧版网关以字符串发送，接收时两种形式都接受。
    #[serde(rename = "Millimeters", deserialize_with = "number_or_string")]
    pub millimeters: f64,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// 温度读数（摄氏度）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePayload {
    #[serde(rename = "TempC", alias = "Tempc")]
    pub temp_c: i32,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// 传感器事件（复位/暂停/恢复）。
///
/// 旧版消息只带 `Status` 名称，没有 `Tag`/`Value`，此时由名称反推标签。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEventPayload {
    #[serde(rename = "Tag", default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<u8>,
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    #[serde(rename = "Event", alias = "Status")]
    pub event: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl SensorEventPayload {
    /// 解析出事件标签：优先使用 `Tag` 字段，否则按事件名匹配。
    pub fn resolved_tag(&self) -> Option<Tag> {
        if let Some(code) = self.tag {
            return Tag::from_code(code);
        }
        match self.event.as_str() {
            topics::SENSOR_SOFT_RESET_EVENT => Some(Tag::SoftReset),
            topics::SENSOR_HARD_RESET_EVENT => Some(Tag::HardReset),
            topics::SENSOR_PAUSE_EVENT => Some(Tag::Pause),
            topics::SENSOR_UNPAUSE_EVENT => Some(Tag::Unpause),
            _ => None,
        }
    }
}

/// 心跳状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(rename = "OK")]
    pub ok: bool,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// 出站负载（封闭集合）。
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Rain(RainPayload),
    Temperature(TemperaturePayload),
    SensorEvent(SensorEventPayload),
    Status(Asset, StatusPayload),
}

impl OutboundPayload {
    pub fn topic(&self) -> &'static str {
        match self {
            OutboundPayload::Rain(_) => topics::RAIN_TOPIC,
            OutboundPayload::Temperature(_) => topics::TEMPERATURE_TOPIC,
            OutboundPayload::SensorEvent(_) => topics::SENSOR_EVENT_TOPIC,
            OutboundPayload::Status(asset, _) => asset.status_topic(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        let encoded = match self {
            OutboundPayload::Rain(p) => serde_json::to_vec(p),
            OutboundPayload::Temperature(p) => serde_json::to_vec(p),
            OutboundPayload::SensorEvent(p) => serde_json::to_vec(p),
            OutboundPayload::Status(_, p) => serde_json::to_vec(p),
        };
        encoded.map_err(PayloadError::Encode)
    }
}

/// 出站消息。构造后不再修改，所有权交给发布调用。
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub qos: QosLevel,
    pub retained: bool,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn new(payload: &OutboundPayload, qos: QosLevel, retained: bool) -> Result<Self, PayloadError> {
        Ok(Self {
            topic: payload.topic().to_string(),
            qos,
            retained,
            payload: payload.encode()?,
        })
    }
}

/// 从总线收到的消息。
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// 将负载解析为指定结构。
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        serde_json::from_slice(&self.payload).map_err(PayloadError::Decode)
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(serde::de::Error::custom),
    }
}
