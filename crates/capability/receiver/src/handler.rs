//! 按主题分发入站消息。

use crate::ReceiverError;
use domain::{
    Asset, CONSTANT_VALUE, InboundMessage, RainPayload, SensorEventPayload, StatusPayload,
    TemperaturePayload, topics,
};
use rain_storage::EventWriter;
use tracing::debug;

/// 订阅的五个主题，各自对应一个处理分支。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicHandler {
    Rain,
    Temperature,
    GatewayStatus,
    SensorStatus,
    SensorEvent,
}

impl TopicHandler {
    pub const ALL: [TopicHandler; 5] = [
        TopicHandler::Rain,
        TopicHandler::Temperature,
        TopicHandler::GatewayStatus,
        TopicHandler::SensorStatus,
        TopicHandler::SensorEvent,
    ];

    pub fn topic(self) -> &'static str {
        match self {
            TopicHandler::Rain => topics::RAIN_TOPIC,
            TopicHandler::Temperature => topics::TEMPERATURE_TOPIC,
            TopicHandler::GatewayStatus => topics::GATEWAY_STATUS_TOPIC,
            TopicHandler::SensorStatus => topics::SENSOR_STATUS_TOPIC,
            TopicHandler::SensorEvent => topics::SENSOR_EVENT_TOPIC,
        }
    }

    pub fn for_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|handler| handler.topic() == topic)
    }

    /// 解析负载并写入存储。
    pub async fn handle(
        self,
        message: &InboundMessage,
        writer: &dyn EventWriter,
    ) -> Result<(), ReceiverError> {
        match self {
            TopicHandler::Rain => {
                let payload: RainPayload = message.decode()?;
                writer
                    .add_rain_mm_event(payload.millimeters, payload.timestamp)
                    .await?;
            }
            TopicHandler::Temperature => {
                let payload: TemperaturePayload = message.decode()?;
                writer
                    .add_temp_c_value(payload.temp_c, payload.timestamp)
                    .await?;
            }
            TopicHandler::GatewayStatus => {
                store_status(Asset::Gateway, message.decode()?, writer).await?;
            }
            TopicHandler::SensorStatus => {
                store_status(Asset::Sensor, message.decode()?, writer).await?;
            }
            TopicHandler::SensorEvent => {
                let payload: SensorEventPayload = message.decode()?;
                let tag = payload
                    .resolved_tag()
                    .ok_or_else(|| ReceiverError::UnknownEvent(payload.event.clone()))?;
                writer
                    .add_tag_value(
                        tag,
                        payload.value.unwrap_or(CONSTANT_VALUE),
                        payload.timestamp,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

/// 只记录健康心跳。
async fn store_status(
    asset: Asset,
    payload: StatusPayload,
    writer: &dyn EventWriter,
) -> Result<(), ReceiverError> {
    if !payload.ok {
        debug!(target: "rain.receiver", ?asset, "unhealthy_status_skipped");
        return Ok(());
    }
    writer.add_status_update(asset, payload.timestamp).await?;
    Ok(())
}
