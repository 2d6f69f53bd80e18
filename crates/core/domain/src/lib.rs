//! 雨量站遥测链路共享的领域模型。
//!
//! - [`frame`]：串口协议帧与标签
//! - [`event`]：网关解码后的事件、资产
//! - [`payload`]：总线消息负载与出站消息
//! - [`topics`]：总线主题与事件名
//! - [`exit_codes`]：致命错误对应的进程退出码

pub mod event;
pub mod exit_codes;
pub mod frame;
pub mod payload;
pub mod topics;

pub use event::{Asset, Event, EventKind};
pub use frame::{Frame, Tag, CONSTANT_LENGTH, CONSTANT_VALUE, VARIABLE_LENGTH};
pub use payload::{
    InboundMessage, OutboundMessage, OutboundPayload, PayloadError, QosLevel, RainPayload,
    SensorEventPayload, StatusPayload, TemperaturePayload,
};
