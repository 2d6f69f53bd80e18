//! 发布/订阅总线。
//!
//! - [`Bus`]：发布、订阅、退订、带静默期的断开
//! - [`MqttBus`]：基于 rumqttc 的实现
//! - [`MemoryBroker`] / [`MemoryBus`]：进程内实现（接线与测试）
//!
//! 订阅到的消息统一从连接时返回的 `mpsc::Receiver<InboundMessage>` 读出，
//! 按主题分发由上层负责。

mod memory;
mod mqtt;

pub use memory::{MemoryBroker, MemoryBus};
pub use mqtt::{BrokerConfig, MqttBus};

use async_trait::async_trait;
use domain::{OutboundMessage, QosLevel};
use std::time::Duration;

/// 总线错误。
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("broker not reachable within {0:?}")]
    ConnectTimeout(Duration),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("subscribe error: {0}")]
    Subscribe(String),
    #[error("bus disconnected")]
    Disconnected,
}

/// 总线抽象。实现需允许多个任务并发发布。
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<(), BusError>;

    async fn subscribe(&self, topic: &str, qos: QosLevel) -> Result<(), BusError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError>;

    /// 断开连接，最多等待 `quiescence` 让在途消息发出，可重复调用。
    async fn disconnect(&self, quiescence: Duration) -> Result<(), BusError>;
}
