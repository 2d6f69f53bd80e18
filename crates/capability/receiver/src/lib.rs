//! 订阅侧编排。
//!
//! 启动时订阅五个主题，分发循环为每条入站消息起一个独立任务：
//! 解析负载后调用对应的存储写接口。解析或写入失败只记录日志并丢弃该消息，
//! 不请求重投，也不影响其他消息。

mod handler;

pub use handler::TopicHandler;

use domain::{InboundMessage, PayloadError, QosLevel};
use rain_bus::{Bus, BusError};
use rain_storage::{EventWriter, StorageError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// 订阅侧错误。
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("bus: {0}")]
    Bus(#[from] BusError),
    #[error("payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("unknown sensor event {0:?}")]
    UnknownEvent(String),
}

/// 订阅侧配置。
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub qos: QosLevel,
    /// 关闭时等待在途处理与总线断开的时长
    pub quiescence: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            qos: QosLevel::AtLeastOnce,
            quiescence: Duration::from_secs(1),
        }
    }
}

/// 订阅侧编排器。
pub struct Receiver {
    bus: Arc<dyn Bus>,
    writer: Arc<dyn EventWriter>,
    config: ReceiverConfig,
    stop: watch::Sender<bool>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Receiver {
    /// 订阅全部主题并开始分发 `inbound` 中的消息。
    pub async fn start(
        bus: Arc<dyn Bus>,
        inbound: mpsc::Receiver<InboundMessage>,
        writer: Arc<dyn EventWriter>,
        config: ReceiverConfig,
    ) -> Result<Self, ReceiverError> {
        for handler in TopicHandler::ALL {
            bus.subscribe(handler.topic(), config.qos).await?;
        }
        info!(target: "rain.receiver", qos = config.qos.as_u8(), "receiver_subscribed");

        let (stop, stop_rx) = watch::channel(false);
        let dispatch = tokio::spawn(dispatch_loop(
            inbound,
            writer.clone(),
            stop_rx,
            config.quiescence,
        ));
        Ok(Self {
            bus,
            writer,
            config,
            stop,
            dispatch: Mutex::new(Some(dispatch)),
            closed: AtomicBool::new(false),
        })
    }

    /// 退订、停止分发、断开总线、释放存储。可重复调用。
    pub async fn close(&self) -> Result<(), ReceiverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for handler in TopicHandler::ALL {
            if let Err(err) = self.bus.unsubscribe(handler.topic()).await {
                warn!(target: "rain.receiver", topic = handler.topic(), error = %err, "unsubscribe_failed");
            }
        }

        self.stop.send_replace(true);
        let dispatch = self.dispatch.lock().await.take();
        if let Some(dispatch) = dispatch {
            if let Err(err) = dispatch.await {
                warn!(target: "rain.receiver", error = %err, "dispatch_join_failed");
            }
        }

        let disconnected = self.bus.disconnect(self.config.quiescence).await;
        let released = self.writer.close().await;
        info!(target: "rain.receiver", "receiver_closed");
        disconnected?;
        released?;
        Ok(())
    }
}

async fn dispatch_loop(
    mut inbound: mpsc::Receiver<InboundMessage>,
    writer: Arc<dyn EventWriter>,
    mut stop: watch::Receiver<bool>,
    quiescence: Duration,
) {
    let mut handlers = JoinSet::new();
    loop {
        tokio::select! {
            _ = async { stop.wait_for(|stopped| *stopped).await.is_ok() } => break,
            message = inbound.recv() => {
                let Some(message) = message else {
                    debug!(target: "rain.receiver", "inbound_closed");
                    break;
                };
                let writer = writer.clone();
                handlers.spawn(async move { handle_message(message, writer.as_ref()).await });
            }
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(err) = joined {
                    warn!(target: "rain.receiver", error = %err, "handler_task_failed");
                }
            }
        }
    }

    let drained = tokio::time::timeout(quiescence, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(target: "rain.receiver", pending = handlers.len(), "handlers_abandoned");
        handlers.shutdown().await;
    }
}

async fn handle_message(message: InboundMessage, writer: &dyn EventWriter) {
    rain_telemetry::record_message_received();
    let Some(handler) = TopicHandler::for_topic(&message.topic) else {
        rain_telemetry::record_message_dropped();
        warn!(target: "rain.receiver", topic = %message.topic, "unexpected_topic");
        return;
    };
    match handler.handle(&message, writer).await {
        Ok(()) => rain_telemetry::record_storage_write_success(),
        Err(ReceiverError::Storage(err)) => {
            rain_telemetry::record_storage_write_failure();
            warn!(target: "rain.receiver", topic = %message.topic, error = %err, "storage_write_failed");
        }
        Err(err) => {
            rain_telemetry::record_message_dropped();
            warn!(target: "rain.receiver", topic = %message.topic, error = %err, "message_dropped");
        }
    }
}
