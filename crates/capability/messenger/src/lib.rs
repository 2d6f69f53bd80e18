//! 发布侧编排。
//!
//! 运行循环在以下三者之间选择（无固定优先级）：
//!
//! - 停止信号：停止心跳、等待在途存储写入、带静默期断开总线后返回
//! - 入站事件：按种类发布到对应主题，并在后台任务中写入本地日志
//! - 心跳：发布网关与传感器状态（QoS 0，不保留）
//!
//! 未知标签的事件记录日志后丢弃，不影响后续事件。

mod route;

pub use route::{route, Route, StorageCall};

use chrono::Utc;
use domain::{Asset, Event, OutboundMessage, OutboundPayload, QosLevel, StatusPayload};
use rain_bus::Bus;
use rain_protocol::SerialDevice;
use rain_scheduler::{ChannelAction, Scheduler, SchedulerError};
use rain_storage::EventWriter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// 发布侧错误。
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("heartbeat scheduler: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("messenger already running")]
    AlreadyRunning,
}

/// 发布侧配置。
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    pub qos: QosLevel,
    pub retained: bool,
    /// 每次翻斗的雨量（毫米）
    pub rain_mm_per_tip: f64,
    pub heartbeat_interval: Duration,
    pub heartbeat_poll: Duration,
    /// 断开总线时允许在途消息发出的时长
    pub quiescence: Duration,
    pub queue_capacity: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            qos: QosLevel::AtLeastOnce,
            retained: false,
            rain_mm_per_tip: 0.2794,
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_poll: Duration::from_millis(500),
            quiescence: Duration::from_secs(1),
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HeartbeatTick;

/// 发布侧编排器。
pub struct Messenger {
    bus: Arc<dyn Bus>,
    writer: Arc<dyn EventWriter>,
    sensor: Arc<dyn SerialDevice>,
    config: MessengerConfig,
    events_tx: mpsc::Sender<Event>,
    events_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    ticks_rx: Mutex<Option<mpsc::Receiver<HeartbeatTick>>>,
    heartbeat: Arc<Scheduler>,
    stop: watch::Sender<bool>,
}

impl Messenger {
    /// `sensor` 仅用于心跳时判断设备节点是否存在。
    pub fn new(
        bus: Arc<dyn Bus>,
        writer: Arc<dyn EventWriter>,
        sensor: Arc<dyn SerialDevice>,
        config: MessengerConfig,
    ) -> Result<Self, MessengerError> {
        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (ticks_tx, ticks_rx) = mpsc::channel(1);
        let heartbeat = Scheduler::new(
            config.heartbeat_interval,
            config.heartbeat_poll,
            Arc::new(ChannelAction::new(ticks_tx, HeartbeatTick)),
        )?;
        let (stop, _) = watch::channel(false);
        Ok(Self {
            bus,
            writer,
            sensor,
            config,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            ticks_rx: Mutex::new(Some(ticks_rx)),
            heartbeat: Arc::new(heartbeat),
            stop,
        })
    }

    /// 入站事件队列的发送端（交给串口读取器）。
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.events_tx.clone()
    }

    /// 请求停止，可重复调用。
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// 停止请求到达时完成。
    async fn stopped(&self) {
        let mut stop = self.stop.subscribe();
        let _ = stop.wait_for(|stopped| *stopped).await;
    }

    /// 运行直到 [`Messenger::stop`]。只能调用一次。
    pub async fn run(&self) -> Result<(), MessengerError> {
        let mut events = self
            .events_rx
            .lock()
            .await
            .take()
            .ok_or(MessengerError::AlreadyRunning)?;
        let mut ticks = self
            .ticks_rx
            .lock()
            .await
            .take()
            .ok_or(MessengerError::AlreadyRunning)?;

        let heartbeat = self.heartbeat.clone();
        let scheduler = tokio::spawn(async move { heartbeat.run().await });
        let mut storage = JoinSet::new();
        info!(target: "rain.messenger", "messenger_started");

        loop {
            tokio::select! {
                _ = self.stopped() => break,
                Some(event) = events.recv() => self.process(event, &mut storage).await,
                Some(HeartbeatTick) = ticks.recv() => self.emit_heartbeat().await,
                Some(joined) = storage.join_next(), if !storage.is_empty() => {
                    if let Err(err) = joined {
                        warn!(target: "rain.messenger", error = %err, "storage_task_failed");
                    }
                }
            }
        }

        self.terminate(scheduler, storage).await;
        Ok(())
    }

    async fn process(&self, event: Event, storage: &mut JoinSet<()>) {
        let Some(route) = route(&event, self.config.rain_mm_per_tip) else {
            rain_telemetry::record_frame_dropped();
            warn!(target: "rain.messenger", kind = ?event.kind, "unknown_tag_dropped");
            return;
        };

        if self.publish(&route.payload, self.config.qos).await {
            rain_telemetry::record_event_published();
        }

        let writer = self.writer.clone();
        let call = route.storage;
        let gateway_ts = event.timestamp;
        storage.spawn(async move {
            match call.apply(writer.as_ref(), gateway_ts).await {
                Ok(()) => rain_telemetry::record_storage_write_success(),
                Err(err) => {
                    rain_telemetry::record_storage_write_failure();
                    warn!(target: "rain.messenger", call = ?call, error = %err, "local_log_write_failed");
                }
            }
        });
    }

    async fn emit_heartbeat(&self) {
        let timestamp = Utc::now();
        let sensor_ok = self.sensor.exists().await;
        for (asset, ok) in [(Asset::Gateway, true), (Asset::Sensor, sensor_ok)] {
            let payload = OutboundPayload::Status(asset, StatusPayload { ok, timestamp });
            self.publish(&payload, QosLevel::AtMostOnce).await;
        }
        rain_telemetry::record_heartbeat();
        debug!(target: "rain.messenger", sensor_ok, "heartbeat_published");
    }

    /// 发布一条负载，返回是否成功交给总线。
    ///
    /// 总线阻塞时停止请求优先，该消息被放弃。
    async fn publish(&self, payload: &OutboundPayload, qos: QosLevel) -> bool {
        let message = match OutboundMessage::new(payload, qos, self.config.retained) {
            Ok(message) => message,
            Err(err) => {
                rain_telemetry::record_publish_failure();
                warn!(target: "rain.messenger", topic = payload.topic(), error = %err, "payload_encode_failed");
                return false;
            }
        };
        let published = tokio::select! {
            _ = self.stopped() => {
                rain_telemetry::record_publish_failure();
                warn!(target: "rain.messenger", topic = payload.topic(), "publish_abandoned_on_stop");
                return false;
            }
            published = self.bus.publish(message) => published,
        };
        match published {
            Ok(()) => true,
            Err(err) => {
                rain_telemetry::record_publish_failure();
                warn!(target: "rain.messenger", topic = payload.topic(), error = %err, "publish_failed");
                false
            }
        }
    }

    async fn terminate(&self, scheduler: tokio::task::JoinHandle<()>, mut storage: JoinSet<()>) {
        self.heartbeat.cancel();
        if let Err(err) = scheduler.await {
            warn!(target: "rain.messenger", error = %err, "heartbeat_join_failed");
        }

        let drained = tokio::time::timeout(self.config.quiescence, async {
            while storage.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(target: "rain.messenger", pending = storage.len(), "local_log_writes_abandoned");
            storage.shutdown().await;
        }

        // 总线自身在 quiescence 内收尾，外层多留一倍作兜底
        match tokio::time::timeout(
            self.config.quiescence * 2,
            self.bus.disconnect(self.config.quiescence),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(target: "rain.messenger", error = %err, "bus_disconnect_failed"),
            Err(_) => warn!(target: "rain.messenger", "bus_disconnect_timed_out"),
        }
        info!(target: "rain.messenger", "messenger_stopped");
    }
}
