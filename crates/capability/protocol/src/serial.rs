//! 串口读取状态机
//!
//! ```text
//! WaitingForDevice → Open → (Reading ⇄ Reconnecting) → Closed
//! ```
//!
//! - 设备节点在超时内未出现：返回 [`SerialError::DeviceNotFound`]（致命）
//! - 解码失败：记录日志并丢弃该帧，不重连
//! - 读取失败：等待设备重新出现后重新打开，成功后继续读取
//! - [`PortReader::stop`]：当前读取结束后退出并关闭句柄
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let reader = PortReader::new(Arc::new(FileDevice::new("/dev/ttyACM0")), config);
//! reader.open().await?;
//! reader.run(events_tx).await?;
//! ```

use crate::codec;
use crate::error::SerialError;
use async_trait::async_trait;
use domain::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 已打开的设备句柄。
pub type DeviceHandle = Box<dyn AsyncRead + Send + Unpin>;

/// 串口设备抽象。
#[async_trait]
pub trait SerialDevice: Send + Sync {
    /// 设备路径（用于日志）。
    fn path(&self) -> &str;

    /// 设备节点当前是否存在。
    async fn exists(&self) -> bool;

    async fn open(&self) -> std::io::Result<DeviceHandle>;
}

/// 以文件方式打开的串口设备（如 `/dev/ttyACM0`）。
#[derive(Debug, Clone)]
pub struct FileDevice {
    path: String,
}

impl FileDevice {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SerialDevice for FileDevice {
    fn path(&self) -> &str {
        &self.path
    }

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn open(&self) -> std::io::Result<DeviceHandle> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

/// 串口读取配置
#[derive(Debug, Clone)]
pub struct PortReaderConfig {
    /// 单次读取的最大字节数
    pub max_packet_len: usize,
    /// 等待设备节点出现的超时
    pub device_timeout: Duration,
    /// 检查设备节点是否存在的间隔
    pub poll_interval: Duration,
}

impl Default for PortReaderConfig {
    fn default() -> Self {
        Self {
            max_packet_len: 7,
            device_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// 读取器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    WaitingForDevice,
    Open,
    Reading,
    Reconnecting,
    Closed,
}

/// 串口读取器
///
/// 句柄由互斥锁保护，重连时替换句柄不会与读取并发。
pub struct PortReader {
    device: Arc<dyn SerialDevice>,
    config: PortReaderConfig,
    handle: Mutex<Option<DeviceHandle>>,
    state: watch::Sender<PortState>,
    stop: watch::Sender<bool>,
}

enum ReadOutcome {
    Data(usize),
    Failed(std::io::Error),
    Stopped,
}

impl PortReader {
    pub fn new(device: Arc<dyn SerialDevice>, config: PortReaderConfig) -> Self {
        let (state, _) = watch::channel(PortState::WaitingForDevice);
        let (stop, _) = watch::channel(false);
        Self {
            device,
            config,
            handle: Mutex::new(None),
            state,
            stop,
        }
    }

    pub fn state(&self) -> PortState {
        *self.state.borrow()
    }

    /// 订阅状态变化（测试与上层观察用）。
    pub fn watch_state(&self) -> watch::Receiver<PortState> {
        self.state.subscribe()
    }

    /// 等待设备出现并打开句柄。
    pub async fn open(&self) -> Result<(), SerialError> {
        self.state.send_replace(PortState::WaitingForDevice);
        if !self.wait_for_device().await? {
            return Err(SerialError::Stopped);
        }
        let handle = self.device.open().await?;
        *self.handle.lock().await = Some(handle);
        self.state.send_replace(PortState::Open);
        info!(target: "rain.serial", path = %self.device.path(), "device_opened");
        Ok(())
    }

    /// 读取循环：按读取顺序把事件送入 `events`。
    ///
    /// 仅在重连等待设备超时时返回错误；停止或下游关闭时正常返回。
    pub async fn run(&self, events: mpsc::Sender<Event>) -> Result<(), SerialError> {
        let result = self.read_loop(&events).await;
        self.close().await;
        result
    }

    /// 请求停止，可重复调用。
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// 停止请求到达时完成。
    async fn stopped(&self) {
        let mut stop = self.stop.subscribe();
        let _ = stop.wait_for(|stopped| *stopped).await;
    }

    async fn read_loop(&self, events: &mpsc::Sender<Event>) -> Result<(), SerialError> {
        let mut buf = vec![0u8; self.config.max_packet_len];

        loop {
            if self.is_stopped() {
                return Ok(());
            }

            match self.read_once(&mut buf).await {
                ReadOutcome::Stopped => return Ok(()),
                ReadOutcome::Data(n) => {
                    let Some(event) = self.decode_packet(&buf[..n]) else {
                        continue;
                    };
                    // 下游队列满时发送会挂起，需同时响应停止请求
                    let delivered = tokio::select! {
                        _ = self.stopped() => return Ok(()),
                        sent = events.send(event) => sent.is_ok(),
                    };
                    if !delivered {
                        info!(target: "rain.serial", "event_queue_closed");
                        return Ok(());
                    }
                }
                ReadOutcome::Failed(err) => {
                    warn!(
                        target: "rain.serial",
                        path = %self.device.path(),
                        error = %err,
                        "device_read_failed"
                    );
                    if !self.reconnect().await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn read_once(&self, buf: &mut [u8]) -> ReadOutcome {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.as_mut() else {
            return ReadOutcome::Failed(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "device handle not open",
            ));
        };
        self.state.send_replace(PortState::Reading);

        // 按行缓冲（canonical 模式）的 tty 每次 read 返回一整行，
        // 这里一次读取即视为一帧；原始模式下的分片读取不做拼接。
        let outcome = tokio::select! {
            _ = self.stopped() => ReadOutcome::Stopped,
            read = handle.read(buf) => match read {
                Ok(0) => ReadOutcome::Failed(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "device returned no data",
                )),
                Ok(n) => ReadOutcome::Data(n),
                Err(err) => ReadOutcome::Failed(err),
            },
        };

        if matches!(outcome, ReadOutcome::Failed(_)) {
            *guard = None;
        }
        outcome
    }

    fn decode_packet(&self, packet: &[u8]) -> Option<Event> {
        match codec::decode(packet) {
            Ok(frame) => {
                rain_telemetry::record_frame_decoded();
                debug!(
                    target: "rain.serial",
                    tag = frame.tag,
                    length = frame.length,
                    value = frame.value,
                    "frame_decoded"
                );
                Some(Event::from_frame(&frame, chrono::Utc::now()))
            }
            Err(err) => {
                rain_telemetry::record_frame_dropped();
                warn!(
                    target: "rain.serial",
                    packet = %String::from_utf8_lossy(packet).trim_end(),
                    error = %err,
                    "frame_decode_failed"
                );
                None
            }
        }
    }

    /// 重连：等待设备后重新打开，打开失败则持续重试。
    ///
    /// 返回 `Ok(false)` 表示期间收到停止请求。
    async fn reconnect(&self) -> Result<bool, SerialError> {
        self.state.send_replace(PortState::Reconnecting);
        loop {
            if !self.wait_for_device().await? {
                return Ok(false);
            }
            match self.device.open().await {
                Ok(handle) => {
                    *self.handle.lock().await = Some(handle);
                    info!(target: "rain.serial", path = %self.device.path(), "device_reopened");
                    return Ok(true);
                }
                Err(err) => {
                    warn!(
                        target: "rain.serial",
                        path = %self.device.path(),
                        error = %err,
                        "device_reopen_failed"
                    );
                    if !self.pause(self.config.poll_interval).await {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// 轮询设备节点直到出现；超时返回错误，收到停止请求返回 `Ok(false)`。
    async fn wait_for_device(&self) -> Result<bool, SerialError> {
        let deadline = Instant::now() + self.config.device_timeout;
        loop {
            if self.is_stopped() {
                return Ok(false);
            }
            if self.device.exists().await {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Err(SerialError::DeviceNotFound {
                    path: self.device.path().to_string(),
                    timeout: self.config.device_timeout,
                });
            }
            debug!(target: "rain.serial", path = %self.device.path(), "waiting_for_device");
            if !self.pause(self.config.poll_interval).await {
                return Ok(false);
            }
        }
    }

    /// 可被停止请求打断的等待，返回 false 表示已停止。
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.stopped() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn close(&self) {
        if self.handle.lock().await.take().is_some() {
            info!(target: "rain.serial", path = %self.device.path(), "device_closed");
        }
        self.state.send_replace(PortState::Closed);
    }
}
