//! 追踪初始化与链路计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 链路计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub events_published: u64,
    pub publish_failures: u64,
    pub heartbeats: u64,
    pub storage_write_success: u64,
    pub storage_write_failure: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
}

/// 进程级链路计数器。
pub struct TelemetryMetrics {
    frames_decoded: AtomicU64,
    frames_dropped: AtomicU64,
    events_published: AtomicU64,
    publish_failures: AtomicU64,
    heartbeats: AtomicU64,
    storage_write_success: AtomicU64,
    storage_write_failure: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            frames_decoded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            storage_write_success: AtomicU64::new(0),
            storage_write_failure: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            storage_write_success: self.storage_write_success.load(Ordering::Relaxed),
            storage_write_failure: self.storage_write_failure.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录成功解码的帧。
pub fn record_frame_decoded() {
    metrics().frames_decoded.fetch_add(1, Ordering::Relaxed);
}

/// 记录被丢弃的帧（解码失败或未知标签）。
pub fn record_frame_dropped() {
    metrics().frames_dropped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_event_published() {
    metrics().events_published.fetch_add(1, Ordering::Relaxed);
}

pub fn record_publish_failure() {
    metrics().publish_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次心跳（网关 + 传感器两条状态算一次）。
pub fn record_heartbeat() {
    metrics().heartbeats.fetch_add(1, Ordering::Relaxed);
}

pub fn record_storage_write_success() {
    metrics()
        .storage_write_success
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_storage_write_failure() {
    metrics()
        .storage_write_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录接收侧收到的消息。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录接收侧丢弃的消息（负载无法解析）。
pub fn record_message_dropped() {
    metrics().messages_dropped.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic() {
        let before = metrics().snapshot();
        record_frame_decoded();
        record_storage_write_failure();
        let after = metrics().snapshot();
        assert!(after.frames_decoded > before.frames_decoded);
        assert!(after.storage_write_failure > before.storage_write_failure);
    }
}
