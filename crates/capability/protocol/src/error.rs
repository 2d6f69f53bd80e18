//! 协议错误类型定义

use std::time::Duration;

/// 帧解码错误（数据错误，调用方记录后丢弃该帧）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// 字节数不足以容纳帧头或取值
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    /// 非 `0`-`9`/`A`-`F` 的字节
    #[error("invalid hex digit 0x{byte:02x} at offset {offset}")]
    InvalidDigit { byte: u8, offset: usize },

    /// 长度字段既不是 1 也不是 4
    #[error("unsupported frame length {0}")]
    UnsupportedLength(u8),
}

/// 串口读取错误
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    /// 等待超时后设备节点仍不存在（致命）
    #[error("device {path} not found after {timeout:?}")]
    DeviceNotFound { path: String, timeout: Duration },

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 读取器已停止
    #[error("port reader stopped")]
    Stopped,
}
