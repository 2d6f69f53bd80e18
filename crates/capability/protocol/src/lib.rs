//! # 串口协议能力模块
//!
//! - **帧解码**：[`decode`] 把一帧 ASCII 十六进制数据解析为 [`domain::Frame`]
//! - **串口读取**：[`PortReader`] 负责等待设备、读取、解码并转发事件，读失败时重连
//!
//! ## 数据流
//!
//! ```text
//! 传感器 ──串口──▶ PortReader ──decode──▶ Event ──mpsc──▶ Messenger
//! ```

mod codec;
mod error;
mod serial;

pub use codec::decode;
pub use error::{DecodeError, SerialError};
pub use serial::{DeviceHandle, FileDevice, PortReader, PortReaderConfig, PortState, SerialDevice};
