//! 致命错误的进程退出码。
//!
//! 仅由二进制入口使用；库代码只返回错误。

/// 等待超时后仍未发现串口设备节点。
pub const SERIAL_PORT_NOT_FOUND: i32 = 1;

/// 在连接超时内无法连上消息总线。
pub const BROKER_CONNECTION: i32 = 2;

/// 重试预算耗尽仍无法连接数据库。
pub const DATABASE_CONNECTION: i32 = 3;

/// 配置非法（环境变量、调度间隔等）。
pub const CONFIGURATION: i32 = 4;
