//! 内存存储实现模块
//!
//! 用于网关未配置本地数据库时的本地日志，以及测试。
//!
//! 包含以下实现：
//! - EventWriter + EventReader: InMemoryEventStore

pub mod events;

pub use events::*;
