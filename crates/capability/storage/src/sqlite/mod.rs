//! # SQLite 存储实现模块
//!
//! 网关默认的本地日志：单文件数据库，进程重启后保留，内存占用不随事件数增长。
//!
//! 表结构与 PostgreSQL 实现一致，时间戳以 UTC 微秒整数存放（`INTEGER`）。
//! 连接池只保留一个连接，写入天然串行；`sqlite::memory:` 因此也能在测试中复用同一个库。

pub mod events;
pub mod schema;

pub use events::*;
pub use schema::ensure_schema;
