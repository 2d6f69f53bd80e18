//! # 雨量站存储模块
//!
//! 发布侧与接收侧共用的存储抽象层。
//!
//! 1. **接口抽象层** (`traits.rs`)：`EventWriter`（写）与 `EventReader`（查询）
//! 2. **数据模型层** (`models.rs`)：查询结果与事件过滤
//! 3. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 4. **连接管理层** (`connection.rs`)：连接池与有界重试
//! 5. **实现层**：
//!    - `in_memory/`：内存实现（网关本地日志、测试）
//!    - `postgres/`：PostgreSQL 实现（云端入库）
//!    - `sqlite/`：SQLite 实现（网关默认本地日志）
//!
//! 写入失败只返回错误，不重试也不排队；调用方记录日志后继续。

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod sqlite;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use models::*;
pub use traits::*;

pub use in_memory::InMemoryEventStore;
pub use postgres::PgEventStore;
pub use sqlite::SqliteEventStore;
