//! # PostgreSQL 存储实现模块
//!
//! 云端接收进程使用的事件存储；网关配置了本地数据库时也可用作本地日志。
//!
//! ## 数据库模式
//!
//! 由 [`schema::ensure_schema`] 在连接后创建（`create table if not exists`）：
//!
//! - `tag_names`：标签编码与名称（id, name）
//! - `event_log`：标签事件（tag, value, gw_timestamp, server_timestamp）
//! - `rain`：雨量（amount_mm, gw_timestamp, server_timestamp）
//! - `temperature`：温度（temp_c, gw_timestamp, server_timestamp）
//! - `status_log`：心跳（asset, gw_timestamp, server_timestamp）
//!
//! `server_timestamp` 由数据库 `now()` 填充，查询窗口按 `gw_timestamp` 计算。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use rain_storage::{PgEventStore, RetryPolicy, EventReader};
//!
//! let store = PgEventStore::connect(&database_url, RetryPolicy::default()).await?;
//! let total = store.total_rain_mm_since(since).await?;
//! ```

pub mod events;
pub mod schema;

pub use events::*;
pub use schema::ensure_schema;
