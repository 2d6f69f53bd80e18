//! 存储接口 Trait 定义
//!
//! - EventWriter：发布侧（本地日志）与接收侧（云端入库）共用的写接口
//! - EventReader：查询层使用的读接口
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发
//! - 实现需可被多个任务并发调用

use crate::error::StorageError;
use crate::models::{EventEntry, EventFilter, RainEntry, TemperatureEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Asset, Tag};
use std::time::Duration;

/// 写接口
#[async_trait]
pub trait EventWriter: Send + Sync {
    /// 执行一条原始语句
    async fn insert(&self, statement: &str) -> Result<(), StorageError>;

    /// 记录一次标签事件
    async fn add_tag_value(
        &self,
        tag: Tag,
        value: i32,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// 记录温度读数
    async fn add_temp_c_value(
        &self,
        temp_c: i32,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// 记录资产心跳
    async fn add_status_update(
        &self,
        asset: Asset,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// 记录雨量（毫米）
    async fn add_rain_mm_event(
        &self,
        amount_mm: f64,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// 释放连接，可重复调用
    async fn close(&self) -> Result<(), StorageError>;
}

/// 读接口
///
/// `*_since` 查询 `since` 之后的全部记录，`*_from` 查询闭区间 `[from, to]`。
/// 列表结果按时间升序。
#[async_trait]
pub trait EventReader: Send + Sync {
    async fn total_rain_mm_since(&self, since: DateTime<Utc>) -> Result<f64, StorageError>;

    async fn total_rain_mm_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, StorageError>;

    async fn get_rain_mm_since(&self, since: DateTime<Utc>)
    -> Result<Vec<RainEntry>, StorageError>;

    async fn get_rain_mm_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RainEntry>, StorageError>;

    async fn get_last_rain_time(&self) -> Result<Option<DateTime<Utc>>, StorageError>;

    async fn get_temp_data_c_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TemperatureEntry>, StorageError>;

    async fn get_temp_data_c_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TemperatureEntry>, StorageError>;

    async fn get_last_temp_c(&self) -> Result<Option<i32>, StorageError>;

    /// 最近一次网关心跳是否在 `window` 内
    async fn is_gateway_up(&self, window: Duration) -> Result<bool, StorageError>;

    /// 最近一次传感器心跳是否在 `window` 内
    async fn is_sensor_up(&self, window: Duration) -> Result<bool, StorageError>;

    async fn get_event_messages_since(
        &self,
        filter: EventFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<EventEntry>, StorageError>;

    async fn get_event_messages_from(
        &self,
        filter: EventFilter,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventEntry>, StorageError>;

    /// 释放连接，可重复调用
    async fn close(&self) -> Result<(), StorageError>;
}
