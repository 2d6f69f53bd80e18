//! 事件存储内存实现
//!
//! 仅用于网关无本地数据库时的本地日志与测试。

use crate::error::StorageError;
use crate::models::{EventEntry, EventFilter, RainEntry, TemperatureEntry, within_window};
use crate::traits::{EventReader, EventWriter};
use chrono::{DateTime, Utc};
use domain::{Asset, Tag};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 一行记录：取值 + 网关时间戳 + 服务端时间戳。
#[derive(Debug, Clone)]
struct Row<T> {
    value: T,
    gateway_ts: DateTime<Utc>,
    server_ts: DateTime<Utc>,
}

impl<T> Row<T> {
    fn new(value: T, gateway_ts: DateTime<Utc>) -> Self {
        Self {
            value,
            gateway_ts,
            server_ts: Utc::now(),
        }
    }
}

#[derive(Default)]
struct Tables {
    rain: Vec<Row<f64>>,
    temperature: Vec<Row<i32>>,
    events: Vec<Row<(Tag, i32)>>,
    status: Vec<Row<Asset>>,
}

/// 事件内存存储
#[derive(Default)]
pub struct InMemoryEventStore {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

fn in_window(ts: DateTime<Utc>, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> bool {
    ts >= from && to.is_none_or(|to| ts <= to)
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 各表行数（rain, temperature, event_log, status_log），用于测试
    pub fn row_counts(&self) -> (usize, usize, usize, usize) {
        self.tables
            .read()
            .map(|t| (t.rain.len(), t.temperature.len(), t.events.len(), t.status.len()))
            .unwrap_or((0, 0, 0, 0))
    }

    /// 最近一次写入的服务端时间戳
    pub fn last_written_at(&self) -> Option<DateTime<Utc>> {
        let tables = self.tables.read().ok()?;
        let rain = tables.rain.iter().map(|row| row.server_ts);
        let temperature = tables.temperature.iter().map(|row| row.server_ts);
        let events = tables.events.iter().map(|row| row.server_ts);
        let status = tables.status.iter().map(|row| row.server_ts);
        rain.chain(temperature).chain(events).chain(status).max()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.is_closed() {
            return Err(StorageError::closed());
        }
        Ok(())
    }

    fn write<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Tables),
    {
        self.ensure_open()?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        apply(&mut tables);
        Ok(())
    }

    fn read<R, F>(&self, query: F) -> Result<R, StorageError>
    where
        F: FnOnce(&Tables) -> R,
    {
        self.ensure_open()?;
        let tables = self
            .tables
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(query(&tables))
    }

    fn rain_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<RainEntry>, StorageError> {
        self.read(|tables| {
            let mut items: Vec<RainEntry> = tables
                .rain
                .iter()
                .filter(|row| in_window(row.gateway_ts, from, to))
                .map(|row| RainEntry {
                    timestamp: row.gateway_ts,
                    millimeters: row.value,
                })
                .collect();
            items.sort_by_key(|item| item.timestamp);
            items
        })
    }

    fn temperature_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TemperatureEntry>, StorageError> {
        self.read(|tables| {
            let mut items: Vec<TemperatureEntry> = tables
                .temperature
                .iter()
                .filter(|row| in_window(row.gateway_ts, from, to))
                .map(|row| TemperatureEntry {
                    timestamp: row.gateway_ts,
                    temp_c: row.value,
                })
                .collect();
            items.sort_by_key(|item| item.timestamp);
            items
        })
    }

    fn events_between(
        &self,
        filter: EventFilter,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventEntry>, StorageError> {
        self.read(|tables| {
            let mut items: Vec<EventEntry> = tables
                .events
                .iter()
                .filter(|row| filter.matches(row.value.0) && in_window(row.gateway_ts, from, to))
                .map(|row| EventEntry {
                    tag: row.value.0,
                    value: row.value.1,
                    timestamp: row.gateway_ts,
                })
                .collect();
            items.sort_by_key(|item| item.timestamp);
            items
        })
    }

    fn last_status(&self, asset: Asset) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.read(|tables| {
            tables
                .status
                .iter()
                .filter(|row| row.value == asset)
                .map(|row| row.gateway_ts)
                .max()
        })
    }
}

#[async_trait::async_trait]
impl EventWriter for InMemoryEventStore {
    async fn insert(&self, _statement: &str) -> Result<(), StorageError> {
        self.ensure_open()?;
        Err(StorageError::unsupported("raw statement"))
    }

    async fn add_tag_value(
        &self,
        tag: Tag,
        value: i32,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.write(|tables| tables.events.push(Row::new((tag, value), gateway_ts)))
    }

    async fn add_temp_c_value(
        &self,
        temp_c: i32,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.write(|tables| tables.temperature.push(Row::new(temp_c, gateway_ts)))
    }

    async fn add_status_update(
        &self,
        asset: Asset,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.write(|tables| tables.status.push(Row::new(asset, gateway_ts)))
    }

    async fn add_rain_mm_event(
        &self,
        amount_mm: f64,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.write(|tables| tables.rain.push(Row::new(amount_mm, gateway_ts)))
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventReader for InMemoryEventStore {
    async fn total_rain_mm_since(&self, since: DateTime<Utc>) -> Result<f64, StorageError> {
        Ok(self
            .rain_between(since, None)?
            .iter()
            .map(|entry| entry.millimeters)
            .sum())
    }

    async fn total_rain_mm_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, StorageError> {
        Ok(self
            .rain_between(from, Some(to))?
            .iter()
            .map(|entry| entry.millimeters)
            .sum())
    }

    async fn get_rain_mm_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RainEntry>, StorageError> {
        self.rain_between(since, None)
    }

    async fn get_rain_mm_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RainEntry>, StorageError> {
        self.rain_between(from, Some(to))
    }

    async fn get_last_rain_time(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.read(|tables| tables.rain.iter().map(|row| row.gateway_ts).max())
    }

    async fn get_temp_data_c_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TemperatureEntry>, StorageError> {
        self.temperature_between(since, None)
    }

    async fn get_temp_data_c_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TemperatureEntry>, StorageError> {
        self.temperature_between(from, Some(to))
    }

    async fn get_last_temp_c(&self) -> Result<Option<i32>, StorageError> {
        self.read(|tables| {
            tables
                .temperature
                .iter()
                .max_by_key(|row| row.gateway_ts)
                .map(|row| row.value)
        })
    }

    async fn is_gateway_up(&self, window: Duration) -> Result<bool, StorageError> {
        Ok(within_window(self.last_status(Asset::Gateway)?, window))
    }

    async fn is_sensor_up(&self, window: Duration) -> Result<bool, StorageError> {
        Ok(within_window(self.last_status(Asset::Sensor)?, window))
    }

    async fn get_event_messages_since(
        &self,
        filter: EventFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<EventEntry>, StorageError> {
        self.events_between(filter, since, None)
    }

    async fn get_event_messages_from(
        &self,
        filter: EventFilter,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventEntry>, StorageError> {
        self.events_between(filter, from, Some(to))
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
