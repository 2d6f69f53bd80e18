//! SQLite 事件存储实现

use crate::error::StorageError;
use crate::models::{EventEntry, EventFilter, RainEntry, TemperatureEntry, within_window};
use crate::sqlite::schema::ensure_schema;
use crate::traits::{EventReader, EventWriter};
use chrono::{DateTime, Utc};
use domain::{Asset, Tag};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub struct SqliteEventStore {
    pub pool: SqlitePool,
}

fn micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn timestamp(micros: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StorageError::new(format!("timestamp {micros} out of range")))
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 打开（必要时创建）数据库文件并初始化表结构
    ///
    /// `url` 形如 `sqlite://rain-local.db` 或 `sqlite::memory:`。
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        ensure_schema(&pool).await?;
        info!(target: "rain.storage", url, "sqlite_opened");
        Ok(Self { pool })
    }

    async fn total_rain(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<f64, StorageError> {
        let to = to.map(micros);
        let row = sqlx::query(
            "select coalesce(sum(amount_mm), 0.0) as total \
             from rain \
             where gw_timestamp >= ? \
             and (? is null or gw_timestamp <= ?)",
        )
        .bind(micros(from))
        .bind(to)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("total")?)
    }

    async fn rain_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<RainEntry>, StorageError> {
        let to = to.map(micros);
        let rows = sqlx::query(
            "select gw_timestamp, amount_mm \
             from rain \
             where gw_timestamp >= ? \
             and (? is null or gw_timestamp <= ?) \
             order by gw_timestamp asc",
        )
        .bind(micros(from))
        .bind(to)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(RainEntry {
                timestamp: timestamp(row.try_get("gw_timestamp")?)?,
                millimeters: row.try_get("amount_mm")?,
            });
        }
        Ok(items)
    }

    async fn temperature_between(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TemperatureEntry>, StorageError> {
        let to = to.map(micros);
        let rows = sqlx::query(
            "select gw_timestamp, temp_c \
             from temperature \
             where gw_timestamp >= ? \
             and (? is null or gw_timestamp <= ?) \
             order by gw_timestamp asc",
        )
        .bind(micros(from))
        .bind(to)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(TemperatureEntry {
                timestamp: timestamp(row.try_get("gw_timestamp")?)?,
                temp_c: row.try_get("temp_c")?,
            });
        }
        Ok(items)
    }

    async fn events_between(
        &self,
        filter: EventFilter,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventEntry>, StorageError> {
        let tag = filter.tag_code();
        let to = to.map(micros);
        let rows = sqlx::query(
            "select tag, value, gw_timestamp \
             from event_log \
             where (? is null or tag = ?) \
             and gw_timestamp >= ? \
             and (? is null or gw_timestamp <= ?) \
             order by gw_timestamp asc, id asc",
        )
        .bind(tag)
        .bind(tag)
        .bind(micros(from))
        .bind(to)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let code: i32 = row.try_get("tag")?;
            let tag = Tag::try_from(i64::from(code))
                .map_err(|code| StorageError::new(format!("unknown tag {code} in event_log")))?;
            items.push(EventEntry {
                tag,
                value: row.try_get("value")?,
                timestamp: timestamp(row.try_get("gw_timestamp")?)?,
            });
        }
        Ok(items)
    }

    async fn last_status(&self, asset: Asset) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("select max(gw_timestamp) as last_seen from status_log where asset = ?")
            .bind(asset.code())
            .fetch_one(&self.pool)
            .await?;
        let last: Option<i64> = row.try_get("last_seen")?;
        last.map(timestamp).transpose()
    }
}

#[async_trait::async_trait]
impl EventWriter for SqliteEventStore {
    async fn insert(&self, statement: &str) -> Result<(), StorageError> {
        sqlx::query(statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn add_tag_value(
        &self,
        tag: Tag,
        value: i32,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "insert into event_log (tag, value, gw_timestamp, server_timestamp) \
             values (?, ?, ?, ?)",
        )
        .bind(i32::from(tag.code()))
        .bind(value)
        .bind(micros(gateway_ts))
        .bind(micros(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_temp_c_value(
        &self,
        temp_c: i32,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "insert into temperature (temp_c, gw_timestamp, server_timestamp) values (?, ?, ?)",
        )
        .bind(temp_c)
        .bind(micros(gateway_ts))
        .bind(micros(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_status_update(
        &self,
        asset: Asset,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "insert into status_log (asset, gw_timestamp, server_timestamp) values (?, ?, ?)",
        )
        .bind(asset.code())
        .bind(micros(gateway_ts))
        .bind(micros(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_rain_mm_event(
        &self,
        amount_mm: f64,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "insert into rain (amount_mm, gw_timestamp, server_timestamp) values (?, ?, ?)",
        )
        .bind(amount_mm)
        .bind(micros(gateway_ts))
        .bind(micros(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventReader for SqliteEventStore {
    async fn total_rain_mm_since(&self, since: DateTime<Utc>) -> Result<f64, StorageError> {
        self.total_rain(since, None).await
    }

    async fn total_rain_mm_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, StorageError> {
        self.total_rain(from, Some(to)).await
    }

    async fn get_rain_mm_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RainEntry>, StorageError> {
        self.rain_between(since, None).await
    }

    async fn get_rain_mm_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RainEntry>, StorageError> {
        self.rain_between(from, Some(to)).await
    }

    async fn get_last_rain_time(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("select max(gw_timestamp) as last_rain from rain")
            .fetch_one(&self.pool)
            .await?;
        let last: Option<i64> = row.try_get("last_rain")?;
        last.map(timestamp).transpose()
    }

    async fn get_temp_data_c_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TemperatureEntry>, StorageError> {
        self.temperature_between(since, None).await
    }

    async fn get_temp_data_c_from(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TemperatureEntry>, StorageError> {
        self.temperature_between(from, Some(to)).await
    }

    async fn get_last_temp_c(&self) -> Result<Option<i32>, StorageError> {
        let row = sqlx::query(
            "select temp_c from temperature order by gw_timestamp desc, id desc limit 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("temp_c")?)),
            None => Ok(None),
        }
    }

    async fn is_gateway_up(&self, window: Duration) -> Result<bool, StorageError> {
        Ok(within_window(self.last_status(Asset::Gateway).await?, window))
    }

    async fn is_sensor_up(&self, window: Duration) -> Result<bool, StorageError> {
        Ok(within_window(self.last_status(Asset::Sensor).await?, window))
    }

    async fn get_event_messages_since(
        &self,
        filter: EventFilter,
        since: DateTime<Utc>,
    ) -> Result<Vec<EventEntry>, StorageError> {
        self.events_between(filter, since, None).await
    }

    async fn get_event_messages_from(
        &self,
        filter: EventFilter,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventEntry>, StorageError> {
        self.events_between(filter, from, Some(to)).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}
