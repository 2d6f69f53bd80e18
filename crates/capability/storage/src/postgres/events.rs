//! Postgres 事件存储实现

use crate::connection::{RetryPolicy, connect_pool_with_retry};
use crate::error::StorageError;
use crate::models::{EventEntry, EventFilter, RainEntry, TemperatureEntry, within_window};
use crate::postgres::schema::ensure_schema;
use crate::traits::{EventReader, EventWriter};
use chrono::{DateTime, Utc};
use domain::{Asset, Tag};
use sqlx::{PgPool, Row};
use std::time::Duration;

pub struct PgEventStore {
    pub pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 带重试地连接并初始化表结构
    pub async fn connect(database_url: &str, policy: RetryPolicy) -> Result<Self, StorageError> {
        let pool = connect_pool_with_retry(database_url, policy).await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn total_rain(
        &self,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<f64, StorageError> {
        let row = sqlx::query(
            "select coalesce(sum(amount_mm), 0)::double precision as total \
             from rain \
             where gw_timestamp >= $1 \
             and ($2::timestamptz is null or gw_timestamp <= $2)",
        )
        .bind(from)
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
        let rows = sqlx::query(
            "select gw_timestamp, amount_mm \
             from rain \
             where gw_timestamp >= $1 \
             and ($2::timestamptz is null or gw_timestamp <= $2) \
             order by gw_timestamp asc",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(RainEntry {
                timestamp: row.try_get("gw_timestamp")?,
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
        let rows = sqlx::query(
            "select gw_timestamp, temp_c \
             from temperature \
             where gw_timestamp >= $1 \
             and ($2::timestamptz is null or gw_timestamp <= $2) \
             order by gw_timestamp asc",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(TemperatureEntry {
                timestamp: row.try_get("gw_timestamp")?,
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
        let rows = sqlx::query(
            "select tag, value, gw_timestamp \
             from event_log \
             where ($1::integer is null or tag = $1) \
             and gw_timestamp >= $2 \
             and ($3::timestamptz is null or gw_timestamp <= $3) \
             order by gw_timestamp asc",
        )
        .bind(filter.tag_code())
        .bind(from)
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
                timestamp: row.try_get("gw_timestamp")?,
            });
        }
        Ok(items)
    }

    async fn last_status(&self, asset: Asset) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("select max(gw_timestamp) as last_seen from status_log where asset = $1")
            .bind(asset.code())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("last_seen")?)
    }
}

#[async_trait::async_trait]
impl EventWriter for PgEventStore {
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
        sqlx::query("insert into event_log (tag, value, gw_timestamp) values ($1, $2, $3)")
            .bind(i32::from(tag.code()))
            .bind(value)
            .bind(gateway_ts)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_temp_c_value(
        &self,
        temp_c: i32,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("insert into temperature (temp_c, gw_timestamp) values ($1, $2)")
            .bind(temp_c)
            .bind(gateway_ts)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_status_update(
        &self,
        asset: Asset,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("insert into status_log (asset, gw_timestamp) values ($1, $2)")
            .bind(asset.code())
            .bind(gateway_ts)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_rain_mm_event(
        &self,
        amount_mm: f64,
        gateway_ts: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("insert into rain (amount_mm, gw_timestamp) values ($1, $2)")
            .bind(amount_mm)
            .bind(gateway_ts)
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
impl EventReader for PgEventStore {
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
        Ok(row.try_get("last_rain")?)
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
        let row = sqlx::query("select temp_c from temperature order by gw_timestamp desc limit 1")
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
