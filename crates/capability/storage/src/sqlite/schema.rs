//! SQLite 表结构初始化

use crate::error::StorageError;
use domain::Tag;
use sqlx::SqlitePool;

const CREATE_TABLES: [&str; 6] = [
    "create table if not exists tag_names ( \
        id integer primary key, \
        name text not null)",
    "create table if not exists event_log ( \
        id integer primary key autoincrement, \
        tag integer not null references tag_names(id), \
        value integer not null, \
        gw_timestamp integer not null, \
        server_timestamp integer not null)",
    "create table if not exists rain ( \
        id integer primary key autoincrement, \
        amount_mm real not null, \
        gw_timestamp integer not null, \
        server_timestamp integer not null)",
    "create table if not exists temperature ( \
        id integer primary key autoincrement, \
        temp_c integer not null, \
        gw_timestamp integer not null, \
        server_timestamp integer not null)",
    "create table if not exists status_log ( \
        id integer primary key autoincrement, \
        asset integer not null, \
        gw_timestamp integer not null, \
        server_timestamp integer not null)",
    "create index if not exists idx_event_log_time on event_log(gw_timestamp)",
];

pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    for statement in CREATE_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    for tag in Tag::ALL {
        sqlx::query("insert or ignore into tag_names (id, name) values (?, ?)")
            .bind(i32::from(tag.code()))
            .bind(tag.to_string())
            .execute(pool)
            .await?;
    }
    Ok(())
}
