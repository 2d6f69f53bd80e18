//! 表结构初始化
//!
//! 只创建缺失的表，不做迁移。

use crate::error::StorageError;
use domain::Tag;
use sqlx::PgPool;

const CREATE_TABLES: [&str; 5] = [
    "create table if not exists tag_names ( \
        id integer primary key, \
        name text not null)",
    "create table if not exists event_log ( \
        id bigserial primary key, \
        tag integer not null references tag_names(id), \
        value integer not null, \
        gw_timestamp timestamptz not null, \
        server_timestamp timestamptz not null default now())",
    "create table if not exists rain ( \
        id bigserial primary key, \
        amount_mm double precision not null, \
        gw_timestamp timestamptz not null, \
        server_timestamp timestamptz not null default now())",
    "create table if not exists temperature ( \
        id bigserial primary key, \
        temp_c integer not null, \
        gw_timestamp timestamptz not null, \
        server_timestamp timestamptz not null default now())",
    "create table if not exists status_log ( \
        id bigserial primary key, \
        asset integer not null, \
        gw_timestamp timestamptz not null, \
        server_timestamp timestamptz not null default now())",
];

/// 创建缺失的表并写入标签名称
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StorageError> {
    for statement in CREATE_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    for tag in Tag::ALL {
        sqlx::query("insert into tag_names (id, name) values ($1, $2) on conflict (id) do nothing")
            .bind(i32::from(tag.code()))
            .bind(tag.to_string())
            .execute(pool)
            .await?;
    }
    Ok(())
}
