//! 数据库连接管理
//!
//! 提供数据库连接池初始化功能：
//! - connect_pool：建立 Postgres 连接池
//! - connect_pool_with_retry：固定退避、总时长受限的重试连接
//!
//! 设计原则：
//! - 最大连接数限制为 8
//! - 启动时连接失败超过预算即返回错误，由进程决定退出

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// 连接重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 两次尝试之间的固定间隔
    pub backoff: Duration,
    /// 总预算
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(200),
            timeout: Duration::from_secs(10),
        }
    }
}

/// 建立 Postgres 连接池
///
/// 从数据库 URL 创建连接池，最大连接数限制为 8。
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 在重试预算内建立连接池
///
/// 每次尝试本身也受剩余预算约束，预算耗尽返回最后一次错误。
pub async fn connect_pool_with_retry(
    database_url: &str,
    policy: RetryPolicy,
) -> Result<PgPool, StorageError> {
    let deadline = Instant::now() + policy.timeout;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let last_error = match tokio::time::timeout(remaining, connect_pool(database_url)).await {
            Ok(Ok(pool)) => {
                info!(target: "rain.storage", attempt, "database_connected");
                return Ok(pool);
            }
            Ok(Err(err)) => err,
            Err(_) => StorageError::new("connect attempt timed out"),
        };

        if Instant::now() + policy.backoff >= deadline {
            return Err(StorageError::unreachable(attempt, &last_error));
        }
        warn!(
            target: "rain.storage",
            attempt,
            error = %last_error,
            "database_connect_retry"
        );
        tokio::time::sleep(policy.backoff).await;
    }
}
