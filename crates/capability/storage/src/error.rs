//! 存储层错误类型
//!
//! 定义统一的存储错误类型，用于封装底层错误：
//! - SQL 执行错误
//! - 连接错误（含重试预算耗尽）
//! - 存储已关闭

#[derive(Debug)]
pub struct StorageError {
    message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// 存储已关闭后的调用。
    pub fn closed() -> Self {
        Self::new("store closed")
    }

    /// 重试预算耗尽，携带最后一次失败原因。
    pub fn unreachable(attempts: u32, last: &StorageError) -> Self {
        Self::new(format!("database unreachable after {attempts} attempts: {last}"))
    }

    /// 实现不支持的操作。
    pub fn unsupported(operation: &str) -> Self {
        Self::new(format!("{operation} is not supported by this store"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err.to_string())
    }
}
