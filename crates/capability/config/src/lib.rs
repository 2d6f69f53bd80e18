//! 进程运行配置加载。
//!
//! 所有键都以 `RAIN_` 开头，除数据库地址外均有默认值。
//! 各组件的窄配置（串口、发布侧、订阅侧、MQTT）由二进制从这里组装。

use domain::QosLevel;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// MQTT 连接参数。
#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub quiescence: Duration,
    pub qos: QosLevel,
}

/// 数据库连接重试参数。
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseRetry {
    pub backoff: Duration,
    pub timeout: Duration,
}

/// 网关本地日志的默认位置（工作目录下的 SQLite 文件）。
pub const DEFAULT_LOCAL_DATABASE_URL: &str = "sqlite://rain-local.db";

/// 网关进程配置。
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub device_path: String,
    pub packet_length_max: usize,
    pub device_timeout: Duration,
    pub device_poll: Duration,
    pub mqtt: MqttSettings,
    pub heartbeat_interval: Duration,
    pub heartbeat_poll: Duration,
    pub rain_mm_per_tip: f64,
    /// 本地日志位置：`sqlite://…`（默认）、`postgres://…`，或 `memory` 表示只留在内存
    pub local_database_url: String,
    pub database_retry: DatabaseRetry,
    /// 设置后运行满该时长自动退出
    pub run_duration: Option<Duration>,
}

/// 云端接收进程配置。
#[derive(Debug, Clone, PartialEq)]
pub struct CloudConfig {
    pub mqtt: MqttSettings,
    pub database_url: String,
    pub database_retry: DatabaseRetry,
}

impl GatewayConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars::new(&lookup);
        let device_path = vars
            .optional("RAIN_DEVICE_PATH")
            .unwrap_or_else(|| "/dev/ttyACM0".to_string());
        // 至少要容纳标签与长度两个字节
        let packet_length_max = vars.parsed_with_default("RAIN_PACKET_LENGTH_MAX", 7usize)?;
        if packet_length_max < 2 {
            return Err(ConfigError::Invalid(
                "RAIN_PACKET_LENGTH_MAX".to_string(),
                packet_length_max.to_string(),
            ));
        }
        let rain_mm_per_tip = vars.parsed_with_default("RAIN_RAIN_MM_PER_TIP", 0.2794f64)?;
        if !rain_mm_per_tip.is_finite() || rain_mm_per_tip < 0.0 {
            return Err(ConfigError::Invalid(
                "RAIN_RAIN_MM_PER_TIP".to_string(),
                rain_mm_per_tip.to_string(),
            ));
        }
        let run_duration = vars
            .optional_parsed::<u64>("RAIN_RUN_DURATION_MS")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Self {
            device_path,
            packet_length_max,
            device_timeout: vars.millis_with_default("RAIN_DEVICE_TIMEOUT_MS", 10_000)?,
            device_poll: vars.millis_with_default("RAIN_DEVICE_POLL_MS", 100)?,
            mqtt: MqttSettings::read(&vars)?,
            heartbeat_interval: vars.millis_with_default("RAIN_HEARTBEAT_INTERVAL_MS", 10_000)?,
            heartbeat_poll: vars.millis_with_default("RAIN_HEARTBEAT_POLL_MS", 500)?,
            rain_mm_per_tip,
            local_database_url: vars
                .optional("RAIN_LOCAL_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_LOCAL_DATABASE_URL.to_string()),
            database_retry: DatabaseRetry::read(&vars)?,
            run_duration,
        })
    }
}

impl CloudConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars::new(&lookup);
        let database_url = vars
            .optional("RAIN_DATABASE_URL")
            .ok_or_else(|| ConfigError::Missing("RAIN_DATABASE_URL".to_string()))?;
        Ok(Self {
            mqtt: MqttSettings::read(&vars)?,
            database_url,
            database_retry: DatabaseRetry::read(&vars)?,
        })
    }
}

impl MqttSettings {
    fn read(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let qos = vars.parsed_with_default("RAIN_MQTT_QOS", 1u8)?;
        let qos = QosLevel::try_from(qos)
            .map_err(|raw| ConfigError::Invalid("RAIN_MQTT_QOS".to_string(), raw.to_string()))?;
        Ok(Self {
            host: vars
                .optional("RAIN_MQTT_HOST")
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: vars.parsed_with_default("RAIN_MQTT_PORT", 1883u16)?,
            username: vars.optional("RAIN_MQTT_USERNAME"),
            password: vars.optional("RAIN_MQTT_PASSWORD"),
            connect_timeout: vars.millis_with_default("RAIN_MQTT_CONNECT_TIMEOUT_MS", 5_000)?,
            quiescence: vars.millis_with_default("RAIN_MQTT_QUIESCENCE_MS", 1_000)?,
            qos,
        })
    }
}

impl DatabaseRetry {
    fn read(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            backoff: vars.millis_with_default("RAIN_DATABASE_RETRY_MS", 200)?,
            timeout: vars.millis_with_default("RAIN_DATABASE_TIMEOUT_MS", 10_000)?,
        })
    }
}

/// 键值读取辅助，空字符串视为未设置。
struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> Vars<'a> {
    fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.is_empty())
    }

    fn optional_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
            None => Ok(None),
        }
    }

    fn parsed_with_default<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.optional_parsed(key)?.unwrap_or(default))
    }

    fn millis_with_default(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        self.parsed_with_default(key, default)
            .map(Duration::from_millis)
    }
}
