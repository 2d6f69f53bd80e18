//! 边缘网关：串口 → 解码 → 发布到 MQTT，同时写入本地日志。
//!
//! 致命错误映射到 `domain::exit_codes` 中的退出码。

use domain::exit_codes;
use rain_bus::{BrokerConfig, BusError, MqttBus};
use rain_config::{ConfigError, GatewayConfig};
use rain_messenger::{Messenger, MessengerConfig, MessengerError};
use rain_protocol::{FileDevice, PortReader, PortReaderConfig, SerialError};
use rain_storage::{
    EventWriter, InMemoryEventStore, PgEventStore, RetryPolicy, SqliteEventStore, StorageError,
};
use rain_telemetry::init_tracing;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
enum GatewayError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("serial device: {0}")]
    Device(#[from] SerialError),
    #[error("broker: {0}")]
    Broker(#[from] BusError),
    #[error("local database: {0}")]
    Database(#[from] StorageError),
    #[error("messenger: {0}")]
    Messenger(#[from] MessengerError),
}

impl GatewayError {
    fn exit_code(&self) -> i32 {
        match self {
            GatewayError::Config(_) | GatewayError::Messenger(_) => exit_codes::CONFIGURATION,
            GatewayError::Device(_) => exit_codes::SERIAL_PORT_NOT_FOUND,
            GatewayError::Broker(_) => exit_codes::BROKER_CONNECTION,
            GatewayError::Database(_) => exit_codes::DATABASE_CONNECTION,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            error!(target: "rain.gateway", error = %err, code, "gateway_failed");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run() -> Result<(), GatewayError> {
    let config = GatewayConfig::from_env()?;

    let writer = open_local_log(&config.local_database_url, retry_policy(&config)).await?;

    let device = Arc::new(FileDevice::new(config.device_path.clone()));
    let reader = Arc::new(PortReader::new(device.clone(), port_reader_config(&config)));
    reader.open().await?;

    let (bus, _inbound) = MqttBus::connect(broker_config(&config)).await?;
    let messenger = Arc::new(Messenger::new(
        Arc::new(bus),
        writer.clone(),
        device,
        messenger_config(&config),
    )?);

    let mut messenger_task = tokio::spawn({
        let messenger = messenger.clone();
        async move { messenger.run().await }
    });
    let mut reader_task = tokio::spawn({
        let reader = reader.clone();
        let events = messenger.sender();
        async move { reader.run(events).await }
    });
    info!(target: "rain.gateway", path = %config.device_path, "gateway_started");

    let mut outcome = Ok(());
    let mut reader_done = false;
    tokio::select! {
        _ = shutdown_signal() => info!(target: "rain.gateway", "shutdown_signal_received"),
        _ = run_deadline(config.run_duration) => info!(target: "rain.gateway", "run_duration_elapsed"),
        joined = &mut reader_task => {
            reader_done = true;
            outcome = flatten(joined);
        }
        joined = &mut messenger_task => {
            warn!(target: "rain.gateway", "messenger_exited");
            if let Ok(Err(err)) = joined {
                outcome = Err(err.into());
            }
        }
    }

    reader.stop();
    messenger.stop();
    if !reader_done {
        if let Err(err) = flatten(reader_task.await) {
            warn!(target: "rain.gateway", error = %err, "reader_stop_failed");
        }
    }
    if !messenger_task.is_finished() {
        let _ = messenger_task.await;
    }
    if let Err(err) = writer.close().await {
        warn!(target: "rain.gateway", error = %err, "local_log_close_failed");
    }
    info!(target: "rain.gateway", "gateway_stopped");
    outcome
}

/// 按 URL 协议选择本地日志：SQLite 文件（默认）、Postgres，或显式的 `memory`。
async fn open_local_log(
    url: &str,
    policy: RetryPolicy,
) -> Result<Arc<dyn EventWriter>, StorageError> {
    if url == "memory" {
        // 只用于调试，重启即丢失且不限容量
        warn!(target: "rain.gateway", "local_log_in_memory");
        return Ok(Arc::new(InMemoryEventStore::new()));
    }
    if url.starts_with("sqlite:") {
        return Ok(Arc::new(SqliteEventStore::connect(url).await?));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return Ok(Arc::new(PgEventStore::connect(url, policy).await?));
    }
    Err(StorageError::new(format!("unsupported local log url: {url}")))
}

fn flatten(
    joined: Result<Result<(), SerialError>, tokio::task::JoinError>,
) -> Result<(), GatewayError> {
    match joined {
        Ok(result) => result.map_err(GatewayError::from),
        Err(err) => {
            warn!(target: "rain.gateway", error = %err, "reader_task_failed");
            Ok(())
        }
    }
}

async fn run_deadline(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "rain.gateway", error = %err, "ctrl_c_listener_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "rain.gateway", error = %err, "sigterm_listener_failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn retry_policy(config: &GatewayConfig) -> RetryPolicy {
    RetryPolicy {
        backoff: config.database_retry.backoff,
        timeout: config.database_retry.timeout,
    }
}

fn port_reader_config(config: &GatewayConfig) -> PortReaderConfig {
    PortReaderConfig {
        max_packet_len: config.packet_length_max,
        device_timeout: config.device_timeout,
        poll_interval: config.device_poll,
    }
}

fn broker_config(config: &GatewayConfig) -> BrokerConfig {
    BrokerConfig {
        host: config.mqtt.host.clone(),
        port: config.mqtt.port,
        username: config.mqtt.username.clone(),
        password: config.mqtt.password.clone(),
        client_prefix: "rain-gateway".to_string(),
        connect_timeout: config.mqtt.connect_timeout,
        ..BrokerConfig::default()
    }
}

fn messenger_config(config: &GatewayConfig) -> MessengerConfig {
    MessengerConfig {
        qos: config.mqtt.qos,
        rain_mm_per_tip: config.rain_mm_per_tip,
        heartbeat_interval: config.heartbeat_interval,
        heartbeat_poll: config.heartbeat_poll,
        quiescence: config.mqtt.quiescence,
        ..MessengerConfig::default()
    }
}
