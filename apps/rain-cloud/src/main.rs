//! 云端接收：订阅 MQTT 遥测并写入 PostgreSQL。

use domain::exit_codes;
use rain_bus::{BrokerConfig, BusError, MqttBus};
use rain_config::{CloudConfig, ConfigError};
use rain_receiver::{Receiver, ReceiverConfig, ReceiverError};
use rain_storage::{PgEventStore, RetryPolicy, StorageError};
use rain_telemetry::init_tracing;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
enum CloudError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("broker: {0}")]
    Broker(#[from] BusError),
    #[error("database: {0}")]
    Database(#[from] StorageError),
}

impl CloudError {
    fn exit_code(&self) -> i32 {
        match self {
            CloudError::Config(_) => exit_codes::CONFIGURATION,
            CloudError::Broker(_) => exit_codes::BROKER_CONNECTION,
            CloudError::Database(_) => exit_codes::DATABASE_CONNECTION,
        }
    }
}

impl From<ReceiverError> for CloudError {
    fn from(err: ReceiverError) -> Self {
        match err {
            ReceiverError::Storage(err) => CloudError::Database(err),
            ReceiverError::Bus(err) => CloudError::Broker(err),
            other => CloudError::Broker(BusError::Connection(other.to_string())),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            error!(target: "rain.cloud", error = %err, code, "cloud_failed");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run() -> Result<(), CloudError> {
    let config = CloudConfig::from_env()?;

    let policy = RetryPolicy {
        backoff: config.database_retry.backoff,
        timeout: config.database_retry.timeout,
    };
    let store = Arc::new(PgEventStore::connect(&config.database_url, policy).await?);

    let broker = BrokerConfig {
        host: config.mqtt.host.clone(),
        port: config.mqtt.port,
        username: config.mqtt.username.clone(),
        password: config.mqtt.password.clone(),
        client_prefix: "rain-cloud".to_string(),
        connect_timeout: config.mqtt.connect_timeout,
        ..BrokerConfig::default()
    };
    let (bus, inbound) = MqttBus::connect(broker).await?;
    let receiver = Receiver::start(
        Arc::new(bus),
        inbound,
        store,
        ReceiverConfig {
            qos: config.mqtt.qos,
            quiescence: config.mqtt.quiescence,
        },
    )
    .await?;
    info!(target: "rain.cloud", "cloud_started");

    shutdown_signal().await;
    info!(target: "rain.cloud", "shutdown_signal_received");
    if let Err(err) = receiver.close().await {
        warn!(target: "rain.cloud", error = %err, "receiver_close_failed");
    }
    let counters = rain_telemetry::metrics().snapshot();
    info!(
        target: "rain.cloud",
        received = counters.messages_received,
        dropped = counters.messages_dropped,
        stored = counters.storage_write_success,
        "cloud_stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "rain.cloud", error = %err, "ctrl_c_listener_failed");
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
                warn!(target: "rain.cloud", error = %err, "sigterm_listener_failed");
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
