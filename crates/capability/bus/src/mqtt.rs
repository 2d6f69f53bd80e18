//! MQTT 总线实现。

use crate::{Bus, BusError};
use async_trait::async_trait;
use domain::{InboundMessage, OutboundMessage, QosLevel};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 连接失败后的重试间隔。
const RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// MQTT 连接配置。
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// client_id 前缀，实际 id 追加随机 UUID
    pub client_prefix: String,
    /// 首次连接的总等待时长
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
    /// 入站消息队列容量
    pub inbound_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_prefix: "rain".to_string(),
            connect_timeout: Duration::from_secs(5),
            keep_alive: Duration::from_secs(30),
            inbound_capacity: 64,
        }
    }
}

type Subscriptions = Arc<Mutex<HashMap<String, QoS>>>;

/// MQTT 总线
///
/// 连接建立后事件循环在后台任务中轮询；断线由 rumqttc 自动重连，
/// 重连成功后重新订阅已登记的主题。
///
/// 发布、退订与断开只向请求队列做非阻塞投递，队列满时返回错误。
pub struct MqttBus {
    client: AsyncClient,
    subscriptions: Subscriptions,
    eventloop: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    disconnected: AtomicBool,
}

impl MqttBus {
    /// 连接 broker，在 `connect_timeout` 内等待 ConnAck。
    pub async fn connect(
        config: BrokerConfig,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), BusError> {
        let client_id = format!("{}-{}", config.client_prefix, uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 10);

        tokio::time::timeout(config.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| BusError::ConnectTimeout(config.connect_timeout))??;
        info!(
            target: "rain.bus",
            host = %config.host,
            port = config.port,
            "mqtt_connected"
        );

        let subscriptions: Subscriptions = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
        let handle = tokio::spawn(poll_loop(
            eventloop,
            client.clone(),
            subscriptions.clone(),
            tx,
        ));

        Ok((
            Self {
                client,
                subscriptions,
                eventloop: tokio::sync::Mutex::new(Some(handle)),
                disconnected: AtomicBool::new(false),
            },
            rx,
        ))
    }

    fn ensure_connected(&self) -> Result<(), BusError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        Ok(())
    }
}

#[async_trait]
impl Bus for MqttBus {
    async fn publish(&self, message: OutboundMessage) -> Result<(), BusError> {
        self.ensure_connected()?;
        // 请求队列满（broker 断开期间）时直接丢弃，不阻塞调用方
        self.client
            .try_publish(
                message.topic,
                qos_from_level(message.qos),
                message.retained,
                message.payload,
            )
            .map_err(|err| BusError::Publish(err.to_string()))
    }

    async fn subscribe(&self, topic: &str, qos: QosLevel) -> Result<(), BusError> {
        self.ensure_connected()?;
        let qos = qos_from_level(qos);
        self.client
            .subscribe(topic, qos)
            .await
            .map_err(|err| BusError::Subscribe(err.to_string()))?;
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.insert(topic.to_string(), qos);
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        self.ensure_connected()?;
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.remove(topic);
        }
        self.client
            .try_unsubscribe(topic)
            .map_err(|err| BusError::Subscribe(err.to_string()))
    }

    async fn disconnect(&self, quiescence: Duration) -> Result<(), BusError> {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let requested = self
            .client
            .try_disconnect()
            .map_err(|err| BusError::Connection(err.to_string()));

        let handle = self.eventloop.lock().await.take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(quiescence, &mut handle).await.is_err() {
                warn!(target: "rain.bus", ?quiescence, "mqtt_quiescence_elapsed");
                handle.abort();
                let _ = handle.await;
            }
        }
        info!(target: "rain.bus", "mqtt_disconnected");
        requested
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), BusError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(BusError::Connection(format!("{:?}", ack.code)));
            }
            Ok(_) => {}
            Err(err) => {
                warn!(target: "rain.bus", error = %err, "mqtt_connect_retry");
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

async fn poll_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Subscriptions,
    inbound: mpsc::Sender<InboundMessage>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                if inbound.send(message).await.is_err() {
                    debug!(target: "rain.bus", "inbound_queue_closed");
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                resubscribe(&client, &subscriptions);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(target: "rain.bus", error = %err, "mqtt_eventloop_error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// 事件循环内不能 await 请求通道，使用 try_subscribe。
fn resubscribe(client: &AsyncClient, subscriptions: &Subscriptions) {
    let topics: Vec<(String, QoS)> = match subscriptions.lock() {
        Ok(subscriptions) => subscriptions
            .iter()
            .map(|(topic, qos)| (topic.clone(), *qos))
            .collect(),
        Err(_) => return,
    };
    for (topic, qos) in topics {
        match client.try_subscribe(topic.clone(), qos) {
            Ok(()) => info!(target: "rain.bus", topic = %topic, "mqtt_resubscribed"),
            Err(err) => warn!(target: "rain.bus", topic = %topic, error = %err, "mqtt_resubscribe_failed"),
        }
    }
}

fn qos_from_level(level: QosLevel) -> QoS {
    match level {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels_map_one_to_one() {
        assert_eq!(qos_from_level(QosLevel::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(qos_from_level(QosLevel::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(QosLevel::ExactlyOnce), QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn connect_to_unreachable_broker_times_out() {
        let config = BrokerConfig {
            // 保留端口，连接立即被拒绝
            port: 1,
            connect_timeout: Duration::from_millis(300),
            ..BrokerConfig::default()
        };
        let result = MqttBus::connect(config).await;
        assert!(matches!(result, Err(BusError::ConnectTimeout(_))));
    }
}
