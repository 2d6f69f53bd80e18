//! 进程内总线。
//!
//! [`MemoryBroker`] 在内存中按主题精确匹配转发消息，并保留全部已发布消息，
//! 便于测试断言。

use crate::{Bus, BusError};
use async_trait::async_trait;
use domain::{InboundMessage, OutboundMessage, QosLevel};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

const INBOUND_CAPACITY: usize = 64;

struct Client {
    inbound: mpsc::Sender<InboundMessage>,
    topics: HashSet<String>,
}

#[derive(Default)]
struct BrokerState {
    next_id: u64,
    clients: HashMap<u64, Client>,
    published: Vec<OutboundMessage>,
}

/// 内存 broker。
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建一个客户端连接。
    pub fn connect(&self) -> (MemoryBus, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let id = match self.state.lock() {
            Ok(mut state) => {
                state.next_id += 1;
                let id = state.next_id;
                state.clients.insert(
                    id,
                    Client {
                        inbound: tx,
                        topics: HashSet::new(),
                    },
                );
                id
            }
            Err(_) => 0,
        };
        (
            MemoryBus {
                id,
                broker: self.clone(),
                disconnected: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// 已发布消息（按发布顺序）。
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.state
            .lock()
            .map(|state| state.published.clone())
            .unwrap_or_default()
    }

    /// 当前在线客户端订阅的主题总数。
    pub fn subscription_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.clients.values().map(|c| c.topics.len()).sum())
            .unwrap_or(0)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut BrokerState) -> R) -> Result<R, BusError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BusError::Connection("broker lock failed".to_string()))?;
        Ok(f(&mut state))
    }
}

/// 内存总线客户端。
pub struct MemoryBus {
    id: u64,
    broker: MemoryBroker,
    disconnected: AtomicBool,
}

impl MemoryBus {
    fn ensure_connected(&self) -> Result<(), BusError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        Ok(())
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, message: OutboundMessage) -> Result<(), BusError> {
        self.ensure_connected()?;
        let targets = self.broker.with_state(|state| {
            state.published.push(message.clone());
            state
                .clients
                .values()
                .filter(|client| client.topics.contains(&message.topic))
                .map(|client| client.inbound.clone())
                .collect::<Vec<_>>()
        })?;
        for target in targets {
            let inbound = InboundMessage::new(message.topic.clone(), message.payload.clone());
            if target.send(inbound).await.is_err() {
                debug!(target: "rain.bus", topic = %message.topic, "memory_subscriber_gone");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: QosLevel) -> Result<(), BusError> {
        self.ensure_connected()?;
        self.broker.with_state(|state| {
            if let Some(client) = state.clients.get_mut(&self.id) {
                client.topics.insert(topic.to_string());
            }
        })
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
        self.ensure_connected()?;
        self.broker.with_state(|state| {
            if let Some(client) = state.clients.get_mut(&self.id) {
                client.topics.remove(topic);
            }
        })
    }

    async fn disconnect(&self, _quiescence: Duration) -> Result<(), BusError> {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.broker.with_state(|state| {
            state.clients.remove(&self.id);
        })
    }
}
