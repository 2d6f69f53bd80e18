//! 串口读取 → 发布 → 订阅入库的整条链路，以及三者同时停止。

use async_trait::async_trait;
use rain_bus::MemoryBroker;
use rain_messenger::{Messenger, MessengerConfig};
use rain_protocol::{DeviceHandle, PortReader, PortReaderConfig, PortState, SerialDevice};
use rain_receiver::{Receiver, ReceiverConfig};
use rain_storage::InMemoryEventStore;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

/// 逐行吐出预置帧的串口；读完后阻塞，如同静默的传感器。
struct LineDevice {
    lines: Arc<Mutex<VecDeque<&'static [u8]>>>,
}

impl LineDevice {
    fn new(lines: &[&'static [u8]]) -> Arc<Self> {
        Arc::new(Self {
            lines: Arc::new(Mutex::new(lines.iter().copied().collect())),
        })
    }
}

#[async_trait]
impl SerialDevice for LineDevice {
    fn path(&self) -> &str {
        "/dev/lines"
    }

    async fn exists(&self) -> bool {
        true
    }

    async fn open(&self) -> io::Result<DeviceHandle> {
        Ok(Box::new(LineHandle {
            lines: self.lines.clone(),
        }))
    }
}

struct LineHandle {
    lines: Arc<Mutex<VecDeque<&'static [u8]>>>,
}

impl AsyncRead for LineHandle {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.lines.lock().unwrap().pop_front() {
            Some(line) => {
                buf.put_slice(line);
                Poll::Ready(Ok(()))
            }
            None => Poll::Pending,
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test]
async fn frames_reach_the_cloud_store_and_everything_stops_together() {
    let metrics = tokio::runtime::Handle::current().metrics();
    let baseline = metrics.num_alive_tasks();

    let broker = MemoryBroker::new();
    let cloud_store = Arc::new(InMemoryEventStore::new());
    let (cloud_bus, inbound) = broker.connect();
    let receiver = Arc::new(
        Receiver::start(
            Arc::new(cloud_bus),
            inbound,
            cloud_store.clone(),
            ReceiverConfig {
                quiescence: Duration::from_millis(100),
                ..ReceiverConfig::default()
            },
        )
        .await
        .expect("receiver"),
    );

    let device = LineDevice::new(&[b"01\n", b"140012\n", b"41\n"]);
    let reader = Arc::new(PortReader::new(
        device.clone(),
        PortReaderConfig {
            poll_interval: Duration::from_millis(5),
            ..PortReaderConfig::default()
        },
    ));
    reader.open().await.expect("open");

    let (gateway_bus, _gateway_rx) = broker.connect();
    let local_log = Arc::new(InMemoryEventStore::new());
    let messenger = Arc::new(
        Messenger::new(
            Arc::new(gateway_bus),
            local_log.clone(),
            device,
            MessengerConfig {
                heartbeat_interval: Duration::from_secs(3600),
                quiescence: Duration::from_millis(100),
                ..MessengerConfig::default()
            },
        )
        .expect("messenger"),
    );

    let messenger_task = tokio::spawn({
        let messenger = messenger.clone();
        async move { messenger.run().await }
    });
    let reader_task = tokio::spawn({
        let reader = reader.clone();
        let events = messenger.sender();
        async move { reader.run(events).await }
    });

    // 雨量、温度、暂停各一条
    wait_until(|| cloud_store.row_counts() == (1, 1, 1, 0)).await;
    wait_until(|| local_log.row_counts() == (0, 1, 2, 0)).await;

    let stoppers = vec![
        tokio::spawn({
            let reader = reader.clone();
            async move { reader.stop() }
        }),
        tokio::spawn({
            let messenger = messenger.clone();
            async move { messenger.stop() }
        }),
        tokio::spawn({
            let receiver = receiver.clone();
            async move { receiver.close().await.expect("receiver close") }
        }),
    ];
    for stopper in stoppers {
        tokio::time::timeout(Duration::from_secs(2), stopper)
            .await
            .expect("stopper returns")
            .expect("join");
    }
    tokio::time::timeout(Duration::from_secs(2), reader_task)
        .await
        .expect("reader returns")
        .expect("join")
        .expect("reader");
    tokio::time::timeout(Duration::from_secs(2), messenger_task)
        .await
        .expect("messenger returns")
        .expect("join")
        .expect("messenger");

    assert_eq!(reader.state(), PortState::Closed);
    assert_eq!(broker.subscription_count(), 0);
    wait_until(|| metrics.num_alive_tasks() <= baseline).await;
}
