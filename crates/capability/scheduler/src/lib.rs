//! 周期调度。
//!
//! 检查任务每隔 `poll` 醒来一次，比较距上次触发的时间与 `interval`；
//! 到期后重置参考时间并通知运行循环，运行循环在独立任务中执行动作，
//! 慢动作不会拖延下一次检查。
//!
//! `interval` 为零时不做周期触发，调度器只作为取消点。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 调度配置错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("poll granularity {poll:?} exceeds interval {interval:?}")]
    GranularityExceedsInterval { interval: Duration, poll: Duration },
    #[error("poll granularity must be non-zero when interval is set")]
    ZeroGranularity,
}

/// 到期时执行的动作。
#[async_trait]
pub trait ScheduledAction: Send + Sync {
    async fn fire(&self);
}

/// 到期时向消费者通道发送固定哨兵值。
///
/// 通道已满时跳过本次触发，不阻塞调度。
pub struct ChannelAction<T> {
    tx: mpsc::Sender<T>,
    value: T,
}

impl<T> ChannelAction<T> {
    pub fn new(tx: mpsc::Sender<T>, value: T) -> Self {
        Self { tx, value }
    }
}

#[async_trait]
impl<T> ScheduledAction for ChannelAction<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn fire(&self) {
        if let Err(err) = self.tx.try_send(self.value.clone()) {
            debug!(target: "rain.scheduler", error = %err, "tick_not_delivered");
        }
    }
}

/// 周期调度器。
pub struct Scheduler {
    interval: Duration,
    poll: Duration,
    action: Arc<dyn ScheduledAction>,
    cancel: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        interval: Duration,
        poll: Duration,
        action: Arc<dyn ScheduledAction>,
    ) -> Result<Self, SchedulerError> {
        if !interval.is_zero() {
            if poll.is_zero() {
                return Err(SchedulerError::ZeroGranularity);
            }
            if poll > interval {
                return Err(SchedulerError::GranularityExceedsInterval { interval, poll });
            }
        }
        let (cancel, _) = watch::channel(false);
        Ok(Self {
            interval,
            poll,
            action,
            cancel,
        })
    }

    /// 阻塞直到 [`Scheduler::cancel`]；返回时检查任务与动作任务均已结束。
    pub async fn run(&self) {
        let mut cancel = self.cancel.subscribe();
        if *cancel.borrow_and_update() {
            return;
        }

        let (tick_tx, mut tick_rx) = mpsc::channel::<()>(1);
        let checker = if self.interval.is_zero() {
            drop(tick_tx);
            None
        } else {
            Some(tokio::spawn(check_loop(
                self.interval,
                self.poll,
                tick_tx,
                self.cancel.subscribe(),
            )))
        };

        let mut actions = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.wait_for(|cancelled| *cancelled) => break,
                Some(()) = tick_rx.recv() => {
                    let action = self.action.clone();
                    actions.spawn(async move { action.fire().await });
                }
                Some(joined) = actions.join_next(), if !actions.is_empty() => {
                    if let Err(err) = joined {
                        warn!(target: "rain.scheduler", error = %err, "scheduled_action_failed");
                    }
                }
            }
        }

        if let Some(checker) = checker {
            let _ = checker.await;
        }
        actions.shutdown().await;
        debug!(target: "rain.scheduler", "scheduler_stopped");
    }

    /// 取消调度，可重复调用。
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

async fn check_loop(
    interval: Duration,
    poll: Duration,
    tick: mpsc::Sender<()>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut last_fire = Instant::now();
    loop {
        tokio::select! {
            _ = cancel.wait_for(|cancelled| *cancelled) => return,
            _ = tokio::time::sleep(poll) => {}
        }
        if last_fire.elapsed() >= interval {
            last_fire = Instant::now();
            if tick.try_send(()).is_err() {
                debug!(target: "rain.scheduler", "tick_skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ScheduledAction for Noop {
        async fn fire(&self) {}
    }

    #[test]
    fn rejects_granularity_coarser_than_interval() {
        let err = Scheduler::new(Duration::from_millis(100), Duration::from_millis(200), Arc::new(Noop))
            .err();
        assert_eq!(
            err,
            Some(SchedulerError::GranularityExceedsInterval {
                interval: Duration::from_millis(100),
                poll: Duration::from_millis(200),
            })
        );
    }

    #[test]
    fn zero_interval_skips_granularity_check() {
        assert!(Scheduler::new(Duration::ZERO, Duration::from_secs(5), Arc::new(Noop)).is_ok());
        assert_eq!(
            Scheduler::new(Duration::from_secs(1), Duration::ZERO, Arc::new(Noop)).err(),
            Some(SchedulerError::ZeroGranularity)
        );
    }
}
