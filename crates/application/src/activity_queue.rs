//! 活动日志异步写入队列
//!
//! 设计要点：
//! 1. 请求线程只做非阻塞入队，不等待持久化
//! 2. 单个后台任务按 FIFO 顺序逐条写入
//! 3. 写入失败时记录错误、等待固定间隔后重试同一条
//! 4. 取消信号只在出队等待和重试等待处生效，退出前写完已入队的日志

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::HttpRequestRecord;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ApplicationError;

/// 日志持久化目标
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ActivityLogSink: Send + Sync {
    async fn persist(&self, record: &HttpRequestRecord) -> Result<(), ApplicationError>;
}

/// 队列配置
#[derive(Debug, Clone)]
pub struct ActivityQueueConfig {
    /// 最大排队条数，超出时丢弃新日志
    pub capacity: usize,
    /// 写入失败后的重试间隔
    pub retry_delay: Duration,
    /// 单条日志的最大写入次数
    pub max_attempts: u32,
}

impl Default for ActivityQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            retry_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
    running: AtomicBool,
}

/// 队列状态信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub failed: u64,
    pub is_running: bool,
}

/// 生产端句柄，可在请求之间廉价克隆
#[derive(Clone)]
pub struct ActivityLogQueue {
    sender: mpsc::Sender<HttpRequestRecord>,
    counters: Arc<QueueCounters>,
    capacity: usize,
}

impl ActivityLogQueue {
    /// 创建队列，返回生产端句柄和尚未启动的消费者
    pub fn channel(config: ActivityQueueConfig) -> (Self, ActivityLogWorker) {
        let capacity = config.capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let counters = Arc::new(QueueCounters::default());
        let queue = Self {
            sender,
            counters: Arc::clone(&counters),
            capacity,
        };
        let worker = ActivityLogWorker {
            receiver,
            counters,
            config,
        };
        (queue, worker)
    }

    /// 非阻塞入队，返回是否成功排队
    pub fn enqueue(&self, record: HttpRequestRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    capacity = self.capacity,
                    path = %record.path,
                    "Activity log queue full, dropped entry"
                );
                false
            }
            Err(TrySendError::Closed(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %record.path, "Activity log worker stopped, entry discarded");
                false
            }
        }
    }

    /// 获取队列状态信息
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            pending: self.capacity - self.sender.capacity(),
            capacity: self.capacity,
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            is_running: self.counters.running.load(Ordering::Relaxed),
        }
    }
}

/// 单消费者后台写入任务
pub struct ActivityLogWorker {
    receiver: mpsc::Receiver<HttpRequestRecord>,
    counters: Arc<QueueCounters>,
    config: ActivityQueueConfig,
}

enum Delivery {
    Done,
    Interrupted(HttpRequestRecord),
}

impl ActivityLogWorker {
    /// 在 tokio 运行时上启动消费循环
    pub fn spawn(
        self,
        sink: Arc<dyn ActivityLogSink>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(sink, cancel))
    }

    pub async fn run(mut self, sink: Arc<dyn ActivityLogSink>, cancel: CancellationToken) {
        self.counters.running.store(true, Ordering::Relaxed);
        tracing::info!(
            capacity = self.config.capacity,
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            "Activity log worker started"
        );

        let mut interrupted = None;
        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(record) => record,
                    None => break,
                },
            };

            if let Delivery::Interrupted(record) =
                self.deliver(sink.as_ref(), record, &cancel).await
            {
                interrupted = Some(record);
                break;
            }
        }

        self.drain(sink.as_ref(), interrupted).await;
        self.counters.running.store(false, Ordering::Relaxed);
        tracing::info!("Activity log worker stopped");
    }

    /// 写入单条日志，失败时按固定间隔重试
    async fn deliver(
        &self,
        sink: &dyn ActivityLogSink,
        record: HttpRequestRecord,
        cancel: &CancellationToken,
    ) -> Delivery {
        let mut attempt = 1;
        loop {
            match sink.persist(&record).await {
                Ok(()) => {
                    self.counters.persisted.fetch_add(1, Ordering::Relaxed);
                    return Delivery::Done;
                }
                Err(err) if attempt >= self.config.max_attempts => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        error = %err,
                        attempts = attempt,
                        path = %record.path,
                        "Failed to persist activity log, giving up"
                    );
                    return Delivery::Done;
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        attempt,
                        retry_delay_ms = self.config.retry_delay.as_millis() as u64,
                        "Failed to persist activity log, retrying"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Delivery::Interrupted(record),
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
            attempt += 1;
        }
    }

    /// 关闭队列并尝试写入剩余日志，每条只尝试一次
    async fn drain(&mut self, sink: &dyn ActivityLogSink, interrupted: Option<HttpRequestRecord>) {
        self.receiver.close();
        let mut remaining = Vec::new();
        remaining.extend(interrupted);
        while let Ok(record) = self.receiver.try_recv() {
            remaining.push(record);
        }
        if remaining.is_empty() {
            return;
        }

        let total = remaining.len();
        let mut persisted = 0usize;
        for record in remaining {
            match sink.persist(&record).await {
                Ok(()) => {
                    persisted += 1;
                    self.counters.persisted.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %err, path = %record.path, "Failed to flush activity log on shutdown");
                }
            }
        }
        tracing::info!(total, persisted, "Flushed remaining activity logs");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    fn record(path: &str) -> HttpRequestRecord {
        HttpRequestRecord {
            user_id: None,
            username: Some("alice".into()),
            http_method: "GET".into(),
            path: path.into(),
            query_string: None,
            status_code: 200,
            duration_ms: 1,
            ip_address: None,
            user_agent: None,
            occurred_at: Utc::now(),
        }
    }

    /// 记录写入顺序，可配置前若干次调用失败
    #[derive(Default)]
    struct RecordingSink {
        stored: Mutex<Vec<String>>,
        calls: AtomicU64,
        fail_calls: Vec<u64>,
    }

    #[async_trait]
    impl ActivityLogSink for RecordingSink {
        async fn persist(&self, record: &HttpRequestRecord) -> Result<(), ApplicationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_calls.contains(&call) {
                return Err(ApplicationError::infrastructure("store unavailable"));
            }
            self.stored.lock().unwrap().push(record.path.clone());
            Ok(())
        }
    }

    fn config(retry_delay_ms: u64) -> ActivityQueueConfig {
        ActivityQueueConfig {
            capacity: 64,
            retry_delay: Duration::from_millis(retry_delay_ms),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn burst_is_persisted_once_in_order_despite_transient_failure() {
        let (queue, worker) = ActivityLogQueue::channel(config(10));
        let sink = Arc::new(RecordingSink {
            fail_calls: vec![3],
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let handle = worker.spawn(sink.clone(), cancel.clone());

        let expected: Vec<String> = (0..20).map(|i| format!("/api/item/{i}")).collect();
        for path in &expected {
            assert!(queue.enqueue(record(path)));
        }

        for _ in 0..200 {
            if sink.stored.lock().unwrap().len() == expected.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(*sink.stored.lock().unwrap(), expected);
        let status = queue.status();
        assert_eq!(status.persisted, 20);
        assert_eq!(status.failed, 0);
        assert!(!status.is_running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_are_each_persisted_once() {
        let (queue, worker) = ActivityLogQueue::channel(config(5));
        let sink = Arc::new(RecordingSink {
            fail_calls: vec![7],
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let handle = worker.spawn(sink.clone(), cancel.clone());

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        assert!(queue.enqueue(record(&format!("/api/p{producer}/{i}"))));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        for _ in 0..200 {
            if sink.stored.lock().unwrap().len() == 40 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        let stored = sink.stored.lock().unwrap().clone();
        assert_eq!(stored.len(), 40);
        for producer in 0..4 {
            // 同一生产者的记录保持入队顺序
            let prefix = format!("/api/p{producer}/");
            let own: Vec<&String> = stored.iter().filter(|p| p.starts_with(&prefix)).collect();
            let expected: Vec<String> = (0..10).map(|i| format!("{prefix}{i}")).collect();
            assert_eq!(own, expected.iter().collect::<Vec<_>>());
        }
        assert_eq!(queue.status().persisted, 40);
    }

    #[tokio::test]
    async fn entry_is_dropped_after_max_attempts() {
        let (queue, worker) = ActivityLogQueue::channel(config(1));
        let sink = Arc::new(RecordingSink {
            fail_calls: vec![0, 1, 2],
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let handle = worker.spawn(sink.clone(), cancel.clone());

        queue.enqueue(record("/lost"));
        queue.enqueue(record("/kept"));

        for _ in 0..200 {
            if queue.status().persisted == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(*sink.stored.lock().unwrap(), vec!["/kept".to_string()]);
        assert_eq!(queue.status().failed, 1);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (queue, _worker) = ActivityLogQueue::channel(ActivityQueueConfig {
            capacity: 2,
            ..config(1)
        });
        assert!(queue.enqueue(record("/a")));
        assert!(queue.enqueue(record("/b")));
        assert!(!queue.enqueue(record("/c")));

        let status = queue.status();
        assert_eq!(status.pending, 2);
        assert_eq!(status.dropped, 1);
    }

    #[tokio::test]
    async fn cancellation_flushes_already_queued_entries() {
        let (queue, worker) = ActivityLogQueue::channel(config(1));
        let mut sink = MockActivityLogSink::new();
        sink.expect_persist().times(3).returning(|_| Ok(()));

        for path in ["/a", "/b", "/c"] {
            queue.enqueue(record(path));
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        worker.run(Arc::new(sink), cancel).await;

        assert_eq!(queue.status().persisted, 3);
        assert!(!queue.enqueue(record("/late")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_retry_delay() {
        let (queue, worker) = ActivityLogQueue::channel(ActivityQueueConfig {
            capacity: 4,
            retry_delay: Duration::from_secs(3600),
            max_attempts: 10,
        });
        let sink = Arc::new(RecordingSink {
            fail_calls: vec![0],
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let handle = worker.spawn(sink.clone(), cancel.clone());
        queue.enqueue(record("/retry"));

        while sink.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(*sink.stored.lock().unwrap(), vec!["/retry".to_string()]);
    }
}
