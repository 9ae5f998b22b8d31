// Start of file: /src/messaging/local.rs

// * In-memory message queue.
// * Each topic is a bounded FIFO; a full topic drops its oldest message.
// * Processing spawns one consumer loop per topic with registered handlers.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    sync::{watch, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::lifecycle::{ComponentType, LifecycleManager};

pub const DEFAULT_MAX_SIZE: usize = 1000;

/// How long a consumer waits for a message before re-checking its status.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Idle,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMessage {
    pub id: String,
    pub topic: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

type MessageHandler = Arc<dyn Fn(LocalMessage) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandlerId(u64);

pub struct LocalQueue {
    max_size: usize,
    queues: Mutex<HashMap<String, VecDeque<LocalMessage>>>,
    handlers: RwLock<HashMap<String, Vec<(MessageHandlerId, MessageHandler)>>>,
    status: watch::Sender<QueueStatus>,
    available: Notify,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for LocalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalQueue")
            .field("max_size", &self.max_size)
            .field("status", &self.status())
            .field("size", &self.size(None))
            .finish()
    }
}

impl Default for LocalQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl LocalQueue {
    /// `max_size` applies per topic and is at least 1.
    pub fn new(max_size: usize) -> Self {
        let (status, _) = watch::channel(QueueStatus::Idle);
        debug!(max_size, "Created local queue");
        Self {
            max_size: max_size.max(1),
            queues: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            status,
            available: Notify::new(),
            consumers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> QueueStatus {
        *self.status.borrow()
    }

    pub fn put(&self, topic: &str, data: Value) -> LocalMessage {
        let message: LocalMessage = LocalMessage {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            data,
            created_at: Utc::now(),
        };

        {
            let mut queues = self.queues.lock();
            let queue: &mut VecDeque<LocalMessage> = queues.entry(topic.to_string()).or_default();
            if queue.len() >= self.max_size {
                if let Some(dropped) = queue.pop_front() {
                    warn!(topic, id = %dropped.id, "Queue full, dropped oldest message");
                }
            }
            queue.push_back(message.clone());
        }

        debug!(topic, id = %message.id, "Message queued");
        self.available.notify_waiters();
        message
    }

    /// Oldest message of `topic`, if any.
    pub fn get(&self, topic: &str) -> Option<LocalMessage> {
        self.queues.lock().get_mut(topic).and_then(VecDeque::pop_front)
    }

    /// Waits for a message on `topic`. `None` timeout waits forever.
    pub async fn get_async(&self, topic: &str, timeout: Option<Duration>) -> Option<LocalMessage> {
        let deadline: Option<tokio::time::Instant> = timeout.map(|limit| tokio::time::Instant::now() + limit);
        loop {
            // registered before the check so a put in between still wakes us
            let notified = self.available.notified();
            if let Some(message) = self.get(topic) {
                return Some(message);
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return None;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Empties one topic, or every topic when `None`.
    pub fn clear(&self, topic: Option<&str>) {
        let mut queues = self.queues.lock();
        match topic {
            Some(topic) => {
                if let Some(queue) = queues.get_mut(topic) {
                    queue.clear();
                }
            }
            None => queues.clear(),
        }
    }

    /// Messages waiting in one topic, or in all topics when `None`.
    pub fn size(&self, topic: Option<&str>) -> usize {
        let queues = self.queues.lock();
        match topic {
            Some(topic) => queues.get(topic).map_or(0, VecDeque::len),
            None => queues.values().map(VecDeque::len).sum(),
        }
    }

    pub fn register_handler<F, Fut>(&self, topic: &str, handler: F) -> MessageHandlerId
    where
        F: Fn(LocalMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id: MessageHandlerId = MessageHandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: MessageHandler = Arc::new(move |message: LocalMessage| -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(handler(message))
        });
        self.handlers.write().entry(topic.to_string()).or_default().push((id, handler));
        debug!(topic, "Registered message handler");
        id
    }

    /// Drops the topic entry once its last handler is gone.
    pub fn unregister_handler(&self, topic: &str, id: MessageHandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(bucket) = handlers.get_mut(topic) else {
            return false;
        };
        let before: usize = bucket.len();
        bucket.retain(|(handler_id, _)| *handler_id != id);
        let removed: bool = bucket.len() != before;
        if bucket.is_empty() {
            handlers.remove(topic);
        }
        removed
    }

    fn handlers_for(&self, topic: &str) -> Vec<MessageHandler> {
        self.handlers
            .read()
            .get(topic)
            .map(|bucket| bucket.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Spawns a consumer per topic that has handlers. Topics registered
    /// later are picked up by the next start.
    pub fn start_processing(self: &Arc<Self>) {
        if self.status() == QueueStatus::Running {
            return;
        }
        self.status.send_replace(QueueStatus::Running);

        let topics: Vec<String> = self.handlers.read().keys().cloned().collect();
        let mut consumers = self.consumers.lock();
        for topic in topics {
            let queue: Arc<LocalQueue> = self.clone();
            consumers.push(tokio::spawn(async move { queue.process_topic(topic).await }));
        }
        info!(consumers = consumers.len(), "Message processing started");
    }

    /// Stops the consumers and waits for in-flight handlers.
    pub async fn stop_processing(&self) {
        if !matches!(self.status(), QueueStatus::Running | QueueStatus::Paused) {
            return;
        }
        self.status.send_replace(QueueStatus::Stopped);

        let consumers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.consumers.lock());
        for result in join_all(consumers).await {
            if let Err(err) = result {
                error!(error = %err, "Queue consumer ended abnormally");
            }
        }
        info!("Message processing stopped");
    }

    pub fn pause(&self) {
        if self.status() == QueueStatus::Running {
            self.status.send_replace(QueueStatus::Paused);
            info!("Message processing paused");
        }
    }

    pub fn resume(&self) {
        if self.status() == QueueStatus::Paused {
            self.status.send_replace(QueueStatus::Running);
            info!("Message processing resumed");
        }
    }

    /// Stops processing with the other background services on shutdown.
    pub fn attach(self: &Arc<Self>, lifecycle: &LifecycleManager) {
        let queue: Arc<LocalQueue> = self.clone();
        lifecycle.on_shutdown("local_queue", ComponentType::Queue, move |_| {
            let queue: Arc<LocalQueue> = queue.clone();
            async move {
                queue.stop_processing().await;
                Ok::<(), anyhow::Error>(())
            }
        });
    }

    async fn process_topic(self: Arc<Self>, topic: String) {
        let mut status_rx: watch::Receiver<QueueStatus> = self.status.subscribe();
        loop {
            let status: QueueStatus = *status_rx.borrow_and_update();
            match status {
                QueueStatus::Running => {}
                QueueStatus::Paused => {
                    if status_rx.changed().await.is_err() {
                        return;
                    }
                    continue;
                }
                QueueStatus::Idle | QueueStatus::Stopped => return,
            }

            let message: Option<LocalMessage> = tokio::select! {
                message = self.get_async(&topic, Some(POLL_INTERVAL)) => message,
                _ = status_rx.changed() => continue,
            };
            if let Some(message) = message {
                self.dispatch(message).await;
            }
        }
    }

    /// Runs every handler of the message's topic concurrently. Errors and
    /// panics are logged; the consumer keeps going.
    async fn dispatch(&self, message: LocalMessage) {
        let handlers: Vec<MessageHandler> = self.handlers_for(&message.topic);
        let runs = handlers.into_iter().map(|handler| tokio::spawn(handler(message.clone())));

        for result in join_all(runs).await {
            match result {
                Ok(Ok(())) => debug!(id = %message.id, "Message handled"),
                Ok(Err(err)) => error!(id = %message.id, topic = %message.topic, error = %err, "Message handler failed"),
                Err(err) => error!(id = %message.id, topic = %message.topic, error = %err, "Message handler panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn full_topic_drops_oldest() {
        let queue: LocalQueue = LocalQueue::new(2);
        queue.put("jobs", json!(1));
        queue.put("jobs", json!(2));
        queue.put("jobs", json!(3));
        queue.put("other", json!("x"));

        assert_eq!(queue.size(Some("jobs")), 2);
        assert_eq!(queue.size(None), 3);
        assert_eq!(queue.get("jobs").map(|m| m.data), Some(json!(2)));

        queue.clear(Some("jobs"));
        assert_eq!(queue.size(Some("jobs")), 0);
        queue.clear(None);
        assert_eq!(queue.size(None), 0);
        assert!(queue.get("missing").is_none());
    }

    #[tokio::test]
    async fn get_async_waits_for_put() {
        let queue: Arc<LocalQueue> = Arc::new(LocalQueue::default());
        let producer: Arc<LocalQueue> = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.put("events", json!({ "n": 1 }));
        });

        let message: LocalMessage = queue.get_async("events", Some(Duration::from_secs(2))).await.unwrap();
        assert_eq!(message.data["n"], 1);
        assert!(queue.get_async("events", Some(Duration::from_millis(10))).await.is_none());
    }

    #[tokio::test]
    async fn processes_messages_and_survives_failures() {
        let queue: Arc<LocalQueue> = Arc::new(LocalQueue::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

        queue.register_handler("orders", move |message: LocalMessage| {
            let tx = tx.clone();
            async move {
                if message.data == json!("bad") {
                    anyhow::bail!("rejected");
                }
                tx.send(message.data).map_err(|err| anyhow::anyhow!(err.to_string()))?;
                Ok::<(), anyhow::Error>(())
            }
        });

        queue.start_processing();
        assert_eq!(queue.status(), QueueStatus::Running);

        queue.put("orders", json!("bad"));
        queue.put("orders", json!("first"));
        queue.put("orders", json!("second"));

        let first: Value = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        let second: Value = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, json!("first"));
        assert_eq!(second, json!("second"));

        queue.pause();
        assert_eq!(queue.status(), QueueStatus::Paused);
        queue.resume();
        assert_eq!(queue.status(), QueueStatus::Running);

        tokio::time::timeout(Duration::from_secs(3), queue.stop_processing()).await.unwrap();
        assert_eq!(queue.status(), QueueStatus::Stopped);
    }

    #[test]
    fn unregister_removes_empty_topics() {
        let queue: LocalQueue = LocalQueue::default();
        let id: MessageHandlerId = queue.register_handler("t", |_| async { Ok::<(), anyhow::Error>(()) });
        assert!(queue.unregister_handler("t", id));
        assert!(!queue.unregister_handler("t", id));
        assert!(queue.handlers_for("t").is_empty());
    }
}

// End of file: /src/messaging/local.rs
