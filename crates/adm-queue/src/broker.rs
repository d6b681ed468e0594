//! # Broker
//!
//! The broker is split the way its lifecycle is:
//!
//! 1. **[`BrokerBuilder`]**: registration phase. Handlers can only be added
//!    here, so the topic table is immutable once consumption starts.
//! 2. **[`BrokerBuilder::start`]**: spawns the consumer loop on its own
//!    tokio task and hands back the two halves:
//!    - [`Publisher`]: cloneable producer side, shared by request handlers.
//!    - [`ConsumerHandle`]: stop signal and join handle for the lifecycle
//!      manager.
//!
//! Each handler invocation runs on its own spawned task which the loop
//! awaits before moving on. That keeps dispatch sequential while turning a
//! handler panic into a `JoinError` instead of a dead loop.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{HandlerError, QueueError};
use crate::message::{Message, Payload};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;
type Handler<P> = Arc<dyn Fn(Arc<Message<P>>) -> HandlerFuture + Send + Sync>;

/// What `append` does when the channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the consumer frees a slot.
    #[default]
    Block,
    /// Return [`QueueError::Full`] immediately; the message is lost.
    Drop,
}

/// Queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Name used in logs.
    pub name: String,
    /// Channel capacity. Generous by default so blocking is rare.
    pub capacity: usize,
    /// Full-channel behaviour.
    pub overflow: OverflowPolicy,
    /// Reject messages for topics nobody consumes.
    pub strict_topics: bool,
    /// Longest a single handler may run before it is abandoned and counted
    /// as failed. `0` disables the limit.
    pub handler_timeout_secs: u64,
}

impl QueueConfig {
    /// The handler time limit, if any.
    pub fn handler_timeout(&self) -> Option<Duration> {
        (self.handler_timeout_secs > 0).then(|| Duration::from_secs(self.handler_timeout_secs))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            capacity: 10_000,
            overflow: OverflowPolicy::Block,
            strict_topics: true,
            handler_timeout_secs: 30,
        }
    }
}

/// Counters shared by both halves of a running broker.
#[derive(Debug, Default)]
pub struct QueueStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    unrouted: AtomicU64,
}

impl QueueStats {
    /// Handler invocations that returned `Ok`.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Handler invocations that errored or panicked.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Messages rejected because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages dequeued for a topic with no handler.
    pub fn unrouted(&self) -> u64 {
        self.unrouted.load(Ordering::Relaxed)
    }
}

/// Registration phase of a broker.
pub struct BrokerBuilder<P> {
    config: QueueConfig,
    handlers: HashMap<&'static str, Vec<Handler<P>>>,
}

impl<P: Payload> BrokerBuilder<P> {
    /// Start registering handlers for a new broker.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    /// Add a handler for `topic`. Handlers run in registration order.
    pub fn register<F, Fut>(&mut self, topic: &'static str, handler: F) -> &mut Self
    where
        F: Fn(Arc<Message<P>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let handler: Handler<P> =
            Arc::new(move |message: Arc<Message<P>>| -> HandlerFuture { Box::pin(handler(message)) });
        self.handlers.entry(topic).or_default().push(handler);
        tracing::debug!(queue = %self.config.name, topic, "registered queue consumer");
        self
    }

    /// Freeze the topic table and spawn the consumer loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> (Publisher<P>, ConsumerHandle) {
        let capacity = self.config.capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = Arc::new(QueueStats::default());
        let name: Arc<str> = Arc::from(self.config.name.as_str());
        let topics: HashSet<&'static str> = self.handlers.keys().copied().collect();

        let consumer = Consumer {
            name: Arc::clone(&name),
            receiver,
            handlers: self.handlers,
            stop: stop_rx,
            stats: Arc::clone(&stats),
            handler_timeout: self.config.handler_timeout(),
        };
        let task = tokio::spawn(consumer.run());

        let publisher = Publisher {
            name: Arc::clone(&name),
            sender,
            topics: Arc::new(topics),
            overflow: self.config.overflow,
            strict: self.config.strict_topics,
            stats: Arc::clone(&stats),
        };
        let handle = ConsumerHandle {
            name,
            stop: stop_tx,
            task,
            stats,
        };
        (publisher, handle)
    }
}

/// Producer half of a running broker.
pub struct Publisher<P> {
    name: Arc<str>,
    sender: mpsc::Sender<Message<P>>,
    topics: Arc<HashSet<&'static str>>,
    overflow: OverflowPolicy,
    strict: bool,
    stats: Arc<QueueStats>,
}

impl<P> Clone for Publisher<P> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
            topics: Arc::clone(&self.topics),
            overflow: self.overflow,
            strict: self.strict,
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<P> std::fmt::Debug for Publisher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("overflow", &self.overflow)
            .field("strict", &self.strict)
            .finish()
    }
}

impl<P: Payload> Publisher<P> {
    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared counters.
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Build a message for `topic`.
    ///
    /// Fails when the payload belongs to another topic, or, in strict mode,
    /// when no handler is registered for `topic`.
    pub fn stream_message(&self, topic: &str, payload: P) -> Result<Message<P>, QueueError> {
        if payload.topic() != topic {
            return Err(QueueError::TopicMismatch {
                topic: topic.to_string(),
                payload: payload.topic().to_string(),
            });
        }
        if self.strict && !self.topics.contains(topic) {
            return Err(QueueError::UnknownTopic(topic.to_string()));
        }
        Ok(Message::new(payload))
    }

    /// Enqueue a message, applying the overflow policy when full.
    pub async fn append(&self, message: Message<P>) -> Result<(), QueueError> {
        match self.overflow {
            OverflowPolicy::Block => self
                .sender
                .send(message)
                .await
                .map_err(|_| QueueError::Closed(self.name.to_string())),
            OverflowPolicy::Drop => match self.sender.try_send(message) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(queue = %self.name, topic = dropped.topic, "queue full; dropping message");
                    Err(QueueError::Full(self.name.to_string()))
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    Err(QueueError::Closed(self.name.to_string()))
                }
            },
        }
    }

    /// Build and enqueue in one step, on the payload's own topic.
    pub async fn publish(&self, payload: P) -> Result<(), QueueError> {
        let message = self.stream_message(payload.topic(), payload)?;
        self.append(message).await
    }
}

/// Lifecycle half of a running broker.
pub struct ConsumerHandle {
    name: Arc<str>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<QueueStats>,
}

impl ConsumerHandle {
    /// Shared counters.
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Signal the loop to stop, let it drain what is already buffered, and
    /// join it. Returns `false` when `timeout` elapsed and the task was aborted.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        let _ = self.stop.send(true);
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => {
                tracing::info!(queue = %self.name, "queue consumer stopped");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(queue = %self.name, error = %e, "queue consumer task failed");
                false
            }
            Err(_) => {
                tracing::warn!(queue = %self.name, ?timeout, "queue consumer did not stop in time; aborting");
                self.task.abort();
                false
            }
        }
    }
}

/// A running handler invocation, aborted when dropped: on timeout, or when
/// the consumer loop itself is aborted mid-dispatch.
struct HandlerTask(JoinHandle<Result<(), HandlerError>>);

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Consumer<P> {
    name: Arc<str>,
    receiver: mpsc::Receiver<Message<P>>,
    handlers: HashMap<&'static str, Vec<Handler<P>>>,
    stop: watch::Receiver<bool>,
    stats: Arc<QueueStats>,
    handler_timeout: Option<Duration>,
}

/// Resolves once a stop is requested. If the handle was dropped without a
/// stop, never resolves: the loop then lives as long as its publishers.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl<P: Payload> Consumer<P> {
    async fn run(mut self) {
        tracing::info!(queue = %self.name, topics = self.handlers.len(), "queue consumer started");

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => break,
                next = self.receiver.recv() => match next {
                    Some(message) => self.dispatch(message).await,
                    None => {
                        tracing::info!(queue = %self.name, "all publishers dropped");
                        return;
                    }
                },
            }
        }

        // Stop requested: refuse new messages, finish what is buffered.
        self.receiver.close();
        let mut drained = 0usize;
        while let Some(message) = self.receiver.recv().await {
            self.dispatch(message).await;
            drained += 1;
        }
        tracing::info!(queue = %self.name, drained, "queue consumer drained");
    }

    async fn dispatch(&self, message: Message<P>) {
        let Some(handlers) = self.handlers.get(message.topic) else {
            self.stats.unrouted.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(queue = %self.name, topic = message.topic, "no consumer for topic; message discarded");
            return;
        };

        let message = Arc::new(message);
        for (position, handler) in handlers.iter().enumerate() {
            let handler = Arc::clone(handler);
            let message = Arc::clone(&message);
            let topic = message.topic;
            let id = message.id;
            let mut task = HandlerTask(tokio::spawn(async move { handler(message).await }));
            let joined = match self.handler_timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut task.0).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(queue = %self.name, topic, %id, handler = position, ?limit, "queue consumer timed out; abandoned");
                        continue;
                    }
                },
                None => (&mut task.0).await,
            };
            match joined {
                Ok(Ok(())) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(queue = %self.name, topic, %id, handler = position, error = %e, "queue consumer failed");
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    if e.is_panic() {
                        tracing::error!(queue = %self.name, topic, %id, handler = position, "queue consumer panicked");
                    } else {
                        tracing::error!(queue = %self.name, topic, %id, handler = position, error = %e, "queue consumer cancelled");
                    }
                }
            }
        }
    }
}
