//! In-process job queue.
//!
//! # Data Flow
//! ```text
//! enqueue → unbounded channel (buffers until start)
//!     → start(): spawn `concurrent_workers` workers
//!     → worker: look up topic handler → run with timeout → retry
//!     → close(): stop workers after their current job
//! ```
//!
//! # Design Decisions
//! - Jobs enqueued before `start()` are kept and processed once started
//! - A job without a handler is dropped with a warning
//! - Each handler run is bounded by `max_consume_duration`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::schema::QueueSettings;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::subsystem::{Closer, Job, JobHandler, Queue, Starter, SubsystemError};

type Handlers = Arc<DashMap<String, JobHandler>>;
type Jobs = Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>;

pub struct MemoryQueue {
    settings: QueueSettings,
    tx: mpsc::UnboundedSender<Job>,
    rx: Jobs,
    handlers: Handlers,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Shutdown,
    started: AtomicBool,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new(settings: QueueSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            settings,
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
            handlers: Arc::new(DashMap::new()),
            workers: Mutex::new(Vec::new()),
            shutdown: Shutdown::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<(), SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }
        tracing::debug!(job_id = %job.id, topic = %job.topic, "Job enqueued");
        self.tx.send(job).map_err(|_| SubsystemError::Closed)
    }

    fn register(&self, topic: &str, handler: JobHandler) -> Result<(), SubsystemError> {
        if self.handlers.contains_key(topic) {
            return Err(SubsystemError::Rejected(format!("handler for '{}' already registered", topic)));
        }
        self.handlers.insert(topic.to_string(), handler);
        Ok(())
    }
}

#[async_trait]
impl Starter for MemoryQueue {
    async fn start(&self) -> Result<(), SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SubsystemError::Rejected("queue is already started".to_string()));
        }

        let count = self.settings.concurrent_workers.max(1);
        let mut workers = self.workers.lock();
        for id in 0..count {
            let worker = Worker {
                id,
                jobs: self.rx.clone(),
                handlers: self.handlers.clone(),
                settings: self.settings.clone(),
            };
            workers.push(tokio::spawn(worker.run(self.shutdown.subscribe())));
        }

        tracing::info!(workers = count, "Queue workers started");
        Ok(())
    }
}

#[async_trait]
impl Closer for MemoryQueue {
    async fn close(&self) -> Result<(), SubsystemError> {
        self.closed.store(true, Ordering::Release);
        self.shutdown.trigger();

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Queue worker panicked");
            }
        }
        Ok(())
    }
}

struct Worker {
    id: usize,
    jobs: Jobs,
    handlers: Handlers,
    settings: QueueSettings,
}

impl Worker {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let next = tokio::select! {
                _ = shutdown.recv() => break,
                job = async { self.jobs.lock().await.recv().await } => job,
            };
            match next {
                Some(job) => self.process(job).await,
                None => break,
            }
        }
        tracing::debug!(worker = self.id, "Queue worker stopped");
    }

    async fn process(&self, job: Job) {
        let handler = match self.handlers.get(&job.topic) {
            Some(handler) => handler.value().clone(),
            None => {
                tracing::warn!(job_id = %job.id, topic = %job.topic, "No handler for job, dropping");
                metrics::record_job(&job.topic, false);
                return;
            }
        };

        let limit = self.settings.max_consume_duration();
        let attempts = self.settings.default_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(limit, handler(job.clone())).await {
                Ok(result) => result,
                Err(_) => Err(SubsystemError::Timeout(limit)),
            };

            match outcome {
                Ok(()) => {
                    tracing::debug!(job_id = %job.id, topic = %job.topic, attempt, "Job processed");
                    metrics::record_job(&job.topic, true);
                    return;
                }
                Err(e) if attempt < attempts => {
                    tracing::debug!(job_id = %job.id, attempt, error = %e, "Job failed, retrying");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, topic = %job.topic, attempts, error = %e, "Job failed");
                    metrics::record_job(&job.topic, false);
                }
            }
        }
    }
}
