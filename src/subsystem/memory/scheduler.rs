//! Interval scheduler.
//!
//! Tasks registered before `start()` are held until start; tasks
//! registered afterwards begin ticking immediately. Each task runs on its
//! own Tokio task and stops when the scheduler closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::lifecycle::shutdown::Shutdown;
use crate::subsystem::{Closer, Scheduler, Starter, SubsystemError, TaskFn};

struct Scheduled {
    name: String,
    every: Duration,
    task: TaskFn,
}

#[derive(Default)]
struct Tasks {
    pending: Vec<Scheduled>,
    running: Vec<JoinHandle<()>>,
    started: bool,
}

#[derive(Default)]
pub struct MemoryScheduler {
    tasks: Mutex<Tasks>,
    shutdown: Shutdown,
    closed: AtomicBool,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn(&self, scheduled: Scheduled) -> JoinHandle<()> {
        tokio::spawn(tick(scheduled, self.shutdown.subscribe()))
    }
}

async fn tick(scheduled: Scheduled, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval_at(Instant::now() + scheduled.every, scheduled.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::debug!(task = %scheduled.name, "Running scheduled task");
                (scheduled.task)().await;
            }
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!(task = %scheduled.name, "Scheduled task stopped");
}

impl Scheduler for MemoryScheduler {
    fn schedule(&self, name: &str, every: Duration, task: TaskFn) -> Result<(), SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }
        if every.is_zero() {
            return Err(SubsystemError::Rejected(format!("task '{}' has a zero interval", name)));
        }

        let scheduled = Scheduled {
            name: name.to_string(),
            every,
            task,
        };

        let mut tasks = self.tasks.lock();
        if tasks.started {
            let handle = self.spawn(scheduled);
            tasks.running.push(handle);
        } else {
            tasks.pending.push(scheduled);
        }
        tracing::debug!(task = %name, every = ?every, "Task scheduled");
        Ok(())
    }
}

#[async_trait]
impl Starter for MemoryScheduler {
    async fn start(&self) -> Result<(), SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }

        let mut tasks = self.tasks.lock();
        if tasks.started {
            return Err(SubsystemError::Rejected("scheduler is already started".to_string()));
        }
        tasks.started = true;

        let pending = std::mem::take(&mut tasks.pending);
        let count = pending.len();
        for scheduled in pending {
            let handle = self.spawn(scheduled);
            tasks.running.push(handle);
        }

        tracing::info!(tasks = count, "Scheduler started");
        Ok(())
    }
}

#[async_trait]
impl Closer for MemoryScheduler {
    async fn close(&self) -> Result<(), SubsystemError> {
        self.closed.store(true, Ordering::Release);
        self.shutdown.trigger();

        let running = std::mem::take(&mut self.tasks.lock().running);
        for handle in running {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Scheduled task panicked");
            }
        }
        Ok(())
    }
}
