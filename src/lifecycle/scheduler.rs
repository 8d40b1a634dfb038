//! Bounded admission of connection workers.
//!
//! # Responsibilities
//! - Keep every admitted worker in FIFO order
//! - Run at most `max_workers` of them at once
//! - Reap workers whose keep-alive flag dropped
//! - Stop and join every worker on shutdown, in order
//!
//! # Design Decisions
//! - Liveness is polled on each reconciliation, not pushed
//! - A started worker keeps its slot until it dies (no preemption)
//! - Queue length is unbounded; only concurrency is capped

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

/// The future a worker runs to completion.
pub type WorkerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Shared flag telling whether a worker still wants to run.
#[derive(Debug, Clone)]
pub struct KeepAlive(Arc<AtomicBool>);

impl KeepAlive {
    /// A new flag, initially alive.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Ask the worker to stop. It notices at its next check.
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new()
    }
}

/// A long-running unit of work managed by the [`Scheduler`].
pub trait Worker: Send + 'static {
    /// The flag the worker checks and clears when it is done.
    fn keep_alive(&self) -> KeepAlive;

    /// Consume the worker into the future that runs it.
    fn run(self: Box<Self>) -> WorkerFuture;
}

struct Task {
    keep_alive: KeepAlive,
    /// Present until the task is started.
    worker: Option<Box<dyn Worker>>,
    /// Present once the task is started.
    handle: Option<JoinHandle<()>>,
}

impl Task {
    fn is_dead(&self) -> bool {
        !self.keep_alive.is_alive()
            || self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn start(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.handle = Some(tokio::spawn(worker.run()));
        }
    }
}

/// Admission controller over connection workers.
pub struct Scheduler {
    max_workers: usize,
    tasks: Vec<Task>,
}

impl Scheduler {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            tasks: Vec::new(),
        }
    }

    /// Queue a worker and reconcile. Never blocks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add<W: Worker>(&mut self, worker: W) {
        self.tasks.push(Task {
            keep_alive: worker.keep_alive(),
            worker: Some(Box::new(worker)),
            handle: None,
        });
        self.reconcile();
    }

    /// Reap dead tasks, then start queued tasks among the first
    /// `max_workers` entries.
    pub fn reconcile(&mut self) {
        let before = self.tasks.len();
        self.tasks.retain(|task| !task.is_dead());
        let reaped = before - self.tasks.len();

        for task in self.tasks.iter_mut().take(self.max_workers) {
            task.start();
        }

        if reaped > 0 {
            tracing::debug!(
                reaped,
                running = self.running(),
                queued = self.queued(),
                "Reaped finished workers"
            );
        }
    }

    /// Number of started, not yet reaped tasks.
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|task| task.is_running()).count()
    }

    /// Number of tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_running()).count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Stop every task and wait for each running one to finish, in list
    /// order. Queued tasks are dropped without being started.
    pub async fn shutdown(&mut self) {
        let total = self.tasks.len();
        for task in self.tasks.drain(..) {
            task.keep_alive.stop();
            if let Some(handle) = task.handle {
                if let Err(err) = handle.await {
                    tracing::error!(error = %err, "Worker terminated abnormally");
                }
            }
        }
        tracing::info!(workers = total, "Scheduler shut down");
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("max_workers", &self.max_workers)
            .field("running", &self.running())
            .field("queued", &self.queued())
            .finish()
    }
}
