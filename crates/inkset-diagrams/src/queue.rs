//! Single-concurrency FIFO queue for render calls.
//!
//! Rendering backends are typically heavyweight (a TeX engine, a headless
//! browser) and are not safe to run in parallel. Every render goes through one
//! [`RenderQueue`] shared by all documents, whose worker runs tasks strictly one
//! after another in submission order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::render::RenderError;

/// Unit of work accepted by the queue.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<String, RenderError>> + Send>>;

/// Sink for queue lifecycle messages.
pub trait QueueLogger: Send + Sync {
    fn debug(&self, message: &str);
    fn error(&self, message: &str);
}

/// [`QueueLogger`] forwarding to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl QueueLogger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

struct Job {
    id: u64,
    task: TaskFuture,
    done: oneshot::Sender<Result<String, RenderError>>,
}

/// Serializes render tasks through a single worker.
pub struct RenderQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl RenderQueue {
    /// Start the queue worker on the current tokio runtime.
    #[must_use]
    pub fn create(logger: Arc<dyn QueueLogger>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(work(rx, logger));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a task. It starts once every earlier task has finished.
    ///
    /// Tasks submitted after [`drain`](Self::drain) resolve to
    /// [`RenderError::QueueClosed`] without running.
    pub fn enqueue<F>(&self, task: F) -> RenderTask
    where
        F: Future<Output = Result<String, RenderError>> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let job = Job {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            task: Box::pin(task),
            done,
        };

        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let rejected = match tx.as_ref() {
            Some(tx) => tx.send(job).err().map(|e| e.0),
            None => Some(job),
        };
        if let Some(job) = rejected {
            let _ = job.done.send(Err(RenderError::QueueClosed));
        }

        RenderTask { rx }
    }

    /// Enqueue a task and wait for its result.
    pub async fn run<F>(&self, task: F) -> Result<String, RenderError>
    where
        F: Future<Output = Result<String, RenderError>> + Send + 'static,
    {
        self.enqueue(task).wait().await
    }

    /// Stop accepting tasks and wait for every queued task to complete.
    pub async fn drain(&self) {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            tracing::error!(error = %e, "render queue worker stopped abnormally");
        }
    }
}

/// Completion handle for one enqueued task.
#[derive(Debug)]
pub struct RenderTask {
    rx: oneshot::Receiver<Result<String, RenderError>>,
}

impl RenderTask {
    /// Wait for the task's own result.
    pub async fn wait(self) -> Result<String, RenderError> {
        self.rx.await.unwrap_or(Err(RenderError::QueueClosed))
    }
}

async fn work(mut rx: mpsc::UnboundedReceiver<Job>, logger: Arc<dyn QueueLogger>) {
    while let Some(job) = rx.recv().await {
        let id = job.id;
        logger.debug(&format!("render task {id} started"));

        // Run on its own task so a panic is caught and the worker survives.
        let result = match tokio::spawn(job.task).await {
            Ok(result) => result,
            Err(e) => Err(RenderError::Panicked(e.to_string())),
        };

        match &result {
            Ok(_) => logger.debug(&format!("render task {id} finished")),
            Err(e) => logger.error(&format!("render task {id} failed: {e}")),
        }
        // The caller may have stopped waiting.
        let _ = job.done.send(result);
    }
}
