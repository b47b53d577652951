//! Bounded-concurrency worker pool
//!
//! A fixed set of worker tasks shares one unbounded job queue. Every
//! [`WorkerPool::submit`] hands back its own [`PendingResponse`], so callers
//! that interleave several logical fetch loops on one pool never depend on
//! arrival order to pair a response with its job.
//!
//! **Worker loop:** dequeue → execute → post result-or-error → repeat, until
//! the pool is cancelled. A job that panics becomes an error response; the
//! worker survives and keeps serving the queue.
//!
//! **Cancellation:** workers stop after finishing their current job. Jobs still
//! queued at that point resolve to [`SyncError::PoolClosed`].

use crate::error::SyncError;
use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identifier assigned to each submitted job, unique per pool
pub type JobId = u64;

/// Executes the jobs of one pool
///
/// Implementations hold whatever clients the jobs need; the pool only moves
/// jobs in and results out.
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    type Job: Send + 'static;
    type Output: Send + 'static;

    async fn execute(&self, job: Self::Job) -> Result<Self::Output, SyncError>;
}

/// Tagged response of one job
#[derive(Debug)]
pub struct JobResponse<O> {
    pub id: JobId,
    pub result: Result<O, SyncError>,
}

struct Envelope<J, O> {
    id: JobId,
    job: J,
    reply: oneshot::Sender<Result<O, SyncError>>,
}

type Queue<E> = Envelope<<E as JobExecutor>::Job, <E as JobExecutor>::Output>;

/// Reply handle for one submitted job
///
/// Resolves once a worker has executed the job, or with
/// [`SyncError::PoolClosed`] if the pool shut down first.
#[must_use = "a pending response does nothing unless awaited"]
pub struct PendingResponse<O> {
    id: JobId,
    rx: oneshot::Receiver<Result<O, SyncError>>,
}

impl<O> PendingResponse<O> {
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl<O> Future for PendingResponse<O> {
    type Output = JobResponse<O>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx).poll(cx).map(|received| JobResponse {
            id,
            result: received.unwrap_or(Err(SyncError::PoolClosed(id))),
        })
    }
}

/// Responses of a batch, yielded in completion order
pub type ResponseStream<O> = FuturesUnordered<PendingResponse<O>>;

/// Fixed-size worker pool; one per sync run, never reused
pub struct WorkerPool<E: JobExecutor> {
    queue: mpsc::UnboundedSender<Queue<E>>,
    cancel: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
    worker_count: usize,
}

impl<E: JobExecutor> WorkerPool<E> {
    /// Spawn `worker_count` workers (at least one) on the current runtime
    pub fn new(worker_count: usize, executor: Arc<E>) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Queue<E>>();
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&executor),
                    Arc::clone(&rx),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::debug!(worker_count, "Worker pool started");

        Self {
            queue: tx,
            cancel,
            workers: std::sync::Mutex::new(workers),
            next_id: AtomicU64::new(1),
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Enqueue a job without waiting for a free worker
    pub fn submit(&self, job: E::Job) -> PendingResponse<E::Output> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();

        // A send failure drops the envelope, which resolves `rx` as closed
        if self.queue.send(Envelope { id, job, reply }).is_err() {
            tracing::debug!(job_id = id, "Job submitted to a closed worker pool");
        }

        PendingResponse { id, rx }
    }

    /// Enqueue a batch; responses arrive in completion order
    pub fn submit_all<I>(&self, jobs: I) -> ResponseStream<E::Output>
    where
        I: IntoIterator<Item = E::Job>,
    {
        jobs.into_iter().map(|job| self.submit(job)).collect()
    }

    /// Stop every worker after its current job; idempotent
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(worker_count = self.worker_count, "Worker pool cancelled");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for every worker task to exit
    pub async fn shutdown(&self) {
        self.cancel();
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Worker task ended abnormally");
            }
        }
    }
}

impl<E: JobExecutor> Drop for WorkerPool<E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker<E: JobExecutor>(
    worker_id: usize,
    executor: Arc<E>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Queue<E>>>>,
    cancel: CancellationToken,
) {
    loop {
        let envelope = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            }
        };

        let Envelope { id, job, reply } = envelope;
        let result = AssertUnwindSafe(executor.execute(job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                tracing::error!(worker_id, job_id = id, panic = %message, "Job panicked");
                Err(SyncError::Worker(message))
            });

        // Receiver gone means the caller stopped caring about this job
        let _ = reply.send(result);
    }

    tracing::trace!(worker_id, "Worker stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}
