//! Fixed-size worker pool with a bounded queue and fail-fast admission
//!
//! All fetch/parse tasks for every criteria run go through one scheduler.
//! The pending queue is bounded and submission never blocks: when the
//! queue is full and every worker is busy, the submission is rejected
//! immediately. Saturation is surfaced to the caller instead of building
//! unbounded memory pressure from queued page tasks.

use crate::config::SchedulerConfig;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

/// Errors raised on task submission
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("scheduler saturated: queue full and all workers busy")]
    Saturated,

    #[error("scheduler is shut down")]
    ShutDown,
}

/// Terminal state of one scheduled task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Completion handle for one submitted task
///
/// Awaiting the handle blocks until the task reaches a terminal state,
/// success or failure alike.
pub struct TaskHandle {
    done: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// Waits for the task to finish
    pub async fn wait(self) -> TaskOutcome {
        match self.done.await {
            Ok(outcome) => outcome,
            // The task was dropped without reporting; count it as failed
            // so barriers still terminate.
            Err(_) => TaskOutcome::Failed("task dropped before completion".to_string()),
        }
    }

    /// A handle that is already failed, used to keep rejected submissions
    /// visible to the barrier
    pub fn rejected(reason: impl Into<String>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(TaskOutcome::Failed(reason.into()));
        Self { done: rx }
    }
}

/// Cloneable submission handle, safe to move into running tasks
#[derive(Clone)]
pub struct SchedulerHandle {
    queue: mpsc::Sender<Job>,
}

impl SchedulerHandle {
    /// Submits a task for execution on the worker pool
    ///
    /// Fails immediately with [`SubmitError::Saturated`] when the pending
    /// queue is full; never blocks the submitter.
    pub fn submit<F>(&self, task: F) -> Result<TaskHandle, SubmitError>
    where
        F: Future<Output = crate::Result<()>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = match task.await {
                Ok(()) => TaskOutcome::Completed,
                Err(e) => TaskOutcome::Failed(e.to_string()),
            };
            let _ = tx.send(outcome);
        });

        match self.queue.try_send(job) {
            Ok(()) => Ok(TaskHandle { done: rx }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SubmitError::Saturated),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::ShutDown),
        }
    }
}

/// Fixed-size worker pool over a bounded pending queue
pub struct TaskScheduler {
    handle: SchedulerHandle,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskScheduler {
    /// Spawns the configured number of workers draining a shared queue
    pub fn new(config: &SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers = (0..config.workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let mut shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker_id, "worker started");
                    loop {
                        let job = {
                            let mut queue = rx.lock().await;
                            tokio::select! {
                                job = queue.recv() => job,
                                _ = shutdown_rx.changed() => {
                                    // Close the queue so outstanding handle
                                    // clones get Closed on submit, then keep
                                    // draining what was already accepted.
                                    queue.close();
                                    queue.recv().await
                                }
                            }
                        };
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                    tracing::debug!(worker_id, "worker stopped");
                })
            })
            .collect();

        Self {
            handle: SchedulerHandle { queue: tx },
            shutdown_tx,
            workers,
        }
    }

    /// A cloneable handle for submitting tasks from inside other tasks
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Submits a task; see [`SchedulerHandle::submit`]
    pub fn submit<F>(&self, task: F) -> Result<TaskHandle, SubmitError>
    where
        F: Future<Output = crate::Result<()>> + Send + 'static,
    {
        self.handle.submit(task)
    }

    /// Closes the queue and waits for the workers to drain it
    ///
    /// Shutdown does not depend on outstanding [`SchedulerHandle`] clones
    /// being dropped: the workers close the queue themselves on the signal,
    /// so any handle still held elsewhere starts failing with
    /// [`SubmitError::ShutDown`].
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        drop(self.handle);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::warn!("worker did not shut down cleanly: {}", e);
            }
        }
        tracing::debug!("scheduler shut down");
    }
}

/// Outcome tally of one fan-out batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Failed(reason) => {
                tracing::warn!(reason, "task failed");
                self.failed += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

/// Fan-in barrier: blocks until every handle in the set has completed
///
/// Failed tasks count as completed for barrier purposes, so a saturated
/// or timed-out task can never hang the run.
pub async fn await_all(handles: Vec<TaskHandle>) -> BatchReport {
    let mut report = BatchReport::default();
    for handle in handles {
        report.record(handle.wait().await);
    }
    report
}
