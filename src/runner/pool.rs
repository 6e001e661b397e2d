use crate::fixtures::Cleanups;
use crate::scenario::{run_leaf_with, Outcome, ScenarioContext, Suite};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tracing::{debug, warn};

/// One leaf of one suite
#[derive(Debug, Clone)]
pub struct Job {
    pub suite: Arc<Suite>,
    pub leaf: usize,
}

impl Job {
    pub fn name(&self) -> &str {
        &self.suite.leaves[self.leaf].name
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub command: String,
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(rename = "duration_secs", serialize_with = "as_secs")]
    pub duration: Duration,
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

type Queue = Arc<Mutex<VecDeque<(usize, Job)>>>;
type Slots = Arc<Mutex<Vec<Option<ScenarioResult>>>>;
/// Cleanup lists of every job started so far
type Registry = Arc<Mutex<Vec<Cleanups>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fixed-size pool of workers draining a shared queue of scenarios
pub struct WorkerPool {
    workers: usize,
    suite_timeout: Duration,
    registry: Registry,
}

impl WorkerPool {
    pub fn new(workers: usize, suite_timeout: Duration) -> Self {
        Self {
            workers: workers.max(1),
            suite_timeout,
            registry: Registry::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.workers
    }

    /// Run every job; results come back in job order. Jobs still queued
    /// or running when the suite timeout fires are reported as timed out.
    pub async fn run(&self, ctx: Arc<ScenarioContext>, jobs: Vec<Job>) -> Vec<ScenarioResult> {
        let placeholders: Vec<(String, String)> = jobs
            .iter()
            .map(|job| (job.suite.command.clone(), job.name().to_string()))
            .collect();
        let queue: Queue = Arc::new(Mutex::new(jobs.into_iter().enumerate().collect()));
        let slots: Slots = Arc::new(Mutex::new(vec![None; placeholders.len()]));

        let mut workers = JoinSet::new();
        for id in 0..self.workers.min(placeholders.len()) {
            workers.spawn(worker(
                id,
                Arc::clone(&ctx),
                Arc::clone(&queue),
                Arc::clone(&slots),
                Arc::clone(&self.registry),
            ));
        }

        let drained = tokio::time::timeout(self.suite_timeout, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!("Worker stopped abnormally: {}", e);
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "Suite timeout of {:?} reached, stopping remaining scenarios",
                self.suite_timeout
            );
            // aborted workers drop their sessions, which kills the children
            workers.shutdown().await;
        }
        self.clean_up(&ctx).await;

        let mut slots = lock(&slots);
        placeholders
            .into_iter()
            .enumerate()
            .map(|(i, (command, name))| {
                slots[i].take().unwrap_or(ScenarioResult {
                    command,
                    name,
                    outcome: Outcome::TimedOut,
                    duration: self.suite_timeout,
                })
            })
            .collect()
    }

    /// Remove fixtures of scenarios that were stopped before their teardown
    pub async fn clean_up(&self, ctx: &ScenarioContext) {
        let abandoned: Vec<Cleanups> = lock(&self.registry)
            .drain(..)
            .filter(|cleanups| !cleanups.is_empty())
            .collect();
        for cleanups in abandoned {
            warn!("Removing fixtures of an unfinished scenario: {:?}", cleanups.pending());
            ctx.clean_up(&cleanups).await;
        }
    }
}

/// Aborts the leaf task when its worker is aborted
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn worker(id: usize, ctx: Arc<ScenarioContext>, queue: Queue, slots: Slots, registry: Registry) {
    loop {
        let next = lock(&queue).pop_front();
        let Some((index, job)) = next else {
            debug!("Worker {} finished", id);
            return;
        };

        let started = Instant::now();
        debug!("Worker {} picked up: {}", id, job.name());
        let cleanups = Cleanups::new();
        lock(&registry).push(cleanups.clone());

        // a panicking scenario fails alone instead of taking the worker down
        let task = {
            let ctx = Arc::clone(&ctx);
            let job = job.clone();
            tokio::spawn(async move {
                let leaf = &job.suite.leaves[job.leaf];
                run_leaf_with(&ctx, &job.suite, leaf, cleanups).await
            })
        };
        let _guard = AbortOnDrop(task.abort_handle());
        let outcome = task.await.unwrap_or_else(|e| {
            warn!("Scenario {} did not finish: {}", job.name(), e);
            Outcome::Failed(join_failure(e))
        });

        lock(&slots)[index] = Some(ScenarioResult {
            command: job.suite.command.clone(),
            name: job.name().to_string(),
            outcome,
            duration: started.elapsed(),
        });
    }
}

fn join_failure(error: JoinError) -> String {
    if !error.is_panic() {
        return format!("scenario task stopped: {}", error);
    }
    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("worker panicked: {}", message)
}
