//! Bounded, order-preserving research fan-out
//!
//! Subtopic `i` is assigned to worker `i mod P`. At most `min(P, N)` tasks
//! run at once. Each task retries transient failures with exponential backoff
//! under a per-attempt deadline and commits its note to the state store
//! before reporting success. Results are re-assembled by subtopic index, so
//! completion order never leaks into the batch.

use crate::memory::{fields, StateStore, StoreExt};
use crate::research::worker::ResearchWorker;
use crate::types::{EvidenceNote, PipelineError, ResearchBatch, ResearchTaskError, Result, Subtopic};
use crate::utils::toml_config::ResearchConfig;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Retry and deadline settings for research tasks
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Deadline for a single attempt (default: 120 seconds)
    pub task_timeout: Duration,

    /// Attempts per subtopic, including the first (default: 3)
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per retry (default: 500ms)
    pub backoff_base: Duration,

    /// Upper bound on a single retry delay (default: 8 seconds)
    pub backoff_max: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(120),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
        }
    }
}

impl PoolConfig {
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

impl From<&ResearchConfig> for PoolConfig {
    fn from(config: &ResearchConfig) -> Self {
        PoolConfig::default()
            .with_task_timeout(config.per_task_timeout())
            .with_max_attempts(config.max_attempts)
            .with_backoff(config.backoff_base(), config.backoff_max())
    }
}

/// A failed task: the attempts it used and its last error.
type TaskFailure = (u32, ResearchTaskError);

/// Runs one research batch across a fixed set of workers.
pub struct ResearchPool {
    workers: Vec<Arc<dyn ResearchWorker>>,
    store: Arc<dyn StateStore>,
    config: PoolConfig,
}

impl ResearchPool {
    pub fn new(
        workers: Vec<Arc<dyn ResearchWorker>>,
        store: Arc<dyn StateStore>,
        config: PoolConfig,
    ) -> Self {
        Self {
            workers,
            store,
            config,
        }
    }

    /// Pool size (P).
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Resolve every subtopic and return the notes ordered by subtopic index.
    ///
    /// All tasks are drained before a failure is reported; the error names the
    /// lowest failing index and lists the others.
    pub async fn run(&self, session: &str, subtopics: &[Subtopic]) -> Result<ResearchBatch> {
        if self.workers.is_empty() {
            return Err(PipelineError::Config(
                "research pool has no workers".to_string(),
            ));
        }

        let n = subtopics.len();
        let concurrency = self.workers.len().min(n).max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        tracing::info!(
            session,
            subtopics = n,
            workers = self.workers.len(),
            concurrency,
            "Dispatching research batch"
        );

        let mut set = JoinSet::new();
        for (slot, subtopic) in subtopics.iter().enumerate() {
            let worker = Arc::clone(&self.workers[subtopic.index % self.workers.len()]);
            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&permits);
            let config = self.config.clone();
            let session = session.to_string();
            let subtopic = subtopic.clone();

            set.spawn(async move {
                let task = async {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| (0, ResearchTaskError::Aborted(e.to_string())))?;
                    resolve_with_retry(worker.as_ref(), store.as_ref(), &session, &subtopic, &config)
                        .await
                };
                let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => Err((1, ResearchTaskError::Aborted(panic_message(panic)))),
                };
                (slot, outcome)
            });
        }

        let mut slots: Vec<Option<std::result::Result<EvidenceNote, TaskFailure>>> =
            (0..n).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) => tracing::error!("Research task could not be joined: {}", e),
            }
        }

        let mut notes = Vec::with_capacity(n);
        let mut failures: Vec<(usize, u32, ResearchTaskError)> = Vec::new();
        for (subtopic, slot) in subtopics.iter().zip(slots) {
            match slot {
                Some(Ok(note)) => notes.push(note),
                Some(Err((attempts, error))) => failures.push((subtopic.index, attempts, error)),
                None => failures.push((
                    subtopic.index,
                    0,
                    ResearchTaskError::Aborted("task did not report a result".to_string()),
                )),
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|(index, _, _)| *index);
            let other_failures = failures.iter().skip(1).map(|(i, _, _)| *i).collect();
            let (index, attempts, source) = failures.swap_remove(0);
            tracing::error!(session, index, attempts, error = %source, "Research batch failed");
            return Err(PipelineError::ResearchBatch {
                index,
                attempts,
                source,
                other_failures,
            });
        }

        let batch = ResearchBatch::assemble(n, notes)?;
        tracing::info!(session, notes = batch.len(), "Research batch complete");
        Ok(batch)
    }
}

/// Resolve and commit one subtopic; the deadline covers both per attempt.
async fn resolve_with_retry(
    worker: &dyn ResearchWorker,
    store: &dyn StateStore,
    session: &str,
    subtopic: &Subtopic,
    config: &PoolConfig,
) -> std::result::Result<EvidenceNote, TaskFailure> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let commit = async {
            let note = check_note(worker.resolve(subtopic).await?, subtopic)?;
            store
                .put_json(session, &fields::evidence(subtopic.index), &note)
                .await?;
            Ok::<EvidenceNote, ResearchTaskError>(note)
        };
        let result = match tokio::time::timeout(config.task_timeout, commit).await {
            Ok(result) => result,
            Err(_) => Err(ResearchTaskError::Timeout(config.task_timeout)),
        };

        match result {
            Ok(note) => {
                tracing::debug!(
                    worker = worker.id(),
                    subtopic = subtopic.index,
                    attempt,
                    "Subtopic resolved"
                );
                return Ok(note);
            }
            Err(e) if attempt < config.max_attempts && is_retryable(&e) => {
                let delay = config.backoff_for(attempt);
                tracing::warn!(
                    worker = worker.id(),
                    subtopic = subtopic.index,
                    attempt,
                    ?delay,
                    "Research attempt failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err((attempt, e)),
        }
    }
}

fn check_note(note: EvidenceNote, subtopic: &Subtopic) -> std::result::Result<EvidenceNote, ResearchTaskError> {
    if note.subtopic_index != subtopic.index {
        return Err(ResearchTaskError::MalformedOutput(format!(
            "note labelled for subtopic {} while resolving subtopic {}",
            note.subtopic_index, subtopic.index
        )));
    }
    if note.summary.trim().is_empty() {
        return Err(ResearchTaskError::MalformedOutput("empty summary".to_string()));
    }
    Ok(note)
}

fn is_retryable(error: &ResearchTaskError) -> bool {
    !matches!(error, ResearchTaskError::Aborted(_) | ResearchTaskError::Store(_))
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}
