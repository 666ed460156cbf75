//! Mock implementations for testing.
//!
//! Scripted generators, workers, and sinks shared across integration test
//! files so no test needs a live model or network.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarm::llm::{GenerationConstraints, Generator, Prompt, Role};
use swarm::memory::{InMemoryStore, StateStore};
use swarm::render::ArtifactSink;
use swarm::research::ResearchWorker;
use swarm::types::{
    Citation, EvidenceNote, GenerationError, ResearchTaskError, Report, SinkError, StoreError,
    Subtopic,
};

/// Generator that replays scripted responses per role.
///
/// Each role has a queue; the last entry repeats once the queue is down to
/// one item. Roles with no script fail with `ProviderUnavailable`.
#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<Role, VecDeque<Result<String, GenerationError>>>>,
    calls: Mutex<Vec<(Role, Prompt)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for `role`.
    pub fn respond(self, role: Role, text: &str) -> Self {
        self.scripts
            .lock()
            .entry(role)
            .or_default()
            .push_back(Ok(text.to_string()));
        self
    }

    /// Queue a failure for `role`.
    pub fn fail(self, role: Role, error: GenerationError) -> Self {
        self.scripts
            .lock()
            .entry(role)
            .or_default()
            .push_back(Err(error));
        self
    }

    pub fn calls_for(&self, role: Role) -> usize {
        self.calls.lock().iter().filter(|(r, _)| *r == role).count()
    }

    /// User prompts sent for `role`, in call order.
    pub fn prompts_for(&self, role: Role) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, p)| p.user.clone())
            .collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        role: Role,
        prompt: &Prompt,
        _constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError> {
        self.calls.lock().push((role, prompt.clone()));
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&role) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::InvalidResponse("empty script".into()))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(GenerationError::InvalidResponse("empty script".into()))),
            None => Err(GenerationError::ProviderUnavailable(format!(
                "no script for role {}",
                role
            ))),
        }
    }
}

/// A report JSON that the synthesizer accepts.
pub fn report_json(summary: &str, insights: &[&str]) -> String {
    serde_json::json!({
        "executive_summary": summary,
        "insights": insights,
        "citations": []
    })
    .to_string()
}

/// A research draft JSON that a specialist worker accepts.
pub fn draft_json(summary: &str) -> String {
    serde_json::json!({
        "summary": summary,
        "claims": [],
        "citation_map": [],
        "confidence": 0.6
    })
    .to_string()
}

pub fn note_for(subtopic: &Subtopic, worker: &str) -> EvidenceNote {
    EvidenceNote {
        subtopic_index: subtopic.index,
        summary: format!("Findings for {}", subtopic.title),
        citations: vec![Citation {
            url: format!("https://example.org/{}", subtopic.index),
            title: subtopic.title.clone(),
        }],
        worker_id: worker.to_string(),
        confidence: None,
    }
}

pub fn subtopics(n: usize) -> Vec<Subtopic> {
    (0..n)
        .map(|index| Subtopic {
            index,
            title: format!("Subtopic {}", index),
            guidance: String::new(),
        })
        .collect()
}

/// Tracks how many tasks are inside a worker at once.
#[derive(Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Worker whose behaviour per subtopic index is configurable.
pub struct MockWorker {
    id: String,
    delays: HashMap<usize, Duration>,
    failing: Vec<usize>,
    /// Fail this many times per subtopic before succeeding
    flaky_failures: usize,
    panic_on: Option<usize>,
    attempts: Mutex<HashMap<usize, usize>>,
    calls: Arc<AtomicUsize>,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

impl MockWorker {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            delays: HashMap::new(),
            failing: Vec::new(),
            flaky_failures: 0,
            panic_on: None,
            attempts: Mutex::new(HashMap::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            gauge: None,
        }
    }

    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    /// Every subtopic takes `delay`.
    pub fn with_uniform_delay(mut self, delay: Duration, n: usize) -> Self {
        for index in 0..n {
            self.delays.insert(index, delay);
        }
        self
    }

    pub fn failing_on(mut self, index: usize) -> Self {
        self.failing.push(index);
        self
    }

    pub fn flaky(mut self, failures: usize) -> Self {
        self.flaky_failures = failures;
        self
    }

    pub fn panicking_on(mut self, index: usize) -> Self {
        self.panic_on = Some(index);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn with_counter(mut self, calls: Arc<AtomicUsize>) -> Self {
        self.calls = calls;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResearchWorker for MockWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn resolve(&self, subtopic: &Subtopic) -> Result<EvidenceNote, ResearchTaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if let Some(delay) = self.delays.get(&subtopic.index) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }

        if self.panic_on == Some(subtopic.index) {
            panic!("worker {} crashed on subtopic {}", self.id, subtopic.index);
        }
        if self.failing.contains(&subtopic.index) {
            return Err(ResearchTaskError::Generation(
                GenerationError::ProviderUnavailable("model offline".to_string()),
            ));
        }

        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(subtopic.index).or_insert(0);
            *count += 1;
            *count
        };
        if attempt <= self.flaky_failures {
            return Err(ResearchTaskError::Generation(GenerationError::RateLimited(
                "slow down".to_string(),
            )));
        }

        Ok(note_for(subtopic, &self.id))
    }
}

/// Sink that always refuses to write.
pub struct FailingSink;

impl ArtifactSink for FailingSink {
    fn write(&self, _title: &str, _question: &str, _report: &Report) -> Result<PathBuf, SinkError> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
}

/// In-memory store whose writes to one field stall or fail.
pub struct FaultyStore {
    inner: InMemoryStore,
    field: String,
    stall: Option<Duration>,
    /// Only misbehave once this field has been written in the session
    after: Option<String>,
}

impl FaultyStore {
    /// Every put to `field` fails with `Unavailable`.
    pub fn failing_on(field: &str) -> Self {
        Self {
            inner: InMemoryStore::new(),
            field: field.to_string(),
            stall: None,
            after: None,
        }
    }

    /// Puts to `field` fail once `after` exists in the same session.
    pub fn failing_on_after(field: &str, after: &str) -> Self {
        Self {
            after: Some(after.to_string()),
            ..Self::failing_on(field)
        }
    }

    /// Every put to `field` sleeps for `delay` before landing.
    pub fn stalling_on(field: &str, delay: Duration) -> Self {
        Self {
            inner: InMemoryStore::new(),
            field: field.to_string(),
            stall: Some(delay),
            after: None,
        }
    }
}

#[async_trait]
impl StateStore for FaultyStore {
    async fn put(&self, session: &str, field: &str, value: Value) -> Result<(), StoreError> {
        let armed = match &self.after {
            Some(after) => self.inner.get(session, after).await?.is_some(),
            None => true,
        };
        if armed && field == self.field {
            match self.stall {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(StoreError::Unavailable("disk full".to_string())),
            }
        }
        self.inner.put(session, field, value).await
    }

    async fn get(&self, session: &str, field: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(session, field).await
    }

    async fn list(&self, session: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        self.inner.list(session).await
    }

    async fn delete(&self, session: &str, field: &str) -> Result<bool, StoreError> {
        self.inner.delete(session, field).await
    }

    async fn clear(&self, session: &str) -> Result<usize, StoreError> {
        self.inner.clear(session).await
    }

    fn backend(&self) -> &'static str {
        "faulty"
    }
}
