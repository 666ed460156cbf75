//! Pipeline engine
//!
//! Drives a [`Session`] through the state machine in [`super::state`].
//! Every stage reads its inputs back from the [`StateStore`] and commits its
//! output, then the updated session record, before the session advances.

use super::state::{next_status, StageOutcome, TransitionContext};
use crate::llm::{Generator, RoleRouter};
use crate::memory::{fields, StateStore, StoreExt, StoreProvider};
use crate::render::{ArtifactSink, ConflictPolicy, MarkdownSink};
use crate::research::{
    Evaluator, ModelTier, Planner, PoolConfig, Publisher, ResearchPool, ResearchWorker, Revision,
    SpecialistWorker, Synthesizer, WorkerProfile,
};
use crate::tools::search::{EvidenceProvider, NoopSearch};
use crate::types::{
    Artifact, Critique, FailureRecord, PipelineError, Report, ResearchBatch, Result, Session,
    SessionStatus, Subtopic, Verdict,
};
use crate::utils::toml_config::{LlmConfig, SwarmConfig};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

/// A session that reached DONE, with its artifact.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub session: Session,
    pub artifact: Artifact,
}

/// A session that reached FAILED, with the error that stopped it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub session: Session,
    #[source]
    pub error: PipelineError,
}

/// The research pipeline: planner, worker pool, synthesizer, optional
/// evaluator and publisher over one shared state store.
pub struct ResearchPipeline {
    store: Arc<dyn StateStore>,
    planner: Planner,
    pool: ResearchPool,
    synthesizer: Synthesizer,
    evaluator: Option<Evaluator>,
    publisher: Publisher,
    revision_budget: u32,
}

impl ResearchPipeline {
    pub fn builder(generator: Arc<dyn Generator>) -> PipelineBuilder {
        PipelineBuilder::new(generator)
    }

    /// Assemble the production pipeline from configuration.
    pub async fn from_config(config: &SwarmConfig) -> Self {
        let generator: Arc<dyn Generator> = Arc::new(RoleRouter::from_config(&config.llm));
        let store = StoreProvider::from_path(config.storage.path.as_deref())
            .open()
            .await;

        Self::builder(generator)
            .store(store)
            .search(config.search.provider.build())
            .tier_models(&config.llm)
            .pool_size(config.research.researcher_pool_size)
            .results_per_query(config.research.results_per_query)
            .pool_config(PoolConfig::from(&config.research))
            .max_subtopics(config.pipeline.max_subtopics)
            .evaluator(config.pipeline.enable_evaluator)
            .revision_budget(config.pipeline.revision_retry_budget)
            .output(config.output.dir.clone(), config.output.on_conflict)
            .generated_titles(config.output.generated_titles)
            .build()
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Run one question to DONE or FAILED.
    pub async fn run(&self, question: &str) -> std::result::Result<PipelineRun, PipelineFailure> {
        let session = Session::new(question.trim());
        let span = tracing::info_span!("session", key = %session.key);
        self.drive(session).instrument(span).await
    }

    async fn drive(
        &self,
        mut session: Session,
    ) -> std::result::Result<PipelineRun, PipelineFailure> {
        tracing::info!(question = %session.question, "Session started");

        if session.question.is_empty() {
            let error = PipelineError::Planning("question is empty".to_string());
            return Err(self.fail(session, error).await);
        }
        if let Err(e) = self.start(&session).await {
            return Err(self.fail(session, e).await);
        }

        let mut artifact = None;
        while !session.status.is_terminal() {
            let stage = session.status;
            tracing::info!(session = %session.key, stage = stage.stage_name(), "Stage started");

            let outcome = match stage {
                SessionStatus::Planning => self.plan(&session).await,
                SessionStatus::Researching => self.research(&session).await,
                SessionStatus::Synthesizing => self.synthesize(&session).await,
                SessionStatus::Evaluating => self.evaluate(&session).await,
                SessionStatus::Publishing => self.publish(&session).await.map(|a| {
                    artifact = Some(a);
                    StageOutcome::Published
                }),
                SessionStatus::Done | SessionStatus::Failed => break,
            };

            let advanced = match outcome {
                Ok(outcome) => self.advance(&mut session, outcome).await,
                Err(e) => Err(e),
            };
            if let Err(e) = advanced {
                if let Some(orphan) = artifact.take() {
                    self.discard(&session, &orphan).await;
                }
                return Err(self.fail(session, e).await);
            }
        }

        match artifact {
            Some(artifact) if session.status == SessionStatus::Done => {
                tracing::info!(
                    session = %session.key,
                    path = %artifact.path,
                    revisions = session.revisions,
                    "Session done"
                );
                Ok(PipelineRun { session, artifact })
            }
            _ => {
                let error = PipelineError::InvalidTransition(format!(
                    "session stopped in {} without an artifact",
                    session.status
                ));
                Err(self.fail(session, error).await)
            }
        }
    }

    async fn start(&self, session: &Session) -> Result<()> {
        self.store
            .put_json(&session.key, fields::QUESTION, &session.question)
            .await?;
        self.store
            .put_json(&session.key, fields::SESSION, session)
            .await?;
        Ok(())
    }

    fn context(&self, session: &Session) -> TransitionContext {
        TransitionContext {
            evaluator_enabled: self.evaluator.is_some(),
            revisions_used: session.revisions,
            revision_budget: self.revision_budget,
        }
    }

    /// Apply a stage outcome and commit the session record.
    ///
    /// `session` only changes once the commit has landed.
    async fn advance(&self, session: &mut Session, outcome: StageOutcome) -> Result<()> {
        let from = session.status;
        let to = next_status(from, outcome, self.context(session))?;
        let mut next = session.clone();
        if from == SessionStatus::Evaluating && to == SessionStatus::Synthesizing {
            next.revisions += 1;
        }
        next.status = to;
        next.updated_at = Utc::now();
        self.store
            .put_json(&next.key, fields::SESSION, &next)
            .await?;
        *session = next;

        tracing::info!(session = %session.key, from = %from, to = %to, "Session advanced");
        Ok(())
    }

    /// Mark the session FAILED. The failure record is committed best-effort.
    async fn fail(&self, mut session: Session, error: PipelineError) -> PipelineFailure {
        let stage = session.status;
        session.failure = Some(FailureRecord {
            stage,
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
        session.status = next_status(stage, StageOutcome::Failed, self.context(&session))
            .unwrap_or(SessionStatus::Failed);
        session.updated_at = Utc::now();

        tracing::error!(
            session = %session.key,
            stage = stage.stage_name(),
            kind = error.kind(),
            "Session failed: {}",
            error
        );
        if let Err(e) = self
            .store
            .put_json(&session.key, fields::SESSION, &session)
            .await
        {
            tracing::warn!(session = %session.key, "Could not record session failure: {}", e);
        }

        PipelineFailure { session, error }
    }

    async fn plan(&self, session: &Session) -> Result<StageOutcome> {
        let question: String = self.require(session, fields::QUESTION).await?;
        let subtopics = self.planner.plan(&question).await?;
        self.store
            .put_json(&session.key, fields::SUBTOPICS, &subtopics)
            .await?;
        Ok(StageOutcome::Planned)
    }

    async fn research(&self, session: &Session) -> Result<StageOutcome> {
        let subtopics: Vec<Subtopic> = self.require(session, fields::SUBTOPICS).await?;
        // The pool commits each note under its own evidence key.
        self.pool.run(&session.key, &subtopics).await?;
        Ok(StageOutcome::Researched)
    }

    async fn synthesize(&self, session: &Session) -> Result<StageOutcome> {
        let question: String = self.require(session, fields::QUESTION).await?;
        let subtopics: Vec<Subtopic> = self.require(session, fields::SUBTOPICS).await?;
        let batch = ResearchBatch::load(self.store.as_ref(), &session.key, subtopics.len()).await?;

        let critique: Option<Critique> = self.store.get_json(&session.key, fields::CRITIQUE).await?;
        let previous: Option<Report> = match critique {
            Some(_) => self.store.get_json(&session.key, fields::REPORT).await?,
            None => None,
        };
        let revision = match (&previous, &critique) {
            (Some(previous), Some(critique)) => Some(Revision { previous, critique }),
            _ => None,
        };

        let report = self
            .synthesizer
            .synthesize(&question, &subtopics, &batch, revision)
            .await?;
        self.store
            .put_json(&session.key, fields::REPORT, &report)
            .await?;
        if critique.is_some() {
            self.store.delete(&session.key, fields::CRITIQUE).await?;
        }
        Ok(StageOutcome::Synthesized)
    }

    async fn evaluate(&self, session: &Session) -> Result<StageOutcome> {
        let Some(evaluator) = &self.evaluator else {
            return Err(PipelineError::InvalidTransition(
                "evaluation reached with the evaluator disabled".to_string(),
            ));
        };
        let question: String = self.require(session, fields::QUESTION).await?;
        let subtopics: Vec<Subtopic> = self.require(session, fields::SUBTOPICS).await?;
        let report: Report = self.require(session, fields::REPORT).await?;
        let batch = ResearchBatch::load(self.store.as_ref(), &session.key, subtopics.len()).await?;

        let critique = match evaluator.evaluate(&question, &report, &batch).await {
            Ok(critique) => critique,
            Err(e) => {
                tracing::warn!(session = %session.key, "Evaluation failed, treating report as approved: {}", e);
                Critique::approved()
            }
        };

        if critique.verdict == Verdict::NeedsRevision {
            if self.context(session).revision_allowed() {
                self.store
                    .put_json(&session.key, fields::CRITIQUE, &critique)
                    .await?;
            } else {
                tracing::warn!(
                    session = %session.key,
                    issues = ?critique.issues,
                    "Revision budget exhausted, publishing with unresolved critique"
                );
            }
        }
        Ok(StageOutcome::Evaluated(critique.verdict))
    }

    async fn publish(&self, session: &Session) -> Result<Artifact> {
        let question: String = self.require(session, fields::QUESTION).await?;
        let report: Report = self.require(session, fields::REPORT).await?;
        let artifact = self.publisher.publish(&question, &report).await?;
        if let Err(e) = self
            .store
            .put_json(&session.key, fields::ARTIFACT, &artifact)
            .await
        {
            self.discard(session, &artifact).await;
            return Err(e.into());
        }
        Ok(artifact)
    }

    /// Remove an artifact whose session could not be committed. Best-effort.
    async fn discard(&self, session: &Session, artifact: &Artifact) {
        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            tracing::warn!(session = %session.key, path = %artifact.path, "Could not remove orphaned artifact: {}", e);
        }
        if let Err(e) = self.store.delete(&session.key, fields::ARTIFACT).await {
            tracing::warn!(session = %session.key, "Could not retract artifact record: {}", e);
        }
    }

    async fn require<T>(&self, session: &Session, field: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        self.store
            .get_json(&session.key, field)
            .await?
            .ok_or_else(|| {
                PipelineError::Store(crate::types::StoreError::Corrupt {
                    field: field.to_string(),
                    reason: "expected a committed value but found none".to_string(),
                })
            })
    }
}

/// Builder for [`ResearchPipeline`].
pub struct PipelineBuilder {
    generator: Arc<dyn Generator>,
    store: Option<Arc<dyn StateStore>>,
    search: Arc<dyn EvidenceProvider>,
    workers: Option<Vec<Arc<dyn ResearchWorker>>>,
    sink: Option<Arc<dyn ArtifactSink>>,
    output_dir: PathBuf,
    on_conflict: ConflictPolicy,
    light_model: Option<String>,
    heavy_model: Option<String>,
    pool_size: usize,
    results_per_query: usize,
    pool_config: PoolConfig,
    max_subtopics: usize,
    enable_evaluator: bool,
    revision_budget: u32,
    generated_titles: bool,
}

impl PipelineBuilder {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            store: None,
            search: Arc::new(NoopSearch),
            workers: None,
            sink: None,
            output_dir: PathBuf::from("./reports"),
            on_conflict: ConflictPolicy::default(),
            light_model: None,
            heavy_model: None,
            pool_size: 5,
            results_per_query: 3,
            pool_config: PoolConfig::default(),
            max_subtopics: 5,
            enable_evaluator: false,
            revision_budget: 1,
            generated_titles: false,
        }
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn search(mut self, search: Arc<dyn EvidenceProvider>) -> Self {
        self.search = search;
        self
    }

    /// Use these workers instead of the default specialist roster.
    pub fn workers(mut self, workers: Vec<Arc<dyn ResearchWorker>>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn output(mut self, dir: impl Into<PathBuf>, on_conflict: ConflictPolicy) -> Self {
        self.output_dir = dir.into();
        self.on_conflict = on_conflict;
        self
    }

    /// Map roster tiers onto the configured light/heavy research models.
    pub fn tier_models(mut self, llm: &LlmConfig) -> Self {
        self.light_model = llm.light_model.clone();
        self.heavy_model = llm.heavy_model.clone();
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn results_per_query(mut self, n: usize) -> Self {
        self.results_per_query = n;
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    pub fn max_subtopics(mut self, n: usize) -> Self {
        self.max_subtopics = n;
        self
    }

    pub fn evaluator(mut self, enabled: bool) -> Self {
        self.enable_evaluator = enabled;
        self
    }

    pub fn revision_budget(mut self, budget: u32) -> Self {
        self.revision_budget = budget;
        self
    }

    pub fn generated_titles(mut self, enabled: bool) -> Self {
        self.generated_titles = enabled;
        self
    }

    fn default_workers(&self) -> Vec<Arc<dyn ResearchWorker>> {
        WorkerProfile::default_roster(self.pool_size)
            .into_iter()
            .map(|profile| {
                let model = match profile.tier {
                    ModelTier::Light => self.light_model.clone(),
                    ModelTier::Heavy => self.heavy_model.clone(),
                };
                let worker = SpecialistWorker::new(
                    profile,
                    Arc::clone(&self.search),
                    Arc::clone(&self.generator),
                    self.results_per_query,
                );
                let worker = match model {
                    Some(model) => worker.with_model(model),
                    None => worker,
                };
                Arc::new(worker) as Arc<dyn ResearchWorker>
            })
            .collect()
    }

    pub fn build(self) -> ResearchPipeline {
        let store = self
            .store
            .clone()
            .unwrap_or_else(|| Arc::new(crate::memory::InMemoryStore::new()));
        let workers = self.workers.clone().unwrap_or_else(|| self.default_workers());
        let sink = self.sink.clone().unwrap_or_else(|| {
            Arc::new(MarkdownSink::new(self.output_dir.clone(), self.on_conflict))
        });

        let mut publisher = Publisher::new(sink);
        if self.generated_titles {
            publisher = publisher.with_generated_titles(Arc::clone(&self.generator));
        }

        ResearchPipeline {
            planner: Planner::new(Arc::clone(&self.generator), self.max_subtopics),
            pool: ResearchPool::new(workers, Arc::clone(&store), self.pool_config.clone()),
            synthesizer: Synthesizer::new(Arc::clone(&self.generator)),
            evaluator: self
                .enable_evaluator
                .then(|| Evaluator::new(Arc::clone(&self.generator))),
            publisher,
            revision_budget: self.revision_budget,
            store,
        }
    }
}
