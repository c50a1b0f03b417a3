//! # Pipeline Coordinator
//!
//! Drives sessions through Researcher → Writer → Editor → Plagiarism.
//! Each submitted session runs on its own tokio task; a semaphore bounds how
//! many run at once. Every stage output is persisted before the next stage
//! starts, so an interrupted session can be resumed from its last stage.

use super::events::{PipelineEvent, PipelineEventKind};
use super::pipeline::{SessionStatus, Stage};
use crate::generation::TextGenerationClient;
use crate::models::{ExhaustionPolicy, PaperflowConfig, PipelineConfig};
use crate::skills::{default_agents, StageAgent, StageArtifact, StageContext};
use crate::state::db::PaperflowDb;
use crate::state::session::{LogLevel, PaperReport, RunMetrics, Session, StageOutput, StatusView};
use crate::state::session_store::{SessionStore, StoreError};
use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Buffered events per subscriber before the oldest are dropped
const EVENT_CAPACITY: usize = 256;

/// Stage name recorded for failures outside any stage
pub const PIPELINE_STAGE: &str = "pipeline";

/// Errors raised while driving a session
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage} failed after {attempts} attempt(s): {message}")]
    StageExhausted {
        stage: Stage,
        attempts: u32,
        message: String,
    },
    #[error("cancelled")]
    Cancelled,
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("session {0} is already running")]
    AlreadyRunning(String),
    #[error("incomplete pipeline output: {0}")]
    Incomplete(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handles for one session task
struct RunHandle {
    cancel: CancellationToken,
    done: CancellationToken,
}

/// Removes the session from the running table when its task ends, even on panic
struct Registration {
    running: Arc<Mutex<HashMap<String, RunHandle>>>,
    session_id: String,
    _done: DropGuard,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.session_id);
        }
    }
}

/// The pipeline orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    config: PipelineConfig,
    store: Arc<SessionStore>,
    client: TextGenerationClient,
    agents: Arc<BTreeMap<Stage, Arc<dyn StageAgent>>>,
    events: broadcast::Sender<PipelineEvent>,
    semaphore: Arc<Semaphore>,
    running: Arc<Mutex<HashMap<String, RunHandle>>>,
}

impl Orchestrator {
    /// Create an orchestrator with the default stage agents
    pub fn new(
        config: PipelineConfig,
        store: Arc<SessionStore>,
        client: TextGenerationClient,
        max_tokens: u32,
    ) -> Self {
        let agents = default_agents(&config, max_tokens)
            .into_iter()
            .map(|agent| (agent.stage(), agent))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1))),
            config,
            store,
            client,
            agents: Arc::new(agents),
            events,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open the database and pick the generation backend from configuration
    pub fn from_config(config: &PaperflowConfig) -> anyhow::Result<Self> {
        let db = PaperflowDb::open_at(&config.database_path).with_context(|| {
            format!("Failed to open database at {}", config.database_path.display())
        })?;
        let client = TextGenerationClient::from_config(&config.generation);
        tracing::info!(
            "Orchestrator ready: backend={}, db={}",
            client.backend_name(),
            config.database_path.display()
        );

        Ok(Self::new(
            config.pipeline.clone(),
            Arc::new(SessionStore::new(&db)),
            client,
            config.generation.max_tokens,
        ))
    }

    /// Replace the agent for `agent.stage()`
    pub fn with_agent(mut self, agent: Arc<dyn StageAgent>) -> Self {
        Arc::make_mut(&mut self.agents).insert(agent.stage(), agent);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn client(&self) -> &TextGenerationClient {
        &self.client
    }

    /// Receive progress events for every session
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Create a session and start running it in the background
    pub fn start(&self, title: &str) -> Result<String, PipelineError> {
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        if title.is_empty() {
            return Err(PipelineError::EmptyTitle);
        }

        let session_id = self.store.create(&title)?;
        self.spawn(&session_id)?;
        tracing::info!(session = %session_id, "Submitted paper pipeline for '{}'", title);
        Ok(session_id)
    }

    /// Submission boundary; same as [`Orchestrator::start`]
    pub fn submit(&self, title: &str) -> Result<String, PipelineError> {
        self.start(title)
    }

    /// Current status, log tail and outcome
    pub fn status(&self, session_id: &str) -> Result<StatusView, PipelineError> {
        Ok(self.store.status(session_id, self.config.log_tail)?)
    }

    pub fn get(&self, session_id: &str) -> Result<Session, PipelineError> {
        Ok(self.store.get(session_id)?)
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.running
            .lock()
            .map(|running| running.contains_key(session_id))
            .unwrap_or(false)
    }

    /// Wait for this process's run of the session to end, then load it
    pub async fn wait(&self, session_id: &str) -> Result<Session, PipelineError> {
        let done = self
            .running
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .get(session_id)
            .map(|handle| handle.done.clone());

        if let Some(done) = done {
            done.cancelled().await;
        }
        self.get(session_id)
    }

    /// Request cancellation.
    ///
    /// Returns `false` when the session had already finished. A session that
    /// is not driven by this process is failed immediately.
    pub fn cancel(&self, session_id: &str) -> Result<bool, PipelineError> {
        {
            // Completion is decided under the same lock, see `complete`
            let running = self.running.lock().map_err(|_| StoreError::Poisoned)?;
            if let Some(handle) = running.get(session_id) {
                handle.cancel.cancel();
                let finished = self.store.get(session_id)?.is_terminal();
                if !finished {
                    tracing::info!(session = session_id, "Cancellation requested");
                }
                return Ok(!finished);
            }
        }

        let session = self.store.get(session_id)?;
        if session.is_terminal() {
            return Ok(false);
        }
        self.record_cancelled(session_id, session.status);
        Ok(true)
    }

    /// Continue a non-terminal session from its last persisted stage
    pub fn resume(&self, session_id: &str) -> Result<(), PipelineError> {
        let session = self.store.get(session_id)?;
        if session.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                session_id: session_id.to_string(),
                status: session.status,
            }
            .into());
        }
        if self.is_running(session_id) {
            return Err(PipelineError::AlreadyRunning(session_id.to_string()));
        }

        self.store.append_log(
            session_id,
            LogLevel::Info,
            &format!("Resuming from {}", session.status),
        )?;
        self.spawn(session_id)
    }

    /// Resume every non-terminal session not already running here
    pub fn resume_interrupted(&self) -> Result<Vec<String>, PipelineError> {
        let mut resumed = Vec::new();
        for session_id in self.store.list_resumable()? {
            if self.is_running(&session_id) {
                continue;
            }
            self.resume(&session_id)?;
            resumed.push(session_id);
        }
        if !resumed.is_empty() {
            tracing::info!("Resumed {} interrupted session(s)", resumed.len());
        }
        Ok(resumed)
    }

    fn spawn(&self, session_id: &str) -> Result<(), PipelineError> {
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        {
            let mut running = self.running.lock().map_err(|_| StoreError::Poisoned)?;
            if running.contains_key(session_id) {
                return Err(PipelineError::AlreadyRunning(session_id.to_string()));
            }
            running.insert(
                session_id.to_string(),
                RunHandle {
                    cancel: cancel.clone(),
                    done: done.clone(),
                },
            );
        }

        let registration = Registration {
            running: Arc::clone(&self.running),
            session_id: session_id.to_string(),
            _done: done.drop_guard(),
        };
        let this = self.clone();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let _registration = registration;
            this.run_session(&session_id, cancel).await;
        });
        Ok(())
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn run_session(&self, session_id: &str, cancel: CancellationToken) {
        let started = Instant::now();
        // Hold the permit until the session reaches a terminal state
        let permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => None,
        };

        let result = match permit {
            Some(_) => self.execute(session_id, &cancel, started).await,
            None => Err(PipelineError::Cancelled),
        };
        self.finish(session_id, &cancel, result);
        drop(permit);
    }

    async fn execute(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<PaperReport, PipelineError> {
        let session = self.store.get(session_id)?;
        if session.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                session_id: session_id.to_string(),
                status: session.status,
            }
            .into());
        }

        let mut status = session.status;
        if status == SessionStatus::Pending {
            self.store.mark_running(session_id)?;
            status = SessionStatus::Running;
        }
        self.emit(
            PipelineEvent::new(PipelineEventKind::SessionStarted, session_id)
                .with_data(json!({ "title": session.title, "status": status })),
        );

        let mut outputs = session.stage_outputs;
        while let Some(stage) = status.next_stage() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let output = self
                .run_stage(session_id, &session.title, stage, &outputs)
                .await?;
            status = self.store.advance(session_id, stage, output.clone())?;

            self.emit(
                PipelineEvent::new(PipelineEventKind::StageCompleted, session_id)
                    .with_stage(stage)
                    .with_data(json!({
                        "duration_ms": output.duration_ms,
                        "attempts": output.attempts,
                        "fallback": output.fallback,
                    })),
            );
            outputs.insert(stage, output);
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        build_report(&session.title, &outputs, started.elapsed().as_millis() as u64)
    }

    /// Run one stage with bounded retries
    async fn run_stage(
        &self,
        session_id: &str,
        title: &str,
        stage: Stage,
        outputs: &BTreeMap<Stage, StageOutput>,
    ) -> Result<StageOutput, PipelineError> {
        let agent = self
            .agents
            .get(&stage)
            .cloned()
            .ok_or_else(|| PipelineError::Incomplete(format!("no agent for stage {}", stage)))?;
        let max_attempts = self.config.max_attempts();
        let started = Instant::now();

        self.store.append_log(
            session_id,
            LogLevel::Info,
            &format!("Stage {} started", stage),
        )?;

        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            self.emit(
                PipelineEvent::new(PipelineEventKind::StageStarted, session_id)
                    .with_stage(stage)
                    .with_data(json!({ "attempt": attempt })),
            );

            let ctx = StageContext::new(session_id, title, outputs);
            match agent.run(ctx, &self.client).await {
                Ok(artifact) => return Ok(stage_output(artifact, started, attempt)),
                Err(e) => {
                    self.store.append_log(
                        session_id,
                        LogLevel::Warn,
                        &format!(
                            "Stage {} attempt {}/{} failed: {}",
                            stage, attempt, max_attempts, e
                        ),
                    )?;
                    if attempt >= max_attempts {
                        break e;
                    }
                    self.emit(
                        PipelineEvent::new(PipelineEventKind::StageRetrying, session_id)
                            .with_stage(stage)
                            .with_data(json!({ "attempt": attempt, "error": e.to_string() })),
                    );
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
            }
        };

        match self.config.on_exhausted {
            ExhaustionPolicy::Fail => Err(PipelineError::StageExhausted {
                stage,
                attempts: attempt,
                message: last_error.to_string(),
            }),
            ExhaustionPolicy::Fallback => {
                self.store.append_log(
                    session_id,
                    LogLevel::Warn,
                    &format!("Stage {} retries exhausted; using offline fallback", stage),
                )?;
                let ctx = StageContext::new(session_id, title, outputs);
                let artifact = agent
                    .run(ctx, &self.client.as_offline())
                    .await
                    .map_err(|e| PipelineError::StageExhausted {
                        stage,
                        attempts: attempt,
                        message: e.to_string(),
                    })?;
                let mut output = stage_output(artifact, started, attempt);
                output.fallback = true;
                Ok(output)
            }
        }
    }

    /// Persist COMPLETED unless cancellation was acknowledged first
    fn complete(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
        report: &PaperReport,
    ) -> Result<(), PipelineError> {
        let _running = self.running.lock().map_err(|_| StoreError::Poisoned)?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.store.complete(session_id, report)?;
        Ok(())
    }

    /// Persist the terminal state for a finished run
    fn finish(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
        result: Result<PaperReport, PipelineError>,
    ) {
        match result {
            Ok(report) => match self.complete(session_id, cancel, &report) {
                Ok(()) => self.emit(
                    PipelineEvent::new(PipelineEventKind::SessionCompleted, session_id).with_data(
                        json!({
                            "score": report.plagiarism.score,
                            "level": report.plagiarism.level,
                            "total_ms": report.metrics.total_ms,
                        }),
                    ),
                ),
                Err(e) => self.finish(session_id, cancel, Err(e)),
            },
            Err(PipelineError::Cancelled) => {
                let status = self
                    .store
                    .get(session_id)
                    .map(|s| s.status)
                    .unwrap_or(SessionStatus::Running);
                self.record_cancelled(session_id, status);
            }
            Err(PipelineError::StageExhausted { stage, message, .. }) => {
                match self.store.fail(session_id, stage.as_str(), &message) {
                    Ok(()) => self.emit(
                        PipelineEvent::new(PipelineEventKind::SessionFailed, session_id)
                            .with_stage(stage)
                            .with_data(json!({ "message": message })),
                    ),
                    Err(e) => tracing::error!(session = session_id, "Failed to record failure: {}", e),
                }
            }
            Err(PipelineError::Store(StoreError::AlreadyTerminal { status, .. })) => {
                tracing::warn!(session = session_id, "Session already {}; run abandoned", status);
            }
            Err(e) => self.fail_pipeline(session_id, e),
        }
    }

    fn fail_pipeline(&self, session_id: &str, error: PipelineError) {
        debug_assert!(
            !matches!(error, PipelineError::Store(StoreError::InvalidTransition { .. })),
            "pipeline attempted an invalid transition: {}",
            error
        );

        let message = error.to_string();
        match self.store.fail(session_id, PIPELINE_STAGE, &message) {
            Ok(()) => self.emit(
                PipelineEvent::new(PipelineEventKind::SessionFailed, session_id)
                    .with_data(json!({ "message": message })),
            ),
            Err(e) => tracing::error!(
                session = session_id,
                "Failed to record failure ({}): {}",
                message,
                e
            ),
        }
    }

    fn record_cancelled(&self, session_id: &str, status: SessionStatus) {
        let stage = cancelled_stage(status);
        match self.store.fail(session_id, stage, "cancelled") {
            Ok(()) => self.emit(
                PipelineEvent::new(PipelineEventKind::SessionCancelled, session_id)
                    .with_data(json!({ "stage": stage })),
            ),
            Err(e) => tracing::warn!(session = session_id, "Cancellation not recorded: {}", e),
        }
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Stage a cancellation is charged to: the next stage that would have run
fn cancelled_stage(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => Stage::Research.as_str(),
        status => status.next_stage().map(|s| s.as_str()).unwrap_or(PIPELINE_STAGE),
    }
}

fn stage_output(artifact: StageArtifact, started: Instant, attempts: u32) -> StageOutput {
    StageOutput {
        text: artifact.text,
        notes: artifact.notes,
        duration_ms: started.elapsed().as_millis() as u64,
        attempts,
        fallback: artifact.fallback,
        completed_at: Utc::now(),
        plagiarism: artifact.plagiarism,
    }
}

/// Assemble the final report from the four persisted outputs
fn build_report(
    title: &str,
    outputs: &BTreeMap<Stage, StageOutput>,
    total_ms: u64,
) -> Result<PaperReport, PipelineError> {
    let output = |stage: Stage| {
        outputs
            .get(&stage)
            .ok_or_else(|| PipelineError::Incomplete(format!("missing {} output", stage)))
    };
    let research = output(Stage::Research)?;
    let writer = output(Stage::Writer)?;
    let editor = output(Stage::Editor)?;
    let plagiarism = output(Stage::Plagiarism)?
        .plagiarism
        .clone()
        .ok_or_else(|| PipelineError::Incomplete("missing plagiarism report".to_string()))?;

    let metrics = RunMetrics {
        total_ms,
        findings: research.text.lines().filter(|l| l.starts_with("- ")).count(),
        draft_chars: writer.text.chars().count(),
        edited_chars: editor.text.chars().count(),
        fallback_stages: outputs
            .iter()
            .filter(|(_, o)| o.fallback)
            .map(|(stage, _)| *stage)
            .collect(),
    };

    Ok(PaperReport {
        title: title.to_string(),
        research: research.text.clone(),
        draft: writer.text.clone(),
        edited: editor.text.clone(),
        edit_summary: editor.notes.clone(),
        plagiarism,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationError, TextGenerator};
    use crate::tools::sections::Draft;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            retry_backoff_ms: 1,
            ..PipelineConfig::default()
        }
    }

    fn offline_orchestrator(config: PipelineConfig) -> Orchestrator {
        Orchestrator::new(
            config,
            Arc::new(SessionStore::in_memory().unwrap()),
            TextGenerationClient::offline(),
            512,
        )
    }

    /// Fails transiently for the first `failures` calls
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(GenerationError::Transient("connection reset".into()));
            }
            Ok(format!("- {}", prompt.lines().next().unwrap_or_default()))
        }
    }

    fn flaky_orchestrator(failures: usize, config: PipelineConfig) -> Orchestrator {
        let client = TextGenerationClient::new(
            Arc::new(Flaky {
                failures,
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(1),
        );
        Orchestrator::new(config, Arc::new(SessionStore::in_memory().unwrap()), client, 512)
    }

    #[tokio::test]
    async fn test_offline_run_completes() {
        let orchestrator = offline_orchestrator(fast_config());
        let id = orchestrator.start("Soil Carbon Sequestration").unwrap();
        let session = orchestrator.wait(&id).await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.completed_stages(), Stage::ALL.to_vec());
        let report = session.result.unwrap();
        assert!((0.0..=1.0).contains(&report.plagiarism.score));
        assert_eq!(report.metrics.fallback_stages.len(), 3);
        assert!(Draft::parse(&report.edited).appendix().is_some());
        assert!(!orchestrator.is_running(&id));

        let stage_ms: u64 = session.stage_outputs.values().map(|o| o.duration_ms).sum();
        assert!(report.metrics.total_ms >= stage_ms);
    }

    #[tokio::test]
    async fn test_blank_title_is_rejected() {
        let orchestrator = offline_orchestrator(fast_config());
        assert!(matches!(orchestrator.start("   \n"), Err(PipelineError::EmptyTitle)));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let orchestrator = flaky_orchestrator(1, fast_config());
        let id = orchestrator.start("Retry Me").unwrap();
        let session = orchestrator.wait(&id).await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.output(Stage::Research).unwrap().attempts, 2);
        let warnings = session
            .log
            .iter()
            .filter(|e| e.level == LogLevel::Warn)
            .count();
        assert_eq!(warnings, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_fallback_policy() {
        let config = PipelineConfig {
            on_exhausted: ExhaustionPolicy::Fallback,
            ..fast_config()
        };
        let orchestrator = flaky_orchestrator(2, config);
        let id = orchestrator.start("Fallback Title").unwrap();
        let session = orchestrator.wait(&id).await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        let research = session.output(Stage::Research).unwrap();
        assert!(research.fallback);
        assert_eq!(research.attempts, 2);
    }

    #[tokio::test]
    async fn test_subscribers_see_terminal_event() {
        let orchestrator = offline_orchestrator(fast_config());
        let mut rx = orchestrator.subscribe();
        let id = orchestrator.start("Eventful").unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.recv().await {
            assert_eq!(event.session_id, id);
            kinds.push(event.kind);
            if event.kind.is_terminal() {
                break;
            }
        }
        assert_eq!(kinds.first(), Some(&PipelineEventKind::SessionStarted));
        assert_eq!(kinds.last(), Some(&PipelineEventKind::SessionCompleted));
        let completed = kinds
            .iter()
            .filter(|k| **k == PipelineEventKind::StageCompleted)
            .count();
        assert_eq!(completed, 4);
    }

    #[tokio::test]
    async fn test_resume_continues_from_last_stage() {
        let store = Arc::new(SessionStore::in_memory().unwrap());
        let id = store.create("Interrupted").unwrap();
        store.mark_running(&id).unwrap();
        store
            .advance(
                &id,
                Stage::Research,
                StageOutput {
                    text: "- Interrupted work".to_string(),
                    notes: Vec::new(),
                    duration_ms: 5,
                    attempts: 1,
                    fallback: false,
                    completed_at: Utc::now(),
                    plagiarism: None,
                },
            )
            .unwrap();

        let orchestrator = Orchestrator::new(
            fast_config(),
            Arc::clone(&store),
            TextGenerationClient::offline(),
            512,
        );
        assert_eq!(orchestrator.resume_interrupted().unwrap(), vec![id.clone()]);
        let session = orchestrator.wait(&id).await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.output(Stage::Research).unwrap().text, "- Interrupted work");
        assert!(matches!(
            orchestrator.resume(&id),
            Err(PipelineError::Store(StoreError::AlreadyTerminal { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cancel_orphaned_session() {
        let orchestrator = offline_orchestrator(fast_config());
        let id = orchestrator.store().create("Orphan").unwrap();

        assert!(orchestrator.cancel(&id).unwrap());
        let session = orchestrator.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        let error = session.error.unwrap();
        assert_eq!(error.message, "cancelled");
        assert_eq!(error.stage, "research");
        assert!(!orchestrator.cancel(&id).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_after_completion_is_refused() {
        let orchestrator = offline_orchestrator(fast_config());
        let mut rx = orchestrator.subscribe();
        let id = orchestrator.start("Already Done").unwrap();

        while let Ok(event) = rx.recv().await {
            if event.kind.is_terminal() {
                assert_eq!(event.kind, PipelineEventKind::SessionCompleted);
                break;
            }
        }
        // The run may still be registered here
        assert!(!orchestrator.cancel(&id).unwrap());
        let session = orchestrator.wait(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.error.is_none());
    }
}
