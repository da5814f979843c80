//! Analysis Session
//!
//! Owns the lifecycle of one upload at a time: Idle → Ingesting → Analyzing →
//! Complete | Failed. Every new analysis (and every reset) bumps a generation
//! counter. Work belonging to an older generation is dropped at its next await
//! point and its result never reaches the renderer. Last request wins.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::{AnalysisError, AnalysisResult, ErrorKind};
use crate::ingest::SheetDecoder;
use crate::models::SheetStore;
use crate::pipeline::ReportPipeline;
use crate::report::{ReportRenderer, SimulationReport};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Nothing uploaded, or the session was reset
    Idle,
    /// Workbook bytes are being decoded
    Ingesting,
    /// Request built and the engine call is in flight
    Analyzing,
    /// A validated report was rendered
    Complete,
    /// The current analysis failed; recovery is starting over
    Failed { kind: ErrorKind, message: String },
}

impl SessionState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Ingesting | Self::Analyzing)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Ingesting => write!(f, "INGESTING"),
            Self::Analyzing => write!(f, "ANALYZING"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Failed { kind, .. } => write!(f, "FAILED({})", kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub state: SessionState,
    pub report: Option<Arc<SimulationReport>>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    fn new() -> Self {
        Self {
            generation: 0,
            state: SessionState::Idle,
            report: None,
            updated_at: Utc::now(),
        }
    }

    fn set(&mut self, state: SessionState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Result of an analysis that did not fail.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    /// The report was committed and handed to the renderer
    Rendered(Arc<SimulationReport>),
    /// A newer analysis or a reset made this one irrelevant
    Superseded,
}

struct SessionInner {
    snapshot: Mutex<SessionSnapshot>,
    /// Held from commit through render; `begin` waits on it so a new
    /// generation cannot start between the two.
    render_gate: Mutex<()>,
    generation_tx: watch::Sender<u64>,
    pipeline: Arc<ReportPipeline>,
    decoder: Arc<dyn SheetDecoder>,
    renderer: Arc<dyn ReportRenderer>,
}

impl SessionInner {
    /// Start a new generation. Everything older becomes stale.
    fn begin(&self) -> u64 {
        let _gate = self.render_gate.lock();
        let mut snap = self.snapshot.lock();
        snap.generation += 1;
        snap.report = None;
        snap.set(SessionState::Ingesting);
        self.generation_tx.send_replace(snap.generation);
        snap.generation
    }

    fn reset(&self) {
        let mut snap = self.snapshot.lock();
        snap.generation += 1;
        snap.report = None;
        snap.set(SessionState::Idle);
        self.generation_tx.send_replace(snap.generation);
        info!(generation = snap.generation, "session reset");
    }

    /// Move to `state` if `generation` is still current.
    fn transition(&self, generation: u64, state: SessionState) -> bool {
        let mut snap = self.snapshot.lock();
        if snap.generation != generation {
            return false;
        }
        debug!(generation, from = %snap.state, to = %state, "session transition");
        snap.set(state);
        true
    }

    /// Resolves once `generation` is no longer current.
    async fn superseded(&self, generation: u64) {
        let mut rx = self.generation_tx.subscribe();
        if rx.wait_for(|current| *current != generation).await.is_err() {
            // Sender lives as long as the session; never resolves in practice
            std::future::pending::<()>().await;
        }
    }
}

/// Single-flight analysis session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AnalysisSession {
    inner: Arc<SessionInner>,
}

impl AnalysisSession {
    pub fn new(
        pipeline: Arc<ReportPipeline>,
        decoder: Arc<dyn SheetDecoder>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        let (generation_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(SessionInner {
                snapshot: Mutex::new(SessionSnapshot::new()),
                render_gate: Mutex::new(()),
                generation_tx,
                pipeline,
                decoder,
                renderer,
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.lock().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.snapshot.lock().state.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.snapshot.lock().generation
    }

    pub fn pipeline(&self) -> &ReportPipeline {
        &self.inner.pipeline
    }

    /// Back to Idle; any in-flight analysis is dropped.
    pub fn reset(&self) {
        self.inner.reset();
    }

    pub fn reset_handle(&self) -> ResetHandle {
        ResetHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Decode an uploaded workbook and analyze it.
    pub async fn analyze_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> AnalysisResult<AnalysisOutcome> {
        let generation = self.inner.begin();
        info!(generation, file = %file_name, bytes = bytes.len(), "analysis started");

        let decoder = self.inner.decoder.clone();
        let name = file_name.to_string();
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(&name, &bytes))
            .await
            .map_err(|e| AnalysisError::decode(file_name, format!("decoder task failed: {}", e)))
            .and_then(|r| r);

        match decoded {
            Ok(store) => {
                debug!(
                    generation,
                    sheets = store.len(),
                    rows = store.total_rows(),
                    "workbook decoded"
                );
                self.run(generation, store).await
            }
            Err(e) => self.fail(generation, e),
        }
    }

    /// Analyze an already decoded workbook.
    pub async fn analyze_sheets(&self, store: SheetStore) -> AnalysisResult<AnalysisOutcome> {
        let generation = self.inner.begin();
        info!(generation, sheets = store.len(), "analysis started");
        self.run(generation, store).await
    }

    async fn run(&self, generation: u64, store: SheetStore) -> AnalysisResult<AnalysisOutcome> {
        if !self.inner.transition(generation, SessionState::Analyzing) {
            return Ok(AnalysisOutcome::Superseded);
        }

        let pipeline = &self.inner.pipeline;
        let work = async {
            let request = pipeline.prepare(&store)?;
            let raw = pipeline.request_report(&request).await?;
            pipeline.validate(&request, &raw)
        };

        let result = tokio::select! {
            result = work => result,
            _ = self.inner.superseded(generation) => {
                info!(generation, "analysis superseded; engine call dropped");
                return Ok(AnalysisOutcome::Superseded);
            }
        };

        match result {
            Ok(report) => Ok(self.commit(generation, report)),
            Err(e) => self.fail(generation, e),
        }
    }

    /// Store the report and render it, unless a newer generation took over.
    fn commit(&self, generation: u64, report: SimulationReport) -> AnalysisOutcome {
        let report = Arc::new(report);
        let _gate = self.inner.render_gate.lock();
        {
            let mut snap = self.inner.snapshot.lock();
            if snap.generation != generation {
                debug!(generation, current = snap.generation, "discarding stale report");
                return AnalysisOutcome::Superseded;
            }
            snap.report = Some(report.clone());
            snap.set(SessionState::Complete);
        }
        info!(generation, "analysis complete");
        // Snapshot lock released: the renderer may reset the session.
        // The gate is not taken by reset, only by begin.
        self.inner
            .renderer
            .render(report.clone(), self.reset_handle());
        AnalysisOutcome::Rendered(report)
    }

    fn fail(&self, generation: u64, err: AnalysisError) -> AnalysisResult<AnalysisOutcome> {
        let state = SessionState::Failed {
            kind: err.kind(),
            message: err.user_message(),
        };
        if !self.inner.transition(generation, state) {
            debug!(generation, error = %err, "discarding stale failure");
            return Ok(AnalysisOutcome::Superseded);
        }
        error!(
            generation,
            kind = %err.kind(),
            retryable = err.is_retryable(),
            error = %err,
            "analysis failed"
        );
        Err(err)
    }
}

/// Lets a renderer start the session over without owning it.
#[derive(Clone)]
pub struct ResetHandle {
    inner: Weak<SessionInner>,
}

impl ResetHandle {
    /// No-op once the session is gone.
    pub fn reset(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.reset();
        }
    }
}
