//! Running an OCR job: PDF in, per-page JSON out.
//!
//! A job walks through a fixed sequence of [`PipelineState`]s on its own tokio
//! task, and talks to its observer in three ways:
//!
//! 1. Human-readable messages on an [`EventSender`], for the user.
//! 2. `(completed, total)` page counts through a [`ProgressReporter`], for
//!    progress bars. `(0, 1)` means the job failed.
//! 3. A single [`RunOutcome`], sent once over a `oneshot` channel when the job
//!    is over.
//!
//! Every failure inside a job becomes a [`RunOutcome::Failure`]. Nothing is
//! ever written to the output path unless every page was recognized.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt as _;
use tokio::sync::{oneshot, watch};
use tracing::{Instrument as _, info_span};

use crate::{
    async_utils::{JoinWorker, panic_message, spawn_blocking_propagating_panics},
    config::{JobRequest, ResolvedJob},
    engines::EngineProvider,
    error::PipelineError,
    events::{EventReceiver, EventSender, event_channel},
    prelude::*,
    progress::{ProgressReporter, report_contained},
    writer::{PageResult, write_results},
};

/// Where a job is right now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    Rasterizing,
    /// Recognizing a 1-based `page`.
    RecognizingPage {
        page: usize,
        total: usize,
    },
    Writing,
    Done,
    Failed(PipelineError),
}

impl PipelineState {
    /// Is this a final state?
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

/// How a job ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Success { pages_total: usize },
    Failure(PipelineError),
}

/// Handles for watching a job started by [`Pipeline::spawn`].
pub struct JobHandle {
    /// Messages from the job.
    pub events: EventReceiver,
    /// The job's latest state.
    pub state: watch::Receiver<PipelineState>,
    /// Resolves once, when the job is over.
    pub outcome: oneshot::Receiver<RunOutcome>,
    /// The task running the job.
    pub worker: JoinWorker,
}

/// Runs OCR jobs using engines from an [`EngineProvider`].
pub struct Pipeline {
    engines: Arc<dyn EngineProvider>,
}

impl Pipeline {
    pub fn new(engines: Arc<dyn EngineProvider>) -> Self {
        Self { engines }
    }

    /// Start `job` on a new task and return immediately.
    pub fn spawn(
        self: &Arc<Self>,
        job: JobRequest,
        progress: Arc<dyn ProgressReporter>,
    ) -> JobHandle {
        let (events_tx, events_rx) = event_channel();
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let pipeline = self.clone();
        let span = info_span!("ocr_job", pdf = %job.pdf_path.display());
        let handle = tokio::spawn(
            async move {
                let outcome = pipeline
                    .run(&job, &events_tx, progress.as_ref(), &state_tx)
                    .await;
                if outcome_tx.send(outcome).is_err() {
                    debug!("nobody is waiting for the job outcome");
                }
            }
            .instrument(span),
        );

        JobHandle {
            events: events_rx,
            state: state_rx,
            outcome: outcome_rx,
            worker: JoinWorker::from_handle(handle),
        }
    }

    /// Run `job` to completion on the current task.
    ///
    /// Always ends in exactly one of [`PipelineState::Done`] or
    /// [`PipelineState::Failed`], and always makes exactly one final progress
    /// report: `(total, total)` on success, `(0, 1)` on failure.
    pub async fn run(
        &self,
        job: &JobRequest,
        events: &EventSender,
        progress: &dyn ProgressReporter,
        state: &watch::Sender<PipelineState>,
    ) -> RunOutcome {
        let job_run = JobRun {
            events,
            progress,
            state,
        };
        events.push("🔁 Starting OCR...");
        match self.run_stages(job, &job_run).await {
            Ok(total) => {
                job_run.transition(PipelineState::Done);
                info!(pages = total, out = %job.out_path.display(), "OCR finished");
                events.push(format!("✅ Done! Saved JSON: {}", job.out_path.display()));
                job_run.report(total, total);
                RunOutcome::Success { pages_total: total }
            }
            Err(err) => {
                error!(%err, "OCR failed");
                job_run.transition(PipelineState::Failed(err.clone()));
                events.push(format!("❌ Error: {err}"));
                job_run.report(0, 1);
                RunOutcome::Failure(err)
            }
        }
    }

    /// Everything between starting and finishing. Returns the page count.
    async fn run_stages(
        &self,
        job: &JobRequest,
        job_run: &JobRun<'_>,
    ) -> Result<usize, PipelineError> {
        job_run.transition(PipelineState::Validating);
        let job = job.resolve()?;
        announce_engine_locations(&job, job_run.events);
        let engines = self.engines.engines(&job);

        job_run.transition(PipelineState::Rasterizing);
        job_run.events.push("📄 Converting PDF pages to images...");
        let document =
            contain_panics("rasterizer", engines.rasterizer.rasterize(&job.pdf_path, job.dpi))
                .await
                .map_err(|err| PipelineError::rasterization(&err))?;
        if document.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        let total = document.len();
        job_run.events.push(format!("✔ Page count: {total}"));

        let mut results = Vec::with_capacity(total);
        for (idx, page) in document.pages().iter().enumerate() {
            let page_number = idx + 1;
            job_run.transition(PipelineState::RecognizingPage {
                page: page_number,
                total,
            });
            job_run.events.push(format!(
                "🔎 OCR page {page_number}/{total} (lang={})...",
                job.language
            ));
            let text =
                contain_panics("recognizer", engines.recognizer.recognize(page, &job.language))
                    .await
                    .map_err(|err| PipelineError::recognition(page_number, &err))?;
            results.push(PageResult::new(page_number, &text));
            job_run.report(page_number, total);
        }
        drop(document);

        job_run.transition(PipelineState::Writing);
        let out_path = job.out_path.clone();
        spawn_blocking_propagating_panics(move || write_results(&results, &out_path))
            .await
            .map_err(|err| PipelineError::write(&err))?;
        Ok(total)
    }
}

/// The observer-facing side of a single job.
struct JobRun<'a> {
    events: &'a EventSender,
    progress: &'a dyn ProgressReporter,
    state: &'a watch::Sender<PipelineState>,
}

impl JobRun<'_> {
    fn transition(&self, next: PipelineState) {
        debug_assert!(!self.state.borrow().is_terminal(), "job already finished");
        debug!(state = ?next, "job state");
        self.state.send_replace(next);
    }

    /// Tell the observer how far along we are. If the observer panics, we
    /// note it and keep going.
    fn report(&self, completed: usize, total: usize) {
        if let Some(message) = report_contained(self.progress, completed, total) {
            self.events
                .push(format!("⚠ Progress display failed: {message}"));
        }
    }
}

/// Run an engine call, turning a panic into an ordinary error so the job
/// still ends with an outcome.
async fn contain_panics<T>(
    engine: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(&*payload);
            error!(engine, %message, "engine panicked");
            Err(anyhow!("{engine} panicked: {message}"))
        }
    }
}

/// Tell the user which engine locations we're using.
fn announce_engine_locations(job: &ResolvedJob, events: &EventSender) {
    match &job.tesseract_path {
        Some(path) => events.push(format!("✔ Using Tesseract: {}", path.display())),
        None => events.push("ℹ Using Tesseract from system PATH (if available)"),
    }
    match &job.poppler_bin {
        Some(dir) => events.push(format!("✔ Using Poppler bin: {}", dir.display())),
        None => events.push("ℹ Trying Poppler from system PATH"),
    }
}
