//! The `ocr` subcommand.

use std::{sync::Arc, time::Duration};

use clap::Args;
use tokio::time::{MissedTickBehavior, interval};

use crate::{
    config::{DEFAULT_DPI, DEFAULT_LANGUAGE, JobRequest},
    engines::ExternalTools,
    open_folder::open_containing_folder,
    pipeline::{JobHandle, Pipeline, RunOutcome},
    prelude::*,
    progress::BarReporter,
    ui::{ProgressConfig, Ui},
};

/// How often we check for new job messages.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// OCR command line arguments.
#[derive(Debug, Args)]
pub struct OcrOpts {
    /// The PDF to OCR.
    pub pdf_path: PathBuf,

    /// Where to write the JSON output. Defaults to the PDF path with a `.json`
    /// extension.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// The `tesseract` executable, if it is not on your PATH.
    #[clap(long = "tesseract", env = "TESSERACT_CMD")]
    pub tesseract_path: Option<PathBuf>,

    /// Poppler's `bin` directory, if `pdftocairo` is not on your PATH.
    #[clap(long = "poppler-bin", env = "POPPLER_BIN")]
    pub poppler_bin: Option<PathBuf>,

    /// Tesseract language(s), like `eng`, `vie` or `eng+vie`.
    #[clap(short = 'l', long = "lang", default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// Resolution used to rasterize pages. 300 is usually a good choice.
    #[clap(long, default_value = DEFAULT_DPI)]
    pub dpi: String,

    /// Open the output folder when finished.
    #[clap(long)]
    pub open_folder: bool,
}

impl OcrOpts {
    /// Build the job described by these options.
    fn job_request(&self) -> JobRequest {
        let out_path = self
            .output_path
            .clone()
            .unwrap_or_else(|| self.pdf_path.with_extension("json"));
        let mut job = JobRequest::new(&self.pdf_path, out_path);
        job.tesseract_path = self.tesseract_path.clone();
        job.poppler_bin = self.poppler_bin.clone();
        job.language = self.language.clone();
        job.dpi = self.dpi.clone();
        job
    }
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ocr(ui: Ui, opts: &OcrOpts) -> Result<()> {
    let job = opts.job_request();
    let out_path = job.out_path.clone();

    let pb = ui.new_progress_bar(&ProgressConfig {
        emoji: "🔎",
        msg: "OCRing pages",
        done_msg: "OCRed pages",
    });

    let pipeline = Arc::new(Pipeline::new(Arc::new(ExternalTools)));
    let JobHandle {
        mut events,
        state: _,
        mut outcome,
        worker,
    } = pipeline.spawn(job, Arc::new(BarReporter(pb.clone())));

    // Show job messages as they arrive, until the job is over.
    let mut ticker = interval(EVENT_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let outcome = loop {
        tokio::select! {
            result = &mut outcome => {
                break result.context("OCR job exited without reporting an outcome")?;
            }
            _ = ticker.tick() => {
                for message in events.drain() {
                    ui.show_event(&message);
                }
            }
        }
    };
    worker.join().await?;

    // The job has dropped its sender, so this picks up the stragglers.
    while let Some(message) = events.recv().await {
        ui.show_event(&message);
    }

    match outcome {
        RunOutcome::Success { pages_total } => {
            pb.finish();
            info!(pages = pages_total, "wrote {}", out_path.display());
            if opts.open_folder {
                open_containing_folder(&out_path).await;
            }
            Ok(())
        }
        RunOutcome::Failure(err) => {
            pb.abandon_with_message("OCR failed");
            Err(err).with_context(|| format!("failed to OCR {:?}", opts.pdf_path.display()))
        }
    }
}
