//! External OCR tooling.
//!
//! A job needs two capabilities: turning PDF pages into images
//! ([`Rasterizer`]), and turning images into text ([`Recognizer`]). The real
//! implementations shell out to Poppler and Tesseract. Tests swap in fakes.

use std::{env::consts::EXE_SUFFIX, num::NonZeroU32, sync::Arc};

use crate::{
    config::{LanguageTag, ResolvedJob},
    prelude::*,
};

pub mod poppler;
pub mod tesseract;

/// One rasterized page, stored as an image file.
#[derive(Clone, Debug)]
pub struct RasterPage {
    /// Path to the image.
    pub path: PathBuf,
}

/// The rasterized pages of a document, in page order.
pub struct RasterizedDocument {
    /// The temporary directory holding our page images, if we own one.
    ///
    /// This is released by [`Drop`].
    tmpdir: Option<tempfile::TempDir>,
    /// Our pages, in order.
    pages: Vec<RasterPage>,
}

impl RasterizedDocument {
    /// Create a document from page images, optionally taking ownership of the
    /// temporary directory that holds them.
    pub fn new(tmpdir: Option<tempfile::TempDir>, pages: Vec<RasterPage>) -> Self {
        Self { tmpdir, pages }
    }

    /// Our pages, in order.
    pub fn pages(&self) -> &[RasterPage] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl Drop for RasterizedDocument {
    fn drop(&mut self) {
        // Delete our temporary directory, if we have one.
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary directory: {}",
                    err
                );
            }
        }
    }
}

/// Converts PDF pages to images.
#[async_trait]
pub trait Rasterizer: Send + Sync + 'static {
    /// Rasterize every page of `pdf_path` at `dpi`.
    async fn rasterize(&self, pdf_path: &Path, dpi: NonZeroU32)
    -> Result<RasterizedDocument>;
}

/// Extracts text from page images.
#[async_trait]
pub trait Recognizer: Send + Sync + 'static {
    /// Recognize the text on `page`, using the models selected by `language`.
    async fn recognize(&self, page: &RasterPage, language: &LanguageTag) -> Result<String>;
}

/// The engines used by a single job.
#[derive(Clone)]
pub struct Engines {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub recognizer: Arc<dyn Recognizer>,
}

/// Builds the engines for a job, once its settings have been validated.
pub trait EngineProvider: Send + Sync + 'static {
    fn engines(&self, job: &ResolvedJob) -> Engines;
}

/// Poppler and Tesseract, run as external processes.
pub struct ExternalTools;

impl EngineProvider for ExternalTools {
    fn engines(&self, job: &ResolvedJob) -> Engines {
        Engines {
            rasterizer: Arc::new(poppler::PopplerRasterizer::new(job.poppler_bin.clone())),
            recognizer: Arc::new(tesseract::TesseractRecognizer::new(
                job.tesseract_path.clone(),
            )),
        }
    }
}

/// Where to find the executable `name`: inside `bin_dir` if we have one,
/// otherwise on `PATH`.
pub fn tool_path(bin_dir: Option<&Path>, name: &str) -> PathBuf {
    match bin_dir {
        Some(dir) => dir.join(format!("{name}{EXE_SUFFIX}")),
        None => PathBuf::from(name),
    }
}
