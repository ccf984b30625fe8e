//! Failure reasons for an OCR job.
//!
//! Everything that can go wrong inside a job is collapsed into a single
//! [`PipelineError`] at the orchestrator boundary. External tools report
//! failures as [`anyhow::Error`] values, and we keep their full cause chain in
//! the `detail` fields so the user can see exactly what the tool said.

use std::fmt;

/// Something the user pointed us at which does not exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subject {
    /// The source PDF.
    Pdf,
    /// The `tesseract` executable.
    Recognizer,
    /// The Poppler `bin` directory.
    RasterizerDir,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Pdf => write!(f, "PDF"),
            Subject::Recognizer => write!(f, "tesseract executable"),
            Subject::RasterizerDir => write!(f, "Poppler bin directory"),
        }
    }
}

/// A job setting which failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigField {
    Dpi,
    Language,
    Destination,
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigField::Dpi => write!(f, "DPI"),
            ConfigField::Language => write!(f, "language"),
            ConfigField::Destination => write!(f, "output path"),
        }
    }
}

/// Why a job failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("{subject} not found: {}", path.display())]
    NotFound {
        subject: Subject,
        path: std::path::PathBuf,
    },

    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: ConfigField, reason: String },

    #[error("no pages detected in PDF")]
    EmptyDocument,

    #[error("could not convert PDF pages to images: {detail}")]
    RasterizationFailed { detail: String },

    #[error("could not OCR page {page}: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    #[error("could not save JSON: {detail}")]
    WriteFailed { detail: String },
}

impl PipelineError {
    /// Build a [`PipelineError::RasterizationFailed`] from a tool error.
    pub fn rasterization(err: &anyhow::Error) -> Self {
        Self::RasterizationFailed {
            detail: format!("{err:#}"),
        }
    }

    /// Build a [`PipelineError::RecognitionFailed`] from a tool error.
    pub fn recognition(page: usize, err: &anyhow::Error) -> Self {
        Self::RecognitionFailed {
            page,
            detail: format!("{err:#}"),
        }
    }

    /// Build a [`PipelineError::WriteFailed`] from an I/O error.
    pub fn write(err: &anyhow::Error) -> Self {
        Self::WriteFailed {
            detail: format!("{err:#}"),
        }
    }
}
