//! Job settings, and the checks we run on them before doing any real work.

use std::{fmt, fs, num::NonZeroU32, sync::LazyLock};

use regex::Regex;

use crate::{
    error::{ConfigField, PipelineError, Subject},
    prelude::*,
};

/// The language we OCR with when none is given.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// The raster resolution we use when none is given.
pub const DEFAULT_DPI: &str = "300";

/// A single Tesseract language code, like `eng`, `chi_sim` or `script/Latin`.
static LANGUAGE_CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+(/[A-Za-z0-9_]+)*$").expect("failed to compile regex")
});

/// Everything needed to run one OCR job, exactly as the user supplied it.
///
/// Nothing here has been checked yet. See [`JobRequest::resolve`].
#[derive(Clone, Debug)]
pub struct JobRequest {
    /// The PDF to OCR.
    pub pdf_path: PathBuf,
    /// Where to write the JSON results.
    pub out_path: PathBuf,
    /// The `tesseract` executable, if it isn't on `PATH`.
    pub tesseract_path: Option<PathBuf>,
    /// Poppler's `bin` directory, if its tools aren't on `PATH`.
    pub poppler_bin: Option<PathBuf>,
    /// A Tesseract language tag, like `eng` or `eng+vie`.
    pub language: String,
    /// Raster resolution. Kept as text because it usually comes straight from
    /// user input.
    pub dpi: String,
}

impl JobRequest {
    /// Create a request with default language and DPI.
    pub fn new(pdf_path: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            out_path: out_path.into(),
            tesseract_path: None,
            poppler_bin: None,
            language: DEFAULT_LANGUAGE.to_owned(),
            dpi: DEFAULT_DPI.to_owned(),
        }
    }

    /// Check this request against the filesystem and normalize it.
    ///
    /// This only looks at the filesystem. It never runs an external tool, so
    /// missing engines on `PATH` will only be noticed once the job uses them.
    pub fn resolve(&self) -> Result<ResolvedJob, PipelineError> {
        check_readable_file(&self.pdf_path, Subject::Pdf)?;

        let tesseract_path = non_blank_path(self.tesseract_path.as_deref());
        if let Some(path) = &tesseract_path {
            check_readable_file(path, Subject::Recognizer)?;
        }

        let poppler_bin = non_blank_path(self.poppler_bin.as_deref());
        if let Some(dir) = &poppler_bin {
            if !dir.is_dir() {
                return Err(PipelineError::NotFound {
                    subject: Subject::RasterizerDir,
                    path: dir.clone(),
                });
            }
        }

        let dpi = parse_dpi(&self.dpi)?;
        let language = LanguageTag::parse(&self.language)?;

        if self.out_path.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig {
                field: ConfigField::Destination,
                reason: "no output path given".to_owned(),
            });
        }

        Ok(ResolvedJob {
            pdf_path: self.pdf_path.clone(),
            out_path: self.out_path.clone(),
            tesseract_path,
            poppler_bin,
            language,
            dpi,
        })
    }
}

/// A [`JobRequest`] which passed validation.
#[derive(Clone, Debug)]
pub struct ResolvedJob {
    pub pdf_path: PathBuf,
    pub out_path: PathBuf,
    pub tesseract_path: Option<PathBuf>,
    pub poppler_bin: Option<PathBuf>,
    pub language: LanguageTag,
    pub dpi: NonZeroU32,
}

/// A validated Tesseract language tag: one or more codes joined by `+`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguageTag(String);

impl LanguageTag {
    /// Parse a language tag. Blank input means [`DEFAULT_LANGUAGE`].
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self(DEFAULT_LANGUAGE.to_owned()));
        }
        if let Some(bad) = raw
            .split('+')
            .find(|code| !LANGUAGE_CODE_REGEX.is_match(code))
        {
            return Err(PipelineError::InvalidConfig {
                field: ConfigField::Language,
                reason: format!("{bad:?} is not a language code in {raw:?}"),
            });
        }
        Ok(Self(raw.to_owned()))
    }

    /// The individual language codes.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.split('+')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a DPI value, which must be a positive integer.
fn parse_dpi(raw: &str) -> Result<NonZeroU32, PipelineError> {
    raw.trim()
        .parse::<NonZeroU32>()
        .map_err(|_| PipelineError::InvalidConfig {
            field: ConfigField::Dpi,
            reason: format!("{raw:?} is not a positive integer (e.g. 300)"),
        })
}

/// Treat blank optional paths as missing.
fn non_blank_path(path: Option<&Path>) -> Option<PathBuf> {
    path.filter(|p| !p.to_string_lossy().trim().is_empty())
        .map(Path::to_owned)
}

/// Make sure `path` is a file we can open for reading.
fn check_readable_file(path: &Path, subject: Subject) -> Result<(), PipelineError> {
    let readable = path.is_file() && fs::File::open(path).is_ok();
    if readable {
        Ok(())
    } else {
        Err(PipelineError::NotFound {
            subject,
            path: path.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a scratch directory holding an empty `doc.pdf`.
    fn scratch_pdf() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::with_prefix("config").unwrap();
        let pdf = dir.path().join("doc.pdf");
        fs::write(&pdf, b"%PDF-1.4\n").unwrap();
        (dir, pdf)
    }

    #[test]
    fn defaults_resolve() {
        let (dir, pdf) = scratch_pdf();
        let job = JobRequest::new(&pdf, dir.path().join("out.json"))
            .resolve()
            .unwrap();
        assert_eq!(job.dpi.get(), 300);
        assert_eq!(job.language.as_str(), "eng");
        assert!(job.tesseract_path.is_none());
        assert!(job.poppler_bin.is_none());
    }

    #[test]
    fn missing_pdf_is_not_found() {
        let err = JobRequest::new("/no/such/doc.pdf", "out.json")
            .resolve()
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NotFound {
                subject: Subject::Pdf,
                ..
            }
        ));
    }

    #[test]
    fn pdf_path_must_be_a_file() {
        let (dir, _pdf) = scratch_pdf();
        let err = JobRequest::new(dir.path(), "out.json").resolve().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NotFound {
                subject: Subject::Pdf,
                ..
            }
        ));
    }

    #[test]
    fn missing_tesseract_is_not_found() {
        let (dir, pdf) = scratch_pdf();
        let mut request = JobRequest::new(&pdf, "out.json");
        request.tesseract_path = Some(dir.path().join("tesseract.exe"));
        let err = request.resolve().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NotFound {
                subject: Subject::Recognizer,
                ..
            }
        ));
    }

    #[test]
    fn poppler_bin_must_be_a_directory() {
        let (_dir, pdf) = scratch_pdf();
        let mut request = JobRequest::new(&pdf, "out.json");
        request.poppler_bin = Some(pdf.clone());
        let err = request.resolve().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NotFound {
                subject: Subject::RasterizerDir,
                ..
            }
        ));
    }

    #[test]
    fn supplied_engine_locations_are_kept() {
        let (dir, pdf) = scratch_pdf();
        let tesseract = dir.path().join("tesseract");
        fs::write(&tesseract, b"").unwrap();
        let mut request = JobRequest::new(&pdf, "out.json");
        request.tesseract_path = Some(tesseract.clone());
        request.poppler_bin = Some(dir.path().to_owned());
        let job = request.resolve().unwrap();
        assert_eq!(job.tesseract_path.as_deref(), Some(tesseract.as_path()));
        assert_eq!(job.poppler_bin.as_deref(), Some(dir.path()));
    }

    #[test]
    fn blank_engine_locations_mean_use_path() {
        let (_dir, pdf) = scratch_pdf();
        let mut request = JobRequest::new(&pdf, "out.json");
        request.tesseract_path = Some(PathBuf::from("  "));
        request.poppler_bin = Some(PathBuf::new());
        let job = request.resolve().unwrap();
        assert!(job.tesseract_path.is_none());
        assert!(job.poppler_bin.is_none());
    }

    #[test]
    fn dpi_must_be_a_positive_integer() {
        let (_dir, pdf) = scratch_pdf();
        for bad in ["", "0", "-300", "300.5", "abc"] {
            let mut request = JobRequest::new(&pdf, "out.json");
            request.dpi = bad.to_owned();
            let err = request.resolve().unwrap_err();
            assert!(
                matches!(
                    err,
                    PipelineError::InvalidConfig {
                        field: ConfigField::Dpi,
                        ..
                    }
                ),
                "accepted DPI {bad:?}"
            );
        }

        let mut request = JobRequest::new(&pdf, "out.json");
        request.dpi = " 150 ".to_owned();
        assert_eq!(request.resolve().unwrap().dpi.get(), 150);
    }

    #[test]
    fn language_tags() {
        assert_eq!(LanguageTag::parse("").unwrap().as_str(), "eng");
        assert_eq!(LanguageTag::parse(" vie ").unwrap().as_str(), "vie");
        let combined = LanguageTag::parse("eng+chi_sim").unwrap();
        assert_eq!(combined.codes().collect::<Vec<_>>(), ["eng", "chi_sim"]);
        assert_eq!(
            LanguageTag::parse("script/Latin").unwrap().as_str(),
            "script/Latin"
        );
        let scripted = LanguageTag::parse("eng+script/Latin").unwrap();
        assert_eq!(scripted.codes().collect::<Vec<_>>(), ["eng", "script/Latin"]);

        for bad in ["eng+", "+eng", "eng vie", "eng;rm", "script/", "/eng", "a//b"] {
            assert!(
                matches!(
                    LanguageTag::parse(bad),
                    Err(PipelineError::InvalidConfig {
                        field: ConfigField::Language,
                        ..
                    })
                ),
                "accepted language {bad:?}"
            );
        }
    }

    #[test]
    fn blank_destination_is_invalid() {
        let (_dir, pdf) = scratch_pdf();
        let err = JobRequest::new(&pdf, "").resolve().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidConfig {
                field: ConfigField::Destination,
                ..
            }
        ));
    }
}
