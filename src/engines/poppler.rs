//! Rasterizing PDFs with Poppler's `pdfinfo` and `pdftocairo`.

use std::{collections::BTreeMap, num::NonZeroU32, sync::LazyLock};

use regex::Regex;
use tokio::process::Command;

use super::{RasterPage, RasterizedDocument, Rasterizer, tool_path};
use crate::{async_utils::check_for_command_failure, prelude::*};

/// A default error regex for checking command output.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Errors which Poppler recovers from on its own.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Rasterizer wrapping Poppler's command-line tools.
pub struct PopplerRasterizer {
    /// Poppler's `bin` directory, or `None` to search `PATH`.
    bin_dir: Option<PathBuf>,
}

impl PopplerRasterizer {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir }
    }

    /// Get the number of pages in a PDF file.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    async fn page_count(&self, path: &Path) -> Result<usize> {
        let pdfinfo = tool_path(self.bin_dir.as_deref(), "pdfinfo");
        let output = Command::new(&pdfinfo)
            .arg(path)
            .output()
            .await
            .with_context(|| format!("failed to run {:?}", pdfinfo.display()))?;
        check_for_command_failure("pdfinfo", &output, None)?;
        let output = String::from_utf8(output.stdout)
            .context("pdfinfo output was not valid UTF-8")?;
        parse_page_count(&output)
            .with_context(|| format!("failed to get page count for {:?}", path.display()))
    }
}

#[async_trait]
impl Rasterizer for PopplerRasterizer {
    #[instrument(level = "debug", skip_all, fields(path = %pdf_path.display(), dpi))]
    async fn rasterize(
        &self,
        pdf_path: &Path,
        dpi: NonZeroU32,
    ) -> Result<RasterizedDocument> {
        let mime_type = get_mime_type(pdf_path)?;
        if mime_type != "application/pdf" {
            return Err(anyhow!(
                "{:?} is not a PDF (detected {})",
                pdf_path.display(),
                mime_type
            ));
        }

        let total_pages = self.page_count(pdf_path).await?;
        debug!(total_pages, "counted PDF pages");
        if total_pages == 0 {
            return Ok(RasterizedDocument::new(None, vec![]));
        }

        // Create a temporary directory to hold the PNG files.
        let tmpdir = tempfile::TempDir::with_prefix("pages")?;

        // pdftocairo will append zero-padded page numbers to this, so the
        // files sort in page order.
        let out_root = tmpdir.path().join("page");
        let pdftocairo = tool_path(self.bin_dir.as_deref(), "pdftocairo");
        let output = Command::new(&pdftocairo)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(pdf_path)
            .arg(&out_root)
            .output()
            .await
            .with_context(|| format!("failed to run {:?}", pdftocairo.display()))?;
        check_for_command_failure("pdftocairo", &output, Some(&is_error_line))?;

        let mut paths = tmpdir
            .path()
            .read_dir()
            .with_context(|| {
                format!(
                    "failed to read temporary directory {:?}",
                    tmpdir.path().display()
                )
            })?
            .map(|entry| {
                let entry = entry.context("failed to read temporary directory entry")?;
                Ok(entry.path())
            })
            .collect::<Result<Vec<_>>>()?;
        paths.sort();

        if paths.len() != total_pages {
            return Err(anyhow!(
                "pdftocairo produced {} images for {} pages",
                paths.len(),
                total_pages
            ));
        }

        let pages = paths.into_iter().map(|path| RasterPage { path }).collect();
        Ok(RasterizedDocument::new(Some(tmpdir), pages))
    }
}

/// Parse the page count out of `pdfinfo` output.
fn parse_page_count(output: &str) -> Result<usize> {
    let mut properties = BTreeMap::new();
    for line in output.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        properties.insert(key, value);
    }
    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str
        .parse::<usize>()
        .with_context(|| format!("bad page count {:?} in pdfinfo output", page_count_str))
}

/// Get the MIME type of a file.
fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown file type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}
