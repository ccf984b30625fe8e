//! Tesseract OCR engine.

use tokio::{process::Command, sync::OnceCell};

use super::{RasterPage, Recognizer};
use crate::{async_utils::check_for_command_failure, config::LanguageTag, prelude::*};

/// OCR engine wrapping the `tesseract` CLI tool.
pub struct TesseractRecognizer {
    /// The executable to run.
    command: PathBuf,
    /// Languages installed for `command`. Looked up on first use.
    installed_languages: OnceCell<Vec<String>>,
}

impl TesseractRecognizer {
    /// Create a new `tesseract` engine. If `command` is `None`, we run
    /// `tesseract` from `PATH`.
    pub fn new(command: Option<PathBuf>) -> Self {
        Self {
            command: command.unwrap_or_else(|| PathBuf::from("tesseract")),
            installed_languages: OnceCell::new(),
        }
    }

    /// Check that `tesseract` runs, and find out which languages it has.
    ///
    /// This only runs once per engine. If it fails, we'll try again next time.
    async fn installed_languages(&self) -> Result<&[String]> {
        let languages = self
            .installed_languages
            .get_or_try_init(|| async {
                let version = self.run(&["--version"]).await?;
                info!(
                    command = %self.command.display(),
                    version = %version.lines().next().unwrap_or("unknown").trim(),
                    "found tesseract"
                );
                let listing = self.run(&["--list-langs"]).await?;
                let languages = parse_language_list(&listing);
                debug!(?languages, "installed tesseract languages");
                Ok::<_, anyhow::Error>(languages)
            })
            .await?;
        Ok(languages)
    }

    /// Run `tesseract` with `args`, returning everything it printed.
    ///
    /// Older versions print `--version` and `--list-langs` output on standard
    /// error, so we return both streams.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.command)
            .args(args)
            .output()
            .await
            .with_context(|| format!("cannot run {:?}", self.command.display()))?;
        check_for_command_failure("tesseract", &output, None)?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    #[instrument(level = "debug", skip_all, fields(path = %page.path.display(), %language))]
    async fn recognize(&self, page: &RasterPage, language: &LanguageTag) -> Result<String> {
        let installed = self.installed_languages().await?;
        if let Some(missing) = language
            .codes()
            .find(|code| !installed.iter().any(|lang| lang == code))
        {
            return Err(anyhow!(
                "tesseract language {:?} is not installed (available: {})",
                missing,
                installed.join(", ")
            ));
        }

        let output = Command::new(&self.command)
            .arg(&page.path)
            .arg("stdout")
            .arg("-l")
            .arg(language.as_str())
            .output()
            .await
            .with_context(|| format!("cannot run {:?}", self.command.display()))?;
        check_for_command_failure("tesseract", &output, None)?;
        String::from_utf8(output.stdout).context("tesseract output was not valid UTF-8")
    }
}

/// Parse `tesseract --list-langs` output.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(str::to_owned)
        .collect()
}
