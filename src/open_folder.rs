//! Showing the user where their output went.

use tokio::process::Command;

use crate::prelude::*;

/// The platform's "open this with the default app" command.
fn opener() -> &'static str {
    if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// The folder containing `path`.
pub fn containing_folder(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
        _ => PathBuf::from("."),
    }
}

/// Open the folder containing `path` in the platform's file browser.
///
/// This is a convenience only. Failures are logged and otherwise ignored.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn open_containing_folder(path: &Path) {
    let folder = containing_folder(path);
    match run_opener(Command::new(opener()).arg(&folder)).await {
        Ok(()) => debug!(folder = %folder.display(), "opened output folder"),
        Err(err) => warn!(
            folder = %folder.display(),
            "could not open output folder: {:#}",
            err
        ),
    }
}

/// Run an opener command. These hand off to the file browser and exit
/// promptly, so we wait for them to see whether they worked.
async fn run_opener(command: &mut Command) -> Result<()> {
    let status = command
        .status()
        .await
        .context("could not run opener")?;
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("opener exited with {}", status))
    }
}
