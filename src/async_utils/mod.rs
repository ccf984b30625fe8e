//! Asynchronous utilities for use with Tokio.
//!
//! Running external tools and background tasks involves a little boilerplate.
//! We keep it here so the rest of the code can stay focused on OCR.

use std::{any::Any, pin::Pin};

use futures::FutureExt as _;
use tokio::task::JoinHandle;

use crate::prelude::*;

pub mod io;

/// A type alias for a boxed future. This is used to make it easier to work with
/// with complex futures.
pub type BoxedFuture<Output> = Pin<Box<dyn Future<Output = Output> + Send>>;

/// A handle for a background worker. This can be awaited to wait for the
/// worker to complete normally.
pub struct JoinWorker {
    /// The task handle.
    future: BoxedFuture<Result<()>>,
}

impl JoinWorker {
    /// Create a new worker handle from a [`JoinHandle`].
    pub fn from_handle(handle: JoinHandle<()>) -> Self {
        Self {
            future: async move { handle.await.context("could not join task") }.boxed(),
        }
    }

    /// Wait for the worker to complete.
    pub async fn join(self) -> Result<()> {
        self.future.await
    }
}

/// Report any command failures, and include any error output.
///
/// The output of standard error and standard output will be logged at
/// appropriate levels. And standard error may be optionally checked line by
/// line to determine if the command failed, because some tools exit
/// successfully after printing errors.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
    is_error_line: Option<&dyn Fn(&str) -> bool>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );
    // Tesseract chats on stderr even when all is well.
    if !stderr.trim().is_empty() {
        if output.status.success() {
            debug!(
                command_name = command_name,
                output = %stderr,
                "Standard error from command",
            );
        } else {
            warn!(
                command_name = command_name,
                output = %stderr,
                "Standard error from command",
            );
        }
    }

    if output.status.success() {
        if let Some(is_error_line) = is_error_line {
            if let Some(line) = stderr.lines().find(|line| is_error_line(line)) {
                error!(command_name = command_name, %line, "command reported an error");
                return Err(anyhow!(
                    "{} printed error output:\n{}",
                    command_name,
                    stderr,
                ));
            }
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    }
}

/// Get a readable message out of a caught panic.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use std::{os::unix::process::ExitStatusExt as _, process::Output};

    use super::*;

    fn output(code: i32, stderr: &str) -> Output {
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn successful_commands_pass() {
        assert!(check_for_command_failure("tool", &output(0, ""), None).is_ok());
    }

    #[test]
    fn exit_codes_are_reported() {
        let err = check_for_command_failure("tool", &output(2, "bad input"), None)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "tool failed with exit code 2 and error output:\nbad input"
        );
    }

    #[test]
    fn error_lines_catch_quiet_failures() {
        let is_error_line = |line: &str| line.contains("Error");
        let out = output(0, "Syntax Error: broken xref\n");
        assert!(check_for_command_failure("tool", &out, Some(&is_error_line)).is_err());
        let out = output(0, "Syntax Warning: odd font\n");
        assert!(check_for_command_failure("tool", &out, Some(&is_error_line)).is_ok());
    }

    #[test]
    fn routine_stderr_is_not_a_failure() {
        let out = output(0, "Estimating resolution as 300\n");
        assert!(check_for_command_failure("tesseract", &out, None).is_ok());
    }

    #[test]
    fn panic_messages_are_extracted() {
        fn cursed(page: usize) {
            panic!("page {page} is cursed");
        }
        fn odd() {
            std::panic::panic_any(42);
        }
        let payload = std::panic::catch_unwind(|| cursed(3)).unwrap_err();
        assert_eq!(panic_message(&*payload), "page 3 is cursed");
        let payload = std::panic::catch_unwind(odd).unwrap_err();
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
