//! Progress callbacks from a running job.

use std::panic::{AssertUnwindSafe, catch_unwind};

use indicatif::ProgressBar;

use crate::{async_utils::panic_message, prelude::*};

/// Receives `(completed, total)` page counts from a running job.
///
/// Calls are made synchronously from the job's task, so implementations
/// should return quickly. `(0, 1)` means the job failed. A call where
/// `completed == total` after the last page means the job is finished.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, completed: usize, total: usize);
}

impl<F> ProgressReporter for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Shows job progress on an [`indicatif`] progress bar.
pub struct BarReporter(pub ProgressBar);

impl ProgressReporter for BarReporter {
    fn report(&self, completed: usize, total: usize) {
        self.0.set_length(total as u64);
        self.0.set_position(completed as u64);
    }
}

/// Call `reporter`, containing any panic so it can't take the job down with
/// it. Returns the panic message, if there was one.
pub(crate) fn report_contained(
    reporter: &dyn ProgressReporter,
    completed: usize,
    total: usize,
) -> Option<String> {
    match catch_unwind(AssertUnwindSafe(|| reporter.report(completed, total))) {
        Ok(()) => None,
        Err(payload) => {
            let message = panic_message(&*payload);
            error!(completed, total, %message, "progress observer panicked");
            Some(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn closures_are_reporters() {
        let calls = Mutex::new(vec![]);
        let reporter = |done: usize, total: usize| calls.lock().unwrap().push((done, total));
        assert!(report_contained(&reporter, 1, 2).is_none());
        assert!(report_contained(&reporter, 2, 2).is_none());
        assert_eq!(*calls.lock().unwrap(), [(1, 2), (2, 2)]);
    }

    #[test]
    fn panicking_reporters_are_contained() {
        fn reporter(_completed: usize, _total: usize) {
            panic!("redraw failed");
        }
        let message = report_contained(&reporter, 1, 1);
        assert_eq!(message.as_deref(), Some("redraw failed"));
    }

    #[test]
    fn progress_bars_track_totals() {
        let pb = ProgressBar::hidden();
        BarReporter(pb.clone()).report(2, 5);
        assert_eq!(pb.length(), Some(5));
        assert_eq!(pb.position(), 2);
    }
}
