use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use indicatif::{ProgressBar, ProgressStyle};

/// Number of bar updates over a whole run, at most.
const REPORTS_PER_RUN: usize = 400;

const TEMPLATE: &str = concat!(
    "{spinner:.red.bright} {pos}/{len:.dim} [{elapsed_precise}] ",
    "{bar:25} {percent}% {wide_msg}"
);

/// Run-wide completion counter with a throttled progress bar on stderr.
///
/// Workers call [`Progress::advance`] once per finished target. The bar is
/// moved every `total / 400` completions and once more when the last target
/// is done. Bar updates are serialized by their own lock so the bar never
/// moves backwards; the counter itself is never locked.
#[derive(Debug)]
pub struct Progress {
    total: usize,
    step: usize,
    done: AtomicUsize,
    bar: ProgressBar,
    print_lock: Mutex<()>,
}

impl Progress {
    /// Creates a counter for `total` targets, drawing to stderr if `show` is set.
    #[must_use]
    pub fn new(total: usize, show: bool) -> Self {
        let bar = if show {
            let style = ProgressStyle::with_template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            ProgressBar::new(total as u64).with_style(style)
        } else {
            ProgressBar::hidden()
        };
        bar.set_length(total as u64);

        Self {
            total,
            step: (total / REPORTS_PER_RUN).max(1),
            done: AtomicUsize::new(0),
            bar,
            print_lock: Mutex::new(()),
        }
    }

    /// A counter that never draws.
    #[must_use]
    pub fn hidden(total: usize) -> Self {
        Self::new(total, false)
    }

    /// Number of targets finished so far.
    #[must_use]
    pub fn done(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }

    /// Total number of targets in the run.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Records one finished target and returns the new count.
    pub fn advance(&self) -> usize {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        if self.should_report(done) {
            self.report(done);
        }
        done
    }

    fn should_report(&self, done: usize) -> bool {
        done == self.total || done % self.step == 0
    }

    fn report(&self, done: usize) {
        let _guard = self.print_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let position = (done as u64).max(self.bar.position());
        self.bar.set_position(position);
        if position == self.total as u64 {
            self.bar.finish_with_message("done");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Progress;

    #[test]
    fn test_step_is_a_fraction_of_total() {
        assert_eq!(Progress::hidden(10).step, 1);
        assert_eq!(Progress::hidden(400).step, 1);
        assert_eq!(Progress::hidden(4_000).step, 10);
        assert_eq!(Progress::hidden(0).step, 1);
    }

    #[test]
    fn test_reports_on_step_and_completion() {
        let progress = Progress::hidden(1_001);
        // step is 2
        assert!(!progress.should_report(1));
        assert!(progress.should_report(2));
        assert!(!progress.should_report(999));
        assert!(progress.should_report(1_001));
    }

    #[test]
    fn test_bar_follows_throttled_count() {
        let progress = Progress::hidden(1_200);
        assert_eq!(progress.bar.length(), Some(1_200));

        // step is 3
        progress.advance();
        progress.advance();
        assert_eq!(progress.bar.position(), 0);
        progress.advance();
        assert_eq!(progress.bar.position(), 3);
        assert!(!progress.bar.is_finished());
    }

    #[test]
    fn test_bar_finishes_with_last_target() {
        let progress = Progress::hidden(3);
        for _ in 0..3 {
            progress.advance();
        }
        assert_eq!(progress.bar.position(), 3);
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn test_bar_never_moves_backwards() {
        let progress = Progress::hidden(10);
        progress.report(6);
        progress.report(5);
        assert_eq!(progress.bar.position(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_advances_are_counted_once() {
        let progress = Arc::new(Progress::hidden(800));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let progress = Arc::clone(&progress);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        progress.advance();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(progress.done(), 800);
        assert_eq!(progress.bar.position(), 800);
        assert!(progress.bar.is_finished());
    }
}
