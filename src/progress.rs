use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Thread-safe completion counter with an optional terminal bar.
pub struct ProgressTracker {
    total: usize,
    current: AtomicUsize,
    started: Instant,
    bar: ProgressBar,
    quiet: bool,
}

impl ProgressTracker {
    pub fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::hidden())
        } else {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::with_template(
                "[{bar:40.cyan/blue}] {percent:>3}% ({pos}/{len}) ETA: {eta}",
            ) {
                bar.set_style(style.progress_chars("█░ "));
            }
            bar
        };
        Self {
            total,
            current: AtomicUsize::new(0),
            started: Instant::now(),
            bar,
            quiet,
        }
    }

    pub fn hidden(total: usize) -> Self {
        Self::new(total, true)
    }

    pub fn increment(&self) -> usize {
        let n = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.inc(1);
        n
    }

    pub fn completed(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Rough remaining time from the average rate so far.
    pub fn eta(&self) -> Option<Duration> {
        let done = self.completed();
        if done == 0 {
            return None;
        }
        let per_item = self.elapsed().as_secs_f64() / done as f64;
        let remaining = self.total.saturating_sub(done) as f64;
        Some(Duration::from_secs_f64(per_item * remaining))
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
        if !self.quiet {
            println!("Completed {} items in {:.2}s", self.total, self.elapsed().as_secs_f64());
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total", &self.total)
            .field("completed", &self.completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_from_many_threads() {
        let tracker = Arc::new(ProgressTracker::hidden(64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let t = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..8 {
                        t.increment();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.completed(), 64);
        assert_eq!(tracker.eta(), Some(Duration::ZERO));
    }

    #[test]
    fn no_eta_before_first_completion() {
        assert!(ProgressTracker::hidden(3).eta().is_none());
    }
}
