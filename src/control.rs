use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-page progress of a run.
pub trait ProgressSink: Send + Sync {
    fn page_started(&self, _page: u32) {}

    fn page_done(&self, rows_so_far: usize, quota: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn page_done(&self, rows_so_far: usize, quota: usize) {
        self(rows_so_far, quota)
    }
}

pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn page_done(&self, _rows_so_far: usize, _quota: usize) {}
}

pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

impl ProgressSink for LogProgress {
    fn page_started(&self, page: u32) {
        info!("{}: scraping page {}", self.label, page);
    }

    fn page_done(&self, rows_so_far: usize, quota: usize) {
        let percent = (rows_so_far.min(quota) * 100) / quota.max(1);
        info!("{}: {}/{} rows ({}%)", self.label, rows_so_far, quota, percent);
    }
}

// Checked before each page is fetched
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn clones_share_cancellation() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn closures_are_progress_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |rows: usize, quota: usize| seen.lock().unwrap().push((rows, quota));
        sink.page_started(1);
        sink.page_done(10, 12);
        assert_eq!(*seen.lock().unwrap(), vec![(10, 12)]);
    }
}
