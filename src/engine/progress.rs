//! Progress counter for imported records

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

use crate::worker::consumer::BatchCallback;

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a counter for unknown total (shows count without percentage)
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " docs"
    )))
}

/// Update progress bar if available
/// Uses try_lock to avoid blocking consumers; a contended update is skipped.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Force a refresh of the bar (e.g. after the last batch).
pub fn refresh_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.refresh();
    }
}

/// Batch callback feeding the bar, for consumers.
pub fn progress_callback(bar: &Option<ProgressBar>) -> Option<BatchCallback> {
    bar.as_ref().map(|bar| {
        let bar = Arc::clone(bar);
        Arc::new(move |n: usize| update_progress_bar(&bar, n)) as BatchCallback
    })
}
