//! Background status-line reporter (§4.13).
//!
//! Polls the live-progress map once a second and writes a single line to
//! stderr, in the "stdout for data, stderr for status" convention. Stopped
//! via a shared `AtomicBool`, which the orchestrator sets in a guard
//! surrounding every worker-pool invocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::styling::PROGRESS;
use crate::sync::worker_pool::LiveProgress;

pub struct ProgressMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Spawn the polling thread. Dropping (or calling [`Self::stop`]) the
    /// returned monitor joins it.
    pub fn spawn(progress: Arc<LiveProgress>, jobs_label: &'static str) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_secs(1));
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(line) = render(&progress, jobs_label) {
                    crate::styling::eprintln!("{PROGRESS}{line}{PROGRESS:#}");
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Build the `<jobs_str(n_in_flight)> | <elapsed> <earliest-in-flight project>`
/// status line. Returns `None` when nothing is in flight (nothing to report).
fn render(progress: &LiveProgress, jobs_label: &str) -> Option<String> {
    let snapshot = progress.snapshot();
    if snapshot.is_empty() {
        return None;
    }

    let (earliest_key, earliest_start) = snapshot
        .into_iter()
        .min_by_key(|(_, start)| *start)
        .expect("checked non-empty above");

    let elapsed = Instant::now().saturating_duration_since(earliest_start);
    Some(format!(
        "{jobs_label}({}) | {:.0}s {earliest_key}",
        progress.len(),
        elapsed.as_secs_f64()
    ))
}
