//! Bounded parallel executor shared by the phased and interleaved
//! orchestrators.
//!
//! A work item is a list of project indices that share an `objdir`: they run
//! serially, one after another, inside a single unit — but distinct units
//! run in parallel across the pool, bounded by `jobs`. This mirrors the
//! `chunksize=1` requirement: a slow unit never blocks dispatch of the next
//! one to an idle worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::sync::project::{Project, ProjectOps};
use crate::sync::ssh::SshProxy;

/// Context visible to every worker: the full project list, the SSH proxy,
/// and the live-progress map. Passed explicitly rather than through globals
/// (worker-context smuggling), since a thread pool has no implicit
/// fork-inherited state to rely on.
pub struct SyncContext {
    pub projects: Arc<[Project]>,
    pub ssh: Arc<SshProxy>,
    pub progress: Arc<LiveProgress>,
    pub ops: Arc<dyn ProjectOps>,
    pub cancelled: Arc<AtomicBool>,
}

/// One unit of work: a set of project indices sharing an `objdir`, to be run
/// serially by whichever worker picks up this unit.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub objdir_key: String,
    pub indices: Vec<usize>,
}

/// Runs `work_items` across a bounded pool of `jobs` workers, invoking
/// `unit_fn` once per item and `callback` on the calling thread after each
/// item completes. `callback` returning `false` closes the pool: no further
/// items are dispatched, though already-running units complete (fail-fast).
///
/// Mirrors `rayon::scope`'s flat parallelism: one work queue shared by all
/// threads, rather than nested per-unit parallelism, so a slow unit cannot
/// starve the pool below its configured concurrency.
pub fn run_pool<T, F>(
    jobs: u64,
    work_items: Vec<WorkItem>,
    unit_fn: F,
    mut callback: impl FnMut(&WorkItem, &T) -> bool,
) -> Vec<(WorkItem, T)>
where
    T: Send + 'static,
    F: Fn(&WorkItem) -> T + Send + Sync + 'static,
{
    let jobs = jobs.max(1) as usize;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .expect("failed to build worker pool");

    let unit_fn = Arc::new(unit_fn);
    let (tx, rx) = crossbeam_channel::unbounded();

    let mut pending = work_items.into_iter();
    let mut in_flight = 0usize;
    let mut dispatch = |item: WorkItem| {
        let tx = tx.clone();
        let unit_fn = Arc::clone(&unit_fn);
        pool.spawn(move || {
            let result = unit_fn(&item);
            let _ = tx.send((item, result));
        });
    };

    // Keep exactly `jobs` units in flight at a time. Dispatch decisions all
    // happen on this single thread, synchronously with the callback, so
    // fail-fast is exact: once the callback says stop, nothing further is
    // ever handed to the pool — no race with already-queued work, because
    // nothing is queued ahead of being needed (chunksize=1).
    for item in pending.by_ref().take(jobs) {
        dispatch(item);
        in_flight += 1;
    }

    let mut results = Vec::new();
    let mut closed = false;
    while in_flight > 0 {
        let (item, result) = rx.recv().expect("a dispatched unit always replies");
        in_flight -= 1;
        let keep_going = callback(&item, &result);
        results.push((item, result));

        if !keep_going {
            closed = true;
        }
        if !closed && let Some(next) = pending.next() {
            dispatch(next);
            in_flight += 1;
        }
    }
    results
}

/// Shared mapping from `"<name> @ <relpath>"` to the start time of an
/// in-flight operation, read by the progress monitor and written by workers.
#[derive(Default)]
pub struct LiveProgress {
    inner: dashmap::DashMap<String, std::time::Instant>,
}

impl LiveProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, project: &Project) -> ProgressGuard<'_> {
        let key = format!("{} @ {}", project.name, project.relpath);
        self.inner.insert(key.clone(), std::time::Instant::now());
        ProgressGuard { map: self, key }
    }

    pub fn snapshot(&self) -> Vec<(String, std::time::Instant)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Removes the project's entry from the live-progress map when the worker
/// returns, including on panic unwind.
pub struct ProgressGuard<'a> {
    map: &'a LiveProgress,
    key: String,
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.map.inner.remove(&self.key);
    }
}

/// Group project indices by `objdir`, preserving first-seen order — the
/// "first project encountered owns the unit" convention also used by the GC
/// reconciler's ownership-by-iteration-order rule.
pub fn group_by_objdir(projects: &[Project]) -> Vec<WorkItem> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<usize>> = std::collections::HashMap::new();

    for (idx, project) in projects.iter().enumerate() {
        let key = project.objdir.display().to_string();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(idx);
    }

    order
        .into_iter()
        .map(|key| {
            let indices = groups.remove(&key).unwrap();
            WorkItem { objdir_key: key, indices }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::project::test_project;
    use std::sync::Mutex;

    #[test]
    fn test_group_by_objdir() {
        let projects = vec![
            test_project("a", "a", "/o1"),
            test_project("b", "b", "/o1"),
            test_project("c", "c", "/o2"),
        ];
        let items = group_by_objdir(&projects);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].indices, vec![0, 1]);
        assert_eq!(items[1].indices, vec![2]);
    }

    #[test]
    fn test_run_pool_serializes_within_unit_parallelizes_across() {
        // Two units sharing no objdir run concurrently; this asserts the
        // pool does invoke unit_fn once per item and collects every result.
        let items = vec![
            WorkItem { objdir_key: "o1".into(), indices: vec![0, 1] },
            WorkItem { objdir_key: "o2".into(), indices: vec![2] },
        ];
        let seen = Mutex::new(Vec::new());
        let results = run_pool(
            4,
            items,
            |item| item.indices.len(),
            |item, count| {
                seen.lock().unwrap().push((item.objdir_key.clone(), *count));
                true
            },
        );
        assert_eq!(results.len(), 2);
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![("o1".to_string(), 2), ("o2".to_string(), 1)]);
    }

    #[test]
    fn test_fail_fast_closes_pool() {
        let items: Vec<WorkItem> = (0..8)
            .map(|i| WorkItem { objdir_key: format!("o{i}"), indices: vec![i] })
            .collect();
        let dispatched = std::sync::atomic::AtomicUsize::new(0);
        let results = run_pool(
            1,
            items,
            |_item| {
                dispatched.fetch_add(1, Ordering::SeqCst);
            },
            |_item, _| false,
        );
        // At least the first unit ran; fail-fast must not dispatch all 8.
        assert!(!results.is_empty());
        assert!(results.len() < 8);
    }

    #[test]
    fn test_live_progress_guard_removes_on_drop() {
        let progress = LiveProgress::new();
        let project = test_project("p", "p", "/o");
        {
            let _guard = progress.start(&project);
            assert_eq!(progress.len(), 1);
        }
        assert_eq!(progress.len(), 0);
    }
}
