//! Interleaved sync orchestrator (§4.9): fetch+checkout fused per project,
//! to minimize wall-clock time instead of running two global phases.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::sync::errors::{ErrorAggregate, ProjectFailure, SyncError};
use crate::sync::fetch_times::FetchTimeStore;
use crate::sync::gc::{reconcile_precious_objects, run_auto_gc};
use crate::sync::local_state::LocalSyncState;
use crate::sync::options::SyncArgs;
use crate::sync::path_order;
use crate::sync::phased::{checkout_options, fetch_options};
use crate::sync::progress::ProgressMonitor;
use crate::sync::project::{ManifestProvider, Project, ProjectOps};
use crate::sync::project_list::{save_copy_link_files, save_project_list, CopyLinkFiles};
use crate::sync::ssh::SshProxy;
use crate::sync::worker_pool::{group_by_objdir, run_pool, LiveProgress, WorkItem};

struct UnitResult {
    idx: usize,
    fetch_success: bool,
    fetch_error: Option<String>,
    checkout_success: bool,
    checkout_error: Option<String>,
    fetch_duration: f64,
}

pub fn run(manifest: &dyn ManifestProvider, ops: Arc<dyn ProjectOps>, args: &SyncArgs, jobs: u64) -> Result<(), SyncError> {
    let repo_dir = manifest.repo_dir();
    let mut fetch_times = FetchTimeStore::load(&repo_dir);
    let mut local_state = LocalSyncState::load(&repo_dir);

    let ssh: Option<Arc<SshProxy>> = if args.local_only {
        debug!("--local-only: skipping fetch phase, no SSH proxy acquired");
        None
    } else {
        Some(Arc::new(SshProxy::acquire().map_err(|e| SyncError::Unhandled {
            source: e.to_string(),
            aggregate: ErrorAggregate::default(),
        })?))
    };
    let progress = Arc::new(LiveProgress::new());
    let monitor = ProgressMonitor::spawn(Arc::clone(&progress), "sync");
    let cancelled = Arc::new(AtomicBool::new(false));

    let mut network_failures: Vec<ProjectFailure> = Vec::new();
    let mut checkout_failures: Vec<ProjectFailure> = Vec::new();
    let mut synced: HashSet<String> = HashSet::new();
    let mut previous_to_sync: Option<HashSet<String>> = None;
    let mut stalled = false;

    loop {
        let all_projects = manifest.reload();
        let to_sync: Vec<Project> = all_projects
            .iter()
            .filter(|p| !synced.contains(&p.relpath))
            .cloned()
            .collect();

        if to_sync.is_empty() {
            break;
        }

        let to_sync_keys: HashSet<String> = to_sync.iter().map(|p| p.relpath.clone()).collect();
        if previous_to_sync.as_ref() == Some(&to_sync_keys) {
            warn!("interleaved sync stalled: {} project(s) never completed", to_sync.len());
            stalled = true;
            break;
        }
        previous_to_sync = Some(to_sync_keys);

        let levels = path_order::resolve(&to_sync);
        for level in levels {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            run_level(
                &level,
                &ops,
                &ssh,
                &progress,
                args,
                jobs,
                &cancelled,
                &mut fetch_times,
                &mut local_state,
                &mut synced,
                &mut network_failures,
                &mut checkout_failures,
            );
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
        }
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
    }

    let _ = fetch_times.save();
    monitor.stop();
    drop(ssh);

    if !args.network_only {
        let all_projects = manifest.reload();
        if args.auto_gc_effective() {
            if let Err(e) = run_auto_gc(ops.as_ref(), &all_projects, jobs.max(1), num_cpus()) {
                warn!("auto-gc failed: {e}");
            }
        }
        if let Err(e) = reconcile_precious_objects(ops.as_ref(), &all_projects) {
            warn!("precious-objects reconciliation failed: {e}");
        }
        let project_list_failure = save_project_list(&repo_dir, ops.as_ref(), &all_projects, args.force_remove_dirty)
            .err()
            .map(|e| e.to_string());
        let copy_link_failure = save_copy_link_files(&repo_dir, &repo_dir, &CopyLinkFiles::default())
            .err()
            .map(|e| e.to_string());

        local_state.prune_removed(&all_projects);
        let _ = local_state.save();

        if stalled {
            return Err(SyncError::Generic {
                aggregate: ErrorAggregate {
                    network_failures,
                    checkout_failures,
                    project_list_failure,
                    copy_link_failure,
                    generic: vec!["interleaved sync stalled: project set did not shrink between iterations".into()],
                },
            });
        }

        let aggregate = ErrorAggregate {
            network_failures,
            checkout_failures,
            project_list_failure,
            copy_link_failure,
            generic: Vec::new(),
        };
        if aggregate.is_empty() {
            return Ok(());
        }
        if args.fail_fast {
            return Err(SyncError::FailFast { aggregate });
        }
        return Err(SyncError::Generic { aggregate });
    }

    local_state.prune_removed(&manifest.reload());
    let _ = local_state.save();

    if stalled {
        return Err(SyncError::Generic {
            aggregate: ErrorAggregate {
                network_failures,
                generic: vec!["interleaved sync stalled".into()],
                ..Default::default()
            },
        });
    }
    if network_failures.is_empty() {
        Ok(())
    } else if args.fail_fast {
        Err(SyncError::FailFast {
            aggregate: ErrorAggregate {
                network_failures,
                ..Default::default()
            },
        })
    } else {
        Err(SyncError::Generic {
            aggregate: ErrorAggregate {
                network_failures,
                ..Default::default()
            },
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn run_level(
    level: &[Project],
    ops: &Arc<dyn ProjectOps>,
    ssh: &Option<Arc<SshProxy>>,
    progress: &Arc<LiveProgress>,
    args: &SyncArgs,
    jobs: u64,
    cancelled: &Arc<AtomicBool>,
    fetch_times: &mut FetchTimeStore,
    local_state: &mut LocalSyncState,
    synced: &mut HashSet<String>,
    network_failures: &mut Vec<ProjectFailure>,
    checkout_failures: &mut Vec<ProjectFailure>,
) {
    let level_arc: Arc<[Project]> = level.to_vec().into();
    let items = group_by_objdir(level);

    let ops_clone = Arc::clone(ops);
    let ssh_clone = ssh.clone();
    let progress_clone = Arc::clone(progress);
    let fetch_opts = fetch_options(args);
    let checkout_opts = checkout_options(args);
    let local_only = args.local_only;
    let network_only = args.network_only;
    let fail_fast = args.fail_fast;
    let cancelled_flag = Arc::clone(cancelled);

    let unit_fn = move |item: &WorkItem| -> Vec<UnitResult> {
        item.indices
            .iter()
            .map(|&idx| {
                let project = &level_arc[idx];
                let guard = progress_clone.start(project);

                let (fetch_success, fetch_error, fetch_duration) = if local_only {
                    (true, None, 0.0)
                } else {
                    let start = std::time::Instant::now();
                    let proxy = ssh_clone.as_ref().expect("ssh proxy required when not local-only");
                    let outcome = ops_clone.fetch_network(project, &fetch_opts, proxy);
                    (outcome.success, outcome.error, start.elapsed().as_secs_f64())
                };

                let (checkout_success, checkout_error) = if !fetch_success || network_only {
                    (fetch_success, None)
                } else {
                    let outcome = ops_clone.checkout_local(project, &checkout_opts);
                    (outcome.success, outcome.error)
                };

                drop(guard);
                UnitResult {
                    idx,
                    fetch_success,
                    fetch_error,
                    checkout_success,
                    checkout_error,
                    fetch_duration,
                }
            })
            .collect()
    };

    let results = run_pool(jobs, items, unit_fn, |_item, unit_results| {
        let ok = unit_results.iter().all(|r| r.fetch_success && r.checkout_success);
        if !ok && fail_fast {
            cancelled_flag.store(true, Ordering::Relaxed);
            return false;
        }
        true
    });

    for (_item, unit_results) in &results {
        for r in unit_results {
            let project = &level[r.idx];
            if r.fetch_success {
                fetch_times.set(&project.name, r.fetch_duration);
                local_state.set_fetch_time(project);
            } else {
                network_failures.push(ProjectFailure {
                    relpath: project.relpath.clone(),
                    message: r.fetch_error.clone().unwrap_or_default(),
                });
            }

            if r.fetch_success && r.checkout_success {
                local_state.set_checkout_time(project);
                synced.insert(project.relpath.clone());
            } else if r.fetch_success {
                checkout_failures.push(ProjectFailure {
                    relpath: project.relpath.clone(),
                    message: r.checkout_error.clone().unwrap_or_default(),
                });
            }
        }
    }
    debug!("level of {} project(s) processed", level.len());
}

fn num_cpus() -> u64 {
    std::thread::available_parallelism().map(|n| n.get() as u64).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::project::{test_project, StaticManifestProvider};
    use std::sync::Mutex;

    struct FakeOps {
        fetch_calls: Mutex<Vec<String>>,
        checkout_order: Mutex<Vec<String>>,
    }

    impl ProjectOps for FakeOps {
        fn fetch_network(
            &self,
            project: &Project,
            _opts: &crate::sync::project::FetchOptions,
            _ssh: &SshProxy,
        ) -> crate::sync::project::FetchOutcome {
            self.fetch_calls.lock().unwrap().push(project.name.clone());
            crate::sync::project::FetchOutcome {
                success: true,
                remote_fetched: true,
                error: None,
                captured_output: String::new(),
            }
        }
        fn checkout_local(
            &self,
            project: &Project,
            _opts: &crate::sync::project::CheckoutOptions,
        ) -> crate::sync::project::CheckoutOutcome {
            self.checkout_order.lock().unwrap().push(project.relpath.clone());
            crate::sync::project::CheckoutOutcome {
                success: true,
                error: None,
                captured_output: String::new(),
            }
        }
        fn delete_worktree(
            &self,
            _p: &Project,
            _v: bool,
            _f: bool,
        ) -> Result<(), crate::sync::project::DeleteWorktreeError> {
            Ok(())
        }
        fn set_precious_objects(&self, _p: &Project, _e: bool) -> anyhow::Result<()> {
            Ok(())
        }
        fn run_gc(&self, _o: &std::path::Path, _a: bool, _c: &crate::sync::project::GcConfig) -> anyhow::Result<()> {
            Ok(())
        }
        fn pack_refs(&self, _o: &std::path::Path, _c: &crate::sync::project::GcConfig) -> anyhow::Result<()> {
            Ok(())
        }
        fn last_fetch_timestamp(&self, _p: &Project) -> Option<f64> {
            None
        }
    }

    fn args() -> SyncArgs {
        use clap::Parser;
        #[derive(Parser)]
        struct H {
            #[command(flatten)]
            a: SyncArgs,
        }
        H::parse_from(["sync"]).a
    }

    #[test]
    fn test_interleaved_completes_with_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        let a = test_project("a", "a", "/o1");
        let b = test_project("b", "b", "/o1");
        let c = test_project("c", "c", "/o2");
        let provider = StaticManifestProvider::new(vec![a, b, c], dir.path().to_path_buf());
        let ops: Arc<dyn ProjectOps> = Arc::new(FakeOps {
            fetch_calls: Mutex::new(Vec::new()),
            checkout_order: Mutex::new(Vec::new()),
        });

        let result = run(&provider, ops, &args(), 4);
        assert!(result.is_ok());
    }

    #[test]
    fn test_interleaved_checks_out_parent_before_child() {
        let dir = tempfile::tempdir().unwrap();
        let x = test_project("x", "x", "/o");
        let y = test_project("y", "x/y", "/o");
        let provider = StaticManifestProvider::new(vec![y, x], dir.path().to_path_buf());
        let fake = Arc::new(FakeOps {
            fetch_calls: Mutex::new(Vec::new()),
            checkout_order: Mutex::new(Vec::new()),
        });
        let ops: Arc<dyn ProjectOps> = fake.clone();

        run(&provider, ops, &args(), 4).unwrap();

        let order = fake.checkout_order.lock().unwrap();
        let pos_x = order.iter().position(|r| r == "x").unwrap();
        let pos_y = order.iter().position(|r| r == "x/y").unwrap();
        assert!(pos_x < pos_y);
    }
}
