//! Phased sync orchestrator (§4.8): full fetch phase, then full checkout
//! phase.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::sync::errors::{ErrorAggregate, ProjectFailure, SyncError};
use crate::sync::fetch_times::FetchTimeStore;
use crate::sync::gc::{reconcile_precious_objects, run_auto_gc};
use crate::sync::local_state::LocalSyncState;
use crate::sync::options::SyncArgs;
use crate::sync::path_order;
use crate::sync::progress::ProgressMonitor;
use crate::sync::project::{CheckoutOptions, FetchOptions, ManifestProvider, Project, ProjectOps};
use crate::sync::project_list::{save_copy_link_files, save_project_list, CopyLinkFiles};
use crate::sync::ssh::SshProxy;
use crate::sync::worker_pool::{group_by_objdir, run_pool, LiveProgress, WorkItem};

pub fn fetch_options(args: &SyncArgs) -> FetchOptions {
    FetchOptions {
        quiet: false,
        verbose: false,
        current_branch_only: args.current_branch_only(),
        force_sync: args.force_sync,
        clone_bundle: args.clone_bundle && !args.no_clone_bundle,
        tags: args.tags_effective(),
        optimized_fetch: args.optimized_fetch,
        retry_fetches: args.retry_fetches,
        prune: args.prune_effective(),
    }
}

pub fn checkout_options(args: &SyncArgs) -> CheckoutOptions {
    CheckoutOptions {
        detach_head: args.detach,
        force_sync: args.force_sync,
        force_checkout: args.force_checkout,
        force_rebase: args.rebase,
        verbose: false,
    }
}

pub fn run(
    manifest: &dyn ManifestProvider,
    ops: Arc<dyn ProjectOps>,
    args: &SyncArgs,
    jobs_network: u64,
    jobs_checkout: u64,
) -> Result<(), SyncError> {
    let repo_dir = manifest.repo_dir();
    let mut fetch_times = FetchTimeStore::load(&repo_dir);
    let mut local_state = LocalSyncState::load(&repo_dir);

    let mut projects = manifest.projects();
    let mut network_failures: Vec<ProjectFailure> = Vec::new();
    let cancelled = Arc::new(AtomicBool::new(false));

    if args.local_only {
        debug!("--local-only: skipping fetch phase, no SSH proxy acquired");
    } else {
        let ssh = Arc::new(SshProxy::acquire().map_err(|e| SyncError::Unhandled {
            source: e.to_string(),
            aggregate: ErrorAggregate::default(),
        })?);
        let progress = Arc::new(LiveProgress::new());
        let monitor = ProgressMonitor::spawn(Arc::clone(&progress), "net");
        let mut fetched_objdirs: HashSet<String> = HashSet::new();

        sort_by_fetch_time_desc(&mut projects, &fetch_times);
        run_fetch_round(
            &projects,
            &ops,
            &ssh,
            &progress,
            args,
            jobs_network,
            &cancelled,
            &mut fetch_times,
            &mut local_state,
            &mut fetched_objdirs,
            &mut network_failures,
        );

        // Missing-project loop: reload until the missing set stabilizes.
        let mut previous_missing: Option<HashSet<String>> = None;
        loop {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let reloaded = manifest.reload();
            let missing: Vec<Project> = reloaded
                .iter()
                .filter(|p| !fetched_objdirs.contains(&p.objdir.display().to_string()))
                .cloned()
                .collect();
            let missing_keys: HashSet<String> = missing.iter().map(|p| p.objdir.display().to_string()).collect();

            if missing.is_empty() {
                projects = reloaded;
                break;
            }
            if previous_missing.as_ref() == Some(&missing_keys) {
                debug!("missing-project loop: set unchanged, stopping");
                projects = reloaded;
                break;
            }
            info!("missing-project loop: fetching {} newly-discovered project(s)", missing.len());
            run_fetch_round(
                &missing,
                &ops,
                &ssh,
                &progress,
                args,
                jobs_network,
                &cancelled,
                &mut fetch_times,
                &mut local_state,
                &mut fetched_objdirs,
                &mut network_failures,
            );
            previous_missing = Some(missing_keys);
            projects = reloaded;
        }

        let _ = fetch_times.save();
        monitor.stop();
        drop(ssh);
    }

    if args.fail_fast && !network_failures.is_empty() {
        return Err(SyncError::FailFast {
            aggregate: ErrorAggregate {
                network_failures,
                ..Default::default()
            },
        });
    }

    if args.network_only {
        return finish(network_failures, Vec::new(), None, None);
    }

    if args.auto_gc_effective() {
        if let Err(e) = run_auto_gc(ops.as_ref(), &projects, jobs_checkout.max(1), num_cpus()) {
            warn!("auto-gc failed: {e}");
        }
    }
    if let Err(e) = reconcile_precious_objects(ops.as_ref(), &projects) {
        warn!("precious-objects reconciliation failed: {e}");
    }

    let project_list_failure = save_project_list(&repo_dir, ops.as_ref(), &projects, args.force_remove_dirty)
        .err()
        .map(|e| e.to_string());
    let copy_link_failure = save_copy_link_files(&repo_dir, &repo_dir, &CopyLinkFiles::default())
        .err()
        .map(|e| e.to_string());

    let checkout_progress = Arc::new(LiveProgress::new());
    let checkout_monitor = ProgressMonitor::spawn(Arc::clone(&checkout_progress), "checkout");
    let checkout_failures = run_checkout_phase(
        &projects,
        &ops,
        &checkout_progress,
        args,
        jobs_checkout,
        &cancelled,
        &mut local_state,
    );
    checkout_monitor.stop();

    let _ = local_state.prune_removed(&projects);
    let _ = local_state.save();

    finish(network_failures, checkout_failures, project_list_failure, copy_link_failure)
}

fn finish(
    network_failures: Vec<ProjectFailure>,
    checkout_failures: Vec<ProjectFailure>,
    project_list_failure: Option<String>,
    copy_link_failure: Option<String>,
) -> Result<(), SyncError> {
    let aggregate = ErrorAggregate {
        network_failures,
        checkout_failures,
        project_list_failure,
        copy_link_failure,
        generic: Vec::new(),
    };
    if aggregate.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Generic { aggregate })
    }
}

#[allow(clippy::too_many_arguments)]
fn run_fetch_round(
    projects: &[Project],
    ops: &Arc<dyn ProjectOps>,
    ssh: &Arc<SshProxy>,
    progress: &Arc<LiveProgress>,
    args: &SyncArgs,
    jobs_network: u64,
    cancelled: &Arc<AtomicBool>,
    fetch_times: &mut FetchTimeStore,
    local_state: &mut LocalSyncState,
    fetched_objdirs: &mut HashSet<String>,
    network_failures: &mut Vec<ProjectFailure>,
) {
    let projects_arc: Arc<[Project]> = projects.to_vec().into();
    let items = group_by_objdir(projects);
    let opts = fetch_options(args);

    let ops = Arc::clone(ops);
    let ssh = Arc::clone(ssh);
    let progress = Arc::clone(progress);
    let fail_fast = args.fail_fast;
    let cancelled_flag = Arc::clone(cancelled);

    let unit_fn = move |item: &WorkItem| -> Vec<(usize, crate::sync::project::FetchOutcome, f64)> {
        item.indices
            .iter()
            .map(|&idx| {
                let project = &projects_arc[idx];
                let guard = progress.start(project);
                let start = std::time::Instant::now();
                let outcome = ops.fetch_network(project, &opts, &ssh);
                let elapsed = start.elapsed().as_secs_f64();
                drop(guard);
                (idx, outcome, elapsed)
            })
            .collect()
    };

    let results = run_pool(jobs_network, items, unit_fn, |_item, unit_results| {
        let mut ok = true;
        for (_, outcome, _) in unit_results {
            if !outcome.success {
                ok = false;
            }
        }
        if !ok && fail_fast {
            cancelled_flag.store(true, Ordering::Relaxed);
            return false;
        }
        true
    });

    for (item, unit_results) in &results {
        for (idx, outcome, duration) in unit_results {
            let project = &projects[*idx];
            if outcome.success {
                fetch_times.set(&project.name, *duration);
                local_state.set_fetch_time(project);
                fetched_objdirs.insert(item.objdir_key.clone());
            } else {
                network_failures.push(ProjectFailure {
                    relpath: project.relpath.clone(),
                    message: outcome.error.clone().unwrap_or_default(),
                });
            }
        }
    }
}

fn run_checkout_phase(
    projects: &[Project],
    ops: &Arc<dyn ProjectOps>,
    progress: &Arc<LiveProgress>,
    args: &SyncArgs,
    jobs_checkout: u64,
    cancelled: &Arc<AtomicBool>,
    local_state: &mut LocalSyncState,
) -> Vec<ProjectFailure> {
    let mut failures = Vec::new();
    let levels = path_order::resolve(projects);
    let opts = checkout_options(args);

    for level in levels {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        let level_arc: Arc<[Project]> = level.clone().into();
        let items: Vec<WorkItem> = (0..level.len())
            .map(|i| WorkItem {
                objdir_key: level[i].relpath.clone(),
                indices: vec![i],
            })
            .collect();

        let ops_clone = Arc::clone(ops);
        let progress_clone = Arc::clone(progress);
        let opts_clone = opts.clone();
        let fail_fast = args.fail_fast;
        let cancelled_flag = Arc::clone(cancelled);

        let unit_fn = move |item: &WorkItem| -> Vec<(usize, crate::sync::project::CheckoutOutcome)> {
            item.indices
                .iter()
                .map(|&idx| {
                    let project = &level_arc[idx];
                    let guard = progress_clone.start(project);
                    let outcome = ops_clone.checkout_local(project, &opts_clone);
                    drop(guard);
                    (idx, outcome)
                })
                .collect()
        };

        let results = run_pool(jobs_checkout, items, unit_fn, |_item, unit_results| {
            let ok = unit_results.iter().all(|(_, o)| o.success);
            if !ok && fail_fast {
                cancelled_flag.store(true, Ordering::Relaxed);
                return false;
            }
            true
        });

        for (_item, unit_results) in &results {
            for (idx, outcome) in unit_results {
                let project = &level[*idx];
                if outcome.success {
                    local_state.set_checkout_time(project);
                } else {
                    failures.push(ProjectFailure {
                        relpath: project.relpath.clone(),
                        message: outcome.error.clone().unwrap_or_default(),
                    });
                }
            }
        }
    }

    failures
}

fn sort_by_fetch_time_desc(projects: &mut [Project], store: &FetchTimeStore) {
    projects.sort_by(|a, b| {
        store
            .get(&b.name)
            .partial_cmp(&store.get(&a.name))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn num_cpus() -> u64 {
    std::thread::available_parallelism().map(|n| n.get() as u64).unwrap_or(1)
}
