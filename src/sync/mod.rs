//! Multi-repository synchronization engine.

pub mod errors;
pub mod fetch_times;
pub mod gc;
pub mod interleaved;
pub mod jobs;
pub mod local_state;
pub mod ops;
pub mod options;
pub mod path_order;
pub mod phased;
pub mod progress;
pub mod project;
pub mod project_list;
pub mod ssh;
pub mod worker_pool;

use std::sync::Arc;

use crate::config::GitfleetConfig;
use crate::sync::errors::SyncError;
use crate::sync::jobs::{current_soft_nofile_limit, JobCounts};
use crate::sync::options::SyncArgs;
use crate::sync::project::{ManifestProvider, ProjectOps};

pub use jobs::current_soft_nofile_limit as soft_nofile_limit;

/// Top-level entry point: validates flags, derives job counts, and
/// dispatches to the phased or interleaved orchestrator.
pub fn run(
    manifest: &dyn ManifestProvider,
    ops: Arc<dyn ProjectOps>,
    args: &SyncArgs,
    config: &GitfleetConfig,
) -> Result<(), SyncError> {
    args.validate().map_err(|e| SyncError::Unhandled {
        source: e.to_string(),
        aggregate: errors::ErrorAggregate::default(),
    })?;

    if args.force_broken {
        log::warn!("--force-broken is obsolete and has no effect");
    }

    let cpu_count = std::thread::available_parallelism().map(|n| n.get() as u64).unwrap_or(1);
    let (counts, warnings) = JobCounts::derive(
        args.jobs,
        args.jobs_network,
        args.jobs_checkout,
        config.jobs,
        cpu_count,
        Some(current_soft_nofile_limit()),
    );
    for warning in warnings {
        log::warn!(
            "{} was set to {}, an unusually large value; effective concurrency is clamped",
            warning.flag,
            warning.value
        );
    }

    let mut args = args.clone();
    if !args.fail_fast && config.fail_fast {
        args.fail_fast = true;
    }
    if !args.auto_gc && config.auto_gc {
        args.auto_gc = true;
    }

    if args.interleaved {
        interleaved::run(manifest, ops, &args, counts.jobs)
    } else {
        phased::run(manifest, ops, &args, counts.jobs_network, counts.jobs_checkout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::project::{test_project, StaticManifestProvider};

    struct NoopOps;
    impl ProjectOps for NoopOps {
        fn fetch_network(
            &self,
            _p: &project::Project,
            _o: &project::FetchOptions,
            _s: &ssh::SshProxy,
        ) -> project::FetchOutcome {
            project::FetchOutcome {
                success: true,
                remote_fetched: true,
                error: None,
                captured_output: String::new(),
            }
        }
        fn checkout_local(&self, _p: &project::Project, _o: &project::CheckoutOptions) -> project::CheckoutOutcome {
            project::CheckoutOutcome {
                success: true,
                error: None,
                captured_output: String::new(),
            }
        }
        fn delete_worktree(&self, _p: &project::Project, _v: bool, _f: bool) -> Result<(), project::DeleteWorktreeError> {
            Ok(())
        }
        fn set_precious_objects(&self, _p: &project::Project, _e: bool) -> anyhow::Result<()> {
            Ok(())
        }
        fn run_gc(&self, _o: &std::path::Path, _a: bool, _c: &project::GcConfig) -> anyhow::Result<()> {
            Ok(())
        }
        fn pack_refs(&self, _o: &std::path::Path, _c: &project::GcConfig) -> anyhow::Result<()> {
            Ok(())
        }
        fn last_fetch_timestamp(&self, _p: &project::Project) -> Option<f64> {
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
    fn test_run_dispatches_phased_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StaticManifestProvider::new(vec![test_project("a", "a", "/o")], dir.path().to_path_buf());
        let ops: Arc<dyn ProjectOps> = Arc::new(NoopOps);
        let result = run(&provider, ops, &args(), &GitfleetConfig::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_run_dispatches_interleaved_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StaticManifestProvider::new(vec![test_project("a", "a", "/o")], dir.path().to_path_buf());
        let ops: Arc<dyn ProjectOps> = Arc::new(NoopOps);
        let mut args = args();
        args.interleaved = true;
        let result = run(&provider, ops, &args, &GitfleetConfig::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_run_rejects_conflicting_flags_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StaticManifestProvider::new(vec![test_project("a", "a", "/o")], dir.path().to_path_buf());
        let ops: Arc<dyn ProjectOps> = Arc::new(NoopOps);
        let mut args = args();
        args.network_only = true;
        args.local_only = true;
        let result = run(&provider, ops, &args, &GitfleetConfig::default());
        assert!(result.is_err());
    }
}
