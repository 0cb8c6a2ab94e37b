//! Precious-objects reconciliation and optional post-fetch garbage collection.
//!
//! Multiple projects sharing one `objdir` without alternates must protect
//! each other's objects from `git gc`'s pruning, via `extensions.preciousObjects`.
//! Whichever project is encountered first for a given `objdir` (by project
//! list iteration order) owns running `gc`/`pack-refs` for it — an
//! intentionally preserved, order-dependent behavior (see design notes).

use std::collections::HashSet;
use std::path::Path;

use crate::sync::project::{GcConfig, Project, ProjectOps};

/// Expected `extensions.preciousObjects` state for `project`, given the full
/// project list it belongs to.
pub fn expected_precious_objects(project: &Project, all_projects: &[Project]) -> bool {
    if project.use_git_worktrees {
        return false;
    }
    let occurrences = all_projects.iter().filter(|p| p.name == project.name).count();
    if occurrences <= 1 {
        return false;
    }
    // `use_alternates` is modeled as "uses a dedicated objdir" — a project
    // with its own objdir isn't sharing storage and needs no protection.
    let shares_objdir = all_projects
        .iter()
        .any(|p| p.name != project.name && p.objdir == project.objdir);
    shares_objdir
}

/// Reconcile every project's `extensions.preciousObjects` against its
/// expected state.
pub fn reconcile_precious_objects(
    ops: &dyn ProjectOps,
    projects: &[Project],
) -> anyhow::Result<()> {
    for project in projects {
        ops.set_precious_objects(project, expected_precious_objects(project, projects))?;
    }
    Ok(())
}

/// For `--auto-gc`: run `git gc --auto` once per distinct `objdir` (owned by
/// the first project seen for it), and `git pack-refs` for every other
/// project sharing that `objdir` with its own `gitdir`. Units dispatch across
/// a rayon pool bounded by `--jobs`, the same pool shape `worker_pool` uses
/// for fetch/checkout.
pub fn run_auto_gc(
    ops: &dyn ProjectOps,
    projects: &[Project],
    jobs: u64,
    cpu_count: u64,
) -> anyhow::Result<()> {
    let pack_threads = (cpu_count / jobs.max(1)).max(1) as usize;
    let config = GcConfig { pack_threads };

    let mut owned: HashSet<&Path> = HashSet::new();
    let units: Vec<(&Path, bool)> = projects
        .iter()
        .map(|project| {
            let objdir = project.objdir.as_path();
            let is_owner = owned.insert(objdir);
            (objdir, is_owner)
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1) as usize)
        .build()
        .expect("failed to build gc worker pool");

    let errors: Vec<anyhow::Error> = pool.install(|| {
        use rayon::prelude::*;
        units
            .par_iter()
            .filter_map(|(objdir, is_owner)| {
                let result = if *is_owner {
                    ops.run_gc(objdir, true, &config)
                } else {
                    ops.pack_refs(objdir, &config)
                };
                result.err()
            })
            .collect()
    });

    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::project::test_project;

    #[test]
    fn test_single_occurrence_not_precious() {
        let p = test_project("a", "a", "/o1");
        assert!(!expected_precious_objects(&p, &[p.clone()]));
    }

    #[test]
    fn test_shared_objdir_is_precious() {
        let a = test_project("a", "a", "/shared");
        let mut b = test_project("a", "b", "/shared");
        b.name = "a".to_string();
        let all = vec![a.clone(), b];
        assert!(expected_precious_objects(&a, &all));
    }

    #[test]
    fn test_worktree_project_never_precious() {
        let mut a = test_project("a", "a", "/shared");
        a.use_git_worktrees = true;
        let mut b = test_project("a", "b", "/shared");
        b.use_git_worktrees = true;
        let all = vec![a.clone(), b];
        assert!(!expected_precious_objects(&a, &all));
    }

    struct CountingOps {
        gc_calls: std::sync::Mutex<Vec<String>>,
        pack_calls: std::sync::Mutex<Vec<String>>,
    }

    impl ProjectOps for CountingOps {
        fn fetch_network(
            &self,
            _p: &Project,
            _o: &crate::sync::project::FetchOptions,
            _s: &crate::sync::ssh::SshProxy,
        ) -> crate::sync::project::FetchOutcome {
            unimplemented!()
        }
        fn checkout_local(
            &self,
            _p: &Project,
            _o: &crate::sync::project::CheckoutOptions,
        ) -> crate::sync::project::CheckoutOutcome {
            unimplemented!()
        }
        fn delete_worktree(
            &self,
            _p: &Project,
            _v: bool,
            _f: bool,
        ) -> Result<(), crate::sync::project::DeleteWorktreeError> {
            unimplemented!()
        }
        fn set_precious_objects(&self, _p: &Project, _enabled: bool) -> anyhow::Result<()> {
            Ok(())
        }
        fn run_gc(&self, objdir: &Path, _auto: bool, _config: &GcConfig) -> anyhow::Result<()> {
            self.gc_calls.lock().unwrap().push(objdir.display().to_string());
            Ok(())
        }
        fn pack_refs(&self, objdir: &Path, _config: &GcConfig) -> anyhow::Result<()> {
            self.pack_calls.lock().unwrap().push(objdir.display().to_string());
            Ok(())
        }
        fn last_fetch_timestamp(&self, _p: &Project) -> Option<f64> {
            None
        }
    }

    #[test]
    fn test_auto_gc_owner_by_first_seen() {
        let ops = CountingOps {
            gc_calls: std::sync::Mutex::new(Vec::new()),
            pack_calls: std::sync::Mutex::new(Vec::new()),
        };
        let a = test_project("a", "a", "/shared");
        let b = test_project("b", "b", "/shared");
        let c = test_project("c", "c", "/other");

        run_auto_gc(&ops, &[a, b, c], 2, 4).unwrap();

        assert_eq!(ops.gc_calls.into_inner().unwrap().len(), 2);
        assert_eq!(ops.pack_calls.into_inner().unwrap().len(), 1);
    }
}
