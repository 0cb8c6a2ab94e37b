//! The `Project` entity and the manifest/operation contracts the sync engine
//! depends on but does not implement.
//!
//! Manifest XML parsing, submodule discovery, and superproject revision
//! resolution are explicitly out of scope for this engine; [`ManifestProvider`]
//! and [`ProjectOps`] are the seams where a real implementation of those
//! concerns plugs in. Tests substitute fakes for both.

use std::path::{Path, PathBuf};

/// One repository entry in a manifest.
///
/// Multiple projects may share an `objdir` (alternates-style object sharing);
/// callers must serialize fetch/checkout against a shared `objdir` themselves
/// — see [`crate::sync::path_order`] and [`crate::sync::worker_pool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Stable identifier, unique per manifest.
    pub name: String,
    /// Working-tree path relative to the workspace root; unique across a manifest.
    pub relpath: String,
    /// Absolute path to the git object store backing this project.
    pub objdir: PathBuf,
    /// Absolute path to the project's git directory.
    pub gitdir: PathBuf,
    pub remote_url: String,
    pub revision: String,
    pub groups: Vec<String>,
    pub clone_filter: Option<String>,
    pub use_git_worktrees: bool,
}

impl Project {
    /// `relpath` split into path components, used for hierarchical ordering.
    pub fn relpath_components(&self) -> Vec<&str> {
        self.relpath.split('/').filter(|c| !c.is_empty()).collect()
    }

    pub fn exists_on_disk(&self) -> bool {
        self.gitdir.exists()
    }
}

/// Outcome of a network fetch against one project.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub success: bool,
    pub remote_fetched: bool,
    pub error: Option<String>,
    pub captured_output: String,
}

/// Outcome of a local checkout against one project.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub captured_output: String,
}

/// Flags controlling a fetch. Field names mirror the CLI surface.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub quiet: bool,
    pub verbose: bool,
    pub current_branch_only: bool,
    pub force_sync: bool,
    pub clone_bundle: bool,
    pub tags: bool,
    pub optimized_fetch: bool,
    pub retry_fetches: u32,
    pub prune: bool,
}

/// Flags controlling a checkout.
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    pub detach_head: bool,
    pub force_sync: bool,
    pub force_checkout: bool,
    pub force_rebase: bool,
    pub verbose: bool,
}

/// GC configuration passed through to [`ProjectOps::run_gc`]/[`ProjectOps::pack_refs`].
#[derive(Debug, Clone, Default)]
pub struct GcConfig {
    pub pack_threads: usize,
}

/// Error raised by [`ProjectOps::delete_worktree`].
#[derive(Debug)]
pub struct DeleteWorktreeError {
    pub relpath: String,
    pub message: String,
}

impl std::fmt::Display for DeleteWorktreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to delete worktree {}: {}", self.relpath, self.message)
    }
}

impl std::error::Error for DeleteWorktreeError {}

/// The operation surface a `Project` exposes. This is the §6.1 contract: a
/// capability set expressed as a trait so the sync engine can run against a
/// real git backend ([`crate::sync::ops::GitProjectOps`]) or a scripted fake
/// in tests.
pub trait ProjectOps: Send + Sync {
    fn fetch_network(
        &self,
        project: &Project,
        opts: &FetchOptions,
        ssh: &crate::sync::ssh::SshProxy,
    ) -> FetchOutcome;

    fn checkout_local(&self, project: &Project, opts: &CheckoutOptions) -> CheckoutOutcome;

    fn delete_worktree(
        &self,
        project: &Project,
        verbose: bool,
        force: bool,
    ) -> Result<(), DeleteWorktreeError>;

    fn set_precious_objects(&self, project: &Project, enabled: bool) -> anyhow::Result<()>;

    fn run_gc(&self, objdir: &Path, auto: bool, config: &GcConfig) -> anyhow::Result<()>;

    fn pack_refs(&self, objdir: &Path, config: &GcConfig) -> anyhow::Result<()>;

    fn last_fetch_timestamp(&self, project: &Project) -> Option<f64>;

    fn exists(&self, project: &Project) -> bool {
        project.exists_on_disk()
    }
}

/// Stands in for the manifest/project-model subsystem (explicitly out of
/// scope). Supplies the current project list and, on `reload`, simulates
/// late-appearing projects the way submodule discovery or a manifest rewrite
/// would.
pub trait ManifestProvider: Send + Sync {
    /// Current known projects.
    fn projects(&self) -> Vec<Project>;

    /// Re-derive the project list, possibly returning newly-discovered
    /// projects (submodules, manifest server updates). Returns the same list
    /// when nothing changed.
    fn reload(&self) -> Vec<Project>;

    /// Directory used for `project.list` / `copy-link-files.json` (§4.11) and
    /// the fetch-time / local-sync-state JSON files (§6.3).
    fn repo_dir(&self) -> PathBuf;
}

/// A fixed project list: reload is a no-op. Suitable for a single manifest
/// snapshot with no submodules.
pub struct StaticManifestProvider {
    projects: Vec<Project>,
    repo_dir: PathBuf,
}

impl StaticManifestProvider {
    pub fn new(projects: Vec<Project>, repo_dir: PathBuf) -> Self {
        Self { projects, repo_dir }
    }
}

impl ManifestProvider for StaticManifestProvider {
    fn projects(&self) -> Vec<Project> {
        self.projects.clone()
    }

    fn reload(&self) -> Vec<Project> {
        self.projects.clone()
    }

    fn repo_dir(&self) -> PathBuf {
        self.repo_dir.clone()
    }
}

#[cfg(test)]
pub(crate) fn test_project(name: &str, relpath: &str, objdir: &str) -> Project {
    Project {
        name: name.to_string(),
        relpath: relpath.to_string(),
        objdir: PathBuf::from(objdir),
        gitdir: PathBuf::from(format!("{relpath}/.git")),
        remote_url: format!("git://example.invalid/{name}.git"),
        revision: "main".to_string(),
        groups: Vec::new(),
        clone_filter: None,
        use_git_worktrees: false,
    }
}
