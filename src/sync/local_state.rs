//! Local-sync-state store.
//!
//! Tracks, per project `relpath`, the timestamp of the last successful
//! fetch and checkout. Backed by `<repodir>/.repo_localsyncstate.json`. Used
//! to detect a partially-synced workspace (some projects at a different
//! checkout generation than others).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::fetch_times::write_atomic;
use super::project::Project;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Entry {
    pub last_fetch: Option<u64>,
    pub last_checkout: Option<u64>,
}

pub struct LocalSyncState {
    path: PathBuf,
    entries: HashMap<String, Entry>,
    /// Single timestamp captured at construction; every mutation in this run
    /// uses it, so a run groups monotonically.
    run_timestamp: u64,
}

impl LocalSyncState {
    pub fn load(repo_dir: &Path) -> Self {
        Self::load_at(repo_dir, crate::utils::get_now())
    }

    pub fn load_at(repo_dir: &Path, run_timestamp: u64) -> Self {
        let path = repo_dir.join(".repo_localsyncstate.json");
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        Self {
            path,
            entries,
            run_timestamp,
        }
    }

    pub fn run_timestamp(&self) -> u64 {
        self.run_timestamp
    }

    pub fn set_fetch_time(&mut self, project: &Project) {
        self.entries
            .entry(project.relpath.clone())
            .or_default()
            .last_fetch = Some(self.run_timestamp);
    }

    pub fn set_checkout_time(&mut self, project: &Project) {
        self.entries
            .entry(project.relpath.clone())
            .or_default()
            .last_checkout = Some(self.run_timestamp);
    }

    pub fn last_checkout(&self, relpath: &str) -> Option<u64> {
        self.entries.get(relpath).and_then(|e| e.last_checkout)
    }

    /// Remove entries whose `gitdir` no longer exists, or is a symlink
    /// (indicating a linked worktree now lives elsewhere).
    pub fn prune_removed(&mut self, projects: &[Project]) {
        let by_relpath: HashMap<&str, &Project> =
            projects.iter().map(|p| (p.relpath.as_str(), p)).collect();

        self.entries.retain(|relpath, _| match by_relpath.get(relpath.as_str()) {
            None => false,
            Some(project) => {
                let meta = std::fs::symlink_metadata(&project.gitdir);
                matches!(meta, Ok(m) if !m.file_type().is_symlink()) && project.gitdir.exists()
            }
        });
    }

    /// True when any known project is missing a `last_checkout`, or the
    /// recorded `last_checkout` timestamps are not all equal.
    pub fn is_partially_synced(&self) -> bool {
        let mut timestamps = self.entries.values().map(|e| e.last_checkout);
        let Some(first) = timestamps.next() else {
            return false;
        };
        if first.is_none() {
            return true;
        }
        timestamps.any(|t| t != first)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(&self.path, &json)
    }
}
