//! `project.list` and `copy-link-files.json` reconciliation (§4.11).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sync::fetch_times::write_atomic;
use crate::sync::project::{Project, ProjectOps};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CopyLinkFiles {
    #[serde(default)]
    pub linkfile: Vec<String>,
    #[serde(default)]
    pub copyfile: Vec<String>,
}

impl CopyLinkFiles {
    fn destinations(&self) -> BTreeSet<&str> {
        self.linkfile.iter().chain(&self.copyfile).map(String::as_str).collect()
    }
}

/// Minimal per-project record kept across runs solely so a project removed
/// from the manifest can still be located for deletion, since `project.list`
/// itself (per spec) holds only `relpath` strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectSnapshot {
    objdir: PathBuf,
    gitdir: PathBuf,
}

fn load_snapshot(subdir: &Path) -> std::collections::HashMap<String, ProjectSnapshot> {
    std::fs::read_to_string(subdir.join(".project-snapshot.json"))
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok())
        .unwrap_or_default()
}

/// Rewrite `project.list`, removing worktrees for any project that dropped
/// out of the manifest (in reverse-sorted `relpath` order, so children are
/// removed before their parents).
pub fn save_project_list(
    subdir: &Path,
    ops: &dyn ProjectOps,
    projects: &[Project],
    force_remove_dirty: bool,
) -> anyhow::Result<()> {
    let path = subdir.join("project.list");
    let previous: Vec<String> = std::fs::read_to_string(&path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect();
    let snapshot = load_snapshot(subdir);

    let current: BTreeSet<&str> = projects.iter().map(|p| p.relpath.as_str()).collect();

    let mut removed: Vec<&str> = previous
        .iter()
        .map(String::as_str)
        .filter(|relpath| !current.contains(relpath))
        .collect();
    removed.sort_unstable_by(|a, b| b.cmp(a));

    for relpath in removed {
        // The removed project is, by definition, no longer in `projects`; the
        // snapshot taken on its last successful run is all we have left to
        // reconstruct enough of it to ask the ops layer to remove its
        // worktree, if one still exists.
        if let Some(entry) = snapshot.get(relpath) {
            let ghost = Project {
                name: relpath.to_string(),
                relpath: relpath.to_string(),
                objdir: entry.objdir.clone(),
                gitdir: entry.gitdir.clone(),
                remote_url: String::new(),
                revision: String::new(),
                groups: Vec::new(),
                clone_filter: None,
                use_git_worktrees: false,
            };
            ops.delete_worktree(&ghost, false, force_remove_dirty)?;
        }
    }

    let new_snapshot: std::collections::HashMap<&str, ProjectSnapshot> = projects
        .iter()
        .map(|p| {
            (
                p.relpath.as_str(),
                ProjectSnapshot {
                    objdir: p.objdir.clone(),
                    gitdir: p.gitdir.clone(),
                },
            )
        })
        .collect();
    write_atomic(&subdir.join(".project-snapshot.json"), &serde_json::to_string_pretty(&new_snapshot)?)?;

    let mut sorted_current: Vec<&str> = current.into_iter().collect();
    sorted_current.sort_unstable();
    let contents = sorted_current.join("\n");
    write_atomic(&path, &contents)
}

/// Rewrite `copy-link-files.json`, deleting any previously-recorded
/// destination that is no longer present in `new_files` (best-effort).
pub fn save_copy_link_files(
    subdir: &Path,
    workspace_root: &Path,
    new_files: &CopyLinkFiles,
) -> anyhow::Result<()> {
    let path: PathBuf = subdir.join("copy-link-files.json");
    let previous: CopyLinkFiles = std::fs::read_to_string(&path)
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok())
        .unwrap_or_default();

    let new_destinations = new_files.destinations();
    for dest in previous.destinations() {
        if !new_destinations.contains(dest) {
            let _ = std::fs::remove_file(workspace_root.join(dest));
        }
    }

    let json = serde_json::to_string_pretty(new_files)?;
    write_atomic(&path, &json)
}
