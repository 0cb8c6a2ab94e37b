//! Sync error taxonomy.
//!
//! Every variant carries the run's aggregated per-project failures so the
//! top-level caller can print one composite summary. Hand-rolled `Display`
//! with no `thiserror`, matching the rest of the engine's error style.

use crate::styling::{ERROR, ERROR_BOLD, ERROR_EMOJI, HINT, HINT_EMOJI, format_with_gutter};

/// One project's recorded failure, either on the fetch or checkout side.
#[derive(Debug, Clone)]
pub struct ProjectFailure {
    pub relpath: String,
    pub message: String,
}

/// Buckets of failure accumulated over a run; see §4.12.
#[derive(Debug, Clone, Default)]
pub struct ErrorAggregate {
    pub network_failures: Vec<ProjectFailure>,
    pub checkout_failures: Vec<ProjectFailure>,
    pub project_list_failure: Option<String>,
    pub copy_link_failure: Option<String>,
    pub generic: Vec<String>,
}

impl ErrorAggregate {
    pub fn is_empty(&self) -> bool {
        self.network_failures.is_empty()
            && self.checkout_failures.is_empty()
            && self.project_list_failure.is_none()
            && self.copy_link_failure.is_none()
            && self.generic.is_empty()
    }

    fn sorted_relpaths(failures: &[ProjectFailure]) -> Vec<&str> {
        let mut relpaths: Vec<&str> = failures.iter().map(|f| f.relpath.as_str()).collect();
        relpaths.sort_unstable();
        relpaths
    }
}

#[derive(Debug)]
pub enum SyncError {
    /// Generic sync failure: not empty, but no single bucket warrants a
    /// more specific variant.
    Generic { aggregate: ErrorAggregate },
    /// `--fail-fast` tripped; the pool stopped dispatching further units.
    FailFast { aggregate: ErrorAggregate },
    /// Manifest-server RPC (smart-sync / smart-tag) failed.
    SmartSync { message: String, aggregate: ErrorAggregate },
    /// Superproject revision resolution failed while `--use-superproject`
    /// was explicitly set.
    Superproject { message: String, aggregate: ErrorAggregate },
    /// A manifest project's own local checkout failed.
    UpdateManifest { aggregate: ErrorAggregate },
    /// User interrupted a manifest update; output captured so far is kept.
    ManifestInterrupt { captured_output: String, aggregate: ErrorAggregate },
    /// The sync tool itself was upgraded mid-run; caller must restart.
    RepoChanged,
    /// Wraps an unexpected failure caught at the outermost boundary.
    Unhandled { source: String, aggregate: ErrorAggregate },
    /// Raised by `ProjectOps::delete_worktree`, flattened into the aggregate.
    DeleteWorktree { aggregate: ErrorAggregate },
}

impl SyncError {
    pub fn aggregate(&self) -> Option<&ErrorAggregate> {
        match self {
            SyncError::Generic { aggregate }
            | SyncError::FailFast { aggregate }
            | SyncError::SmartSync { aggregate, .. }
            | SyncError::Superproject { aggregate, .. }
            | SyncError::UpdateManifest { aggregate }
            | SyncError::ManifestInterrupt { aggregate, .. }
            | SyncError::Unhandled { aggregate, .. }
            | SyncError::DeleteWorktree { aggregate } => Some(aggregate),
            SyncError::RepoChanged => None,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::RepoChanged => {
                write!(f, "{ERROR_EMOJI} {ERROR}sync tool was upgraded; restart required{ERROR:#}")
            }
            SyncError::FailFast { aggregate } => {
                writeln!(f, "{ERROR_EMOJI} {ERROR}sync stopped: --fail-fast{ERROR:#}")?;
                write!(f, "{}", format_aggregate(aggregate))?;
                write!(f, "\n\n{HINT_EMOJI} {HINT}rerun with -j1 --fail-fast to isolate the failure{HINT:#}")
            }
            SyncError::SmartSync { message, aggregate } => {
                writeln!(
                    f,
                    "{ERROR_EMOJI} {ERROR}smart-sync request failed: {ERROR_BOLD}{message}{ERROR_BOLD:#}{ERROR:#}"
                )?;
                write!(f, "{}", format_aggregate(aggregate))
            }
            SyncError::Superproject { message, aggregate } => {
                writeln!(
                    f,
                    "{ERROR_EMOJI} {ERROR}superproject revision resolution failed: {message}{ERROR:#}"
                )?;
                write!(f, "{}", format_aggregate(aggregate))
            }
            SyncError::UpdateManifest { aggregate } => {
                writeln!(f, "{ERROR_EMOJI} {ERROR}manifest project failed to sync{ERROR:#}")?;
                write!(f, "{}", format_aggregate(aggregate))
            }
            SyncError::ManifestInterrupt { captured_output, aggregate } => {
                writeln!(f, "{ERROR_EMOJI} {ERROR}manifest update interrupted{ERROR:#}")?;
                if !captured_output.trim().is_empty() {
                    writeln!(f, "{}", format_with_gutter(captured_output.trim()))?;
                }
                write!(f, "{}", format_aggregate(aggregate))
            }
            SyncError::Unhandled { source, aggregate } => {
                writeln!(f, "{ERROR_EMOJI} {ERROR}unexpected error: {source}{ERROR:#}")?;
                write!(f, "{}", format_aggregate(aggregate))
            }
            SyncError::DeleteWorktree { aggregate } => {
                writeln!(f, "{ERROR_EMOJI} {ERROR}failed to delete one or more worktrees{ERROR:#}")?;
                write!(f, "{}", format_aggregate(aggregate))
            }
            SyncError::Generic { aggregate } => {
                writeln!(f, "{ERROR_EMOJI} {ERROR}sync failed{ERROR:#}")?;
                write!(f, "{}", format_aggregate(aggregate))
            }
        }
    }
}

impl std::error::Error for SyncError {}

fn format_aggregate(aggregate: &ErrorAggregate) -> String {
    let mut out = String::new();
    if !aggregate.network_failures.is_empty() {
        out.push_str(&format!(
            "\n{ERROR}network sync failures:{ERROR:#}\n{}\n",
            format_with_gutter(&ErrorAggregate::sorted_relpaths(&aggregate.network_failures).join("\n"))
        ));
    }
    if !aggregate.checkout_failures.is_empty() {
        out.push_str(&format!(
            "\n{ERROR}checkout failures:{ERROR:#}\n{}\n",
            format_with_gutter(&ErrorAggregate::sorted_relpaths(&aggregate.checkout_failures).join("\n"))
        ));
    }
    if let Some(msg) = &aggregate.project_list_failure {
        out.push_str(&format!("\n{ERROR}project.list update failed:{ERROR:#} {msg}\n"));
    }
    if let Some(msg) = &aggregate.copy_link_failure {
        out.push_str(&format!("\n{ERROR}copy-link-files.json update failed:{ERROR:#} {msg}\n"));
    }
    for msg in &aggregate.generic {
        out.push_str(&format!("\n{ERROR}{msg}{ERROR:#}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty_true_for_default() {
        assert!(ErrorAggregate::default().is_empty());
    }

    #[test]
    fn test_is_empty_false_with_network_failure() {
        let mut aggregate = ErrorAggregate::default();
        aggregate.network_failures.push(ProjectFailure {
            relpath: "a".into(),
            message: "boom".into(),
        });
        assert!(!aggregate.is_empty());
    }

    #[test]
    fn test_sorted_relpaths() {
        let failures = vec![
            ProjectFailure { relpath: "zeta".into(), message: String::new() },
            ProjectFailure { relpath: "alpha".into(), message: String::new() },
        ];
        assert_eq!(ErrorAggregate::sorted_relpaths(&failures), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_display_includes_relpaths() {
        let mut aggregate = ErrorAggregate::default();
        aggregate.network_failures.push(ProjectFailure {
            relpath: "a".into(),
            message: "timeout".into(),
        });
        let err = SyncError::FailFast { aggregate };
        let rendered = err.to_string();
        assert!(rendered.contains("fail-fast"));
        assert!(rendered.contains('a'));
    }
}
