mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use gitfleet::config::GitfleetConfig;
use gitfleet::styling::{self, ERROR, ERROR_EMOJI};
use gitfleet::sync;
use gitfleet::sync::ops::GitProjectOps;
use gitfleet::sync::project::{ManifestProvider, Project, StaticManifestProvider};

use cli::{Cli, Commands};

/// One entry in the declarative project list read from
/// `<workspace>/.gitfleet-manifest.toml`. Manifest XML parsing itself is out
/// of scope; this is the minimal concrete stand-in described for
/// `ManifestProvider`.
#[derive(Debug, serde::Deserialize)]
struct ManifestEntry {
    name: String,
    relpath: String,
    remote_url: String,
    #[serde(default = "default_revision")]
    revision: String,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    clone_filter: Option<String>,
    #[serde(default)]
    use_git_worktrees: bool,
    /// Defaults to a `relpath`-derived path shared by no other project.
    #[serde(default)]
    objdir: Option<String>,
}

fn default_revision() -> String {
    "main".to_string()
}

#[derive(Debug, serde::Deserialize, Default)]
struct ManifestFile {
    #[serde(default)]
    project: Vec<ManifestEntry>,
}

fn load_projects(workspace_root: &Path) -> anyhow::Result<Vec<Project>> {
    let path = workspace_root.join(".gitfleet-manifest.toml");
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("failed to read manifest {}: {e}", path.display()))?;
    let manifest: ManifestFile = toml::from_str(&contents)?;

    Ok(manifest
        .project
        .into_iter()
        .map(|entry| {
            let objdir = entry
                .objdir
                .map(PathBuf::from)
                .unwrap_or_else(|| workspace_root.join(".repo/projects").join(format!("{}.git", entry.relpath)));
            let gitdir = workspace_root.join(&entry.relpath).join(".git");
            Project {
                name: entry.name,
                relpath: entry.relpath,
                objdir,
                gitdir,
                remote_url: entry.remote_url,
                revision: entry.revision,
                groups: entry.groups,
                clone_filter: entry.clone_filter,
                use_git_worktrees: entry.use_git_worktrees,
            }
        })
        .collect())
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
    styling::set_verbosity(cli.verbose);

    match cli.command {
        Commands::Init => {
            anyhow::bail!("init is not implemented by this engine; manifest/workspace initialization is out of scope");
        }
        Commands::Sync(args) => {
            let workspace_root = std::env::current_dir()?;
            let projects = load_projects(&workspace_root)?;
            let repo_dir = workspace_root.join(".repo");
            let manifest: Box<dyn ManifestProvider> = Box::new(StaticManifestProvider::new(projects, repo_dir));
            let ops = Arc::new(GitProjectOps);
            let config = GitfleetConfig::load_default();

            sync::run(manifest.as_ref(), ops, &args, &config)?;
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match std::panic::catch_unwind(run) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            styling::eprintln!("{ERROR_EMOJI} {ERROR}{e}{ERROR:#}");
            for cause in e.chain().skip(1) {
                styling::eprintln!("  {ERROR}caused by:{ERROR:#} {cause}");
            }
            ExitCode::FAILURE
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            styling::eprintln!("{ERROR_EMOJI} {ERROR}internal error: {message}{ERROR:#}");
            ExitCode::FAILURE
        }
    }
}
