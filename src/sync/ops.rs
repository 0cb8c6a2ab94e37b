//! A real `ProjectOps` backed by the `git` CLI.
//!
//! Every subprocess goes through [`crate::shell_exec::run`], the engine's one
//! logging/timing choke point for external commands.

use std::path::Path;
use std::process::Command;

use crate::shell_exec;
use crate::sync::project::{
    CheckoutOutcome, CheckoutOptions, DeleteWorktreeError, FetchOptions, FetchOutcome, GcConfig,
    Project, ProjectOps,
};
use crate::sync::ssh::SshProxy;

pub struct GitProjectOps;

impl GitProjectOps {
    fn git(&self, dir: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(dir);
        cmd
    }
}

impl ProjectOps for GitProjectOps {
    fn fetch_network(&self, project: &Project, opts: &FetchOptions, ssh: &SshProxy) -> FetchOutcome {
        let mut cmd = self.git(&project.objdir);
        cmd.args(["fetch", "--no-tags"]);
        if opts.tags {
            cmd.arg("--tags");
        }
        if opts.prune {
            cmd.arg("--prune");
        }
        if opts.force_sync {
            cmd.arg("--force");
        }
        cmd.arg(&project.remote_url);

        if let Some(host) = extract_host(&project.remote_url)
            && let Some(socket) = ssh.socket_path(host)
        {
            cmd.env("GIT_SSH_COMMAND", format!("ssh -o ControlPath={}", socket.display()));
        }

        match shell_exec::run(&mut cmd, Some(&project.name)) {
            Ok(output) => FetchOutcome {
                success: output.status.success(),
                remote_fetched: output.status.success(),
                error: (!output.status.success())
                    .then(|| String::from_utf8_lossy(&output.stderr).into_owned()),
                captured_output: String::from_utf8_lossy(&output.stdout).into_owned(),
            },
            Err(e) => FetchOutcome {
                success: false,
                remote_fetched: false,
                error: Some(e.to_string()),
                captured_output: String::new(),
            },
        }
    }

    fn checkout_local(&self, project: &Project, opts: &CheckoutOptions) -> CheckoutOutcome {
        let mut cmd = self.git(&project.gitdir);
        if opts.force_rebase {
            cmd.args(["rebase", &project.revision]);
        } else if opts.detach_head {
            cmd.args(["checkout", "--detach", &project.revision]);
        } else {
            cmd.args(["checkout", &project.revision]);
        }
        if opts.force_checkout {
            cmd.arg("--force");
        }

        match shell_exec::run(&mut cmd, Some(&project.name)) {
            Ok(output) => CheckoutOutcome {
                success: output.status.success(),
                error: (!output.status.success())
                    .then(|| String::from_utf8_lossy(&output.stderr).into_owned()),
                captured_output: String::from_utf8_lossy(&output.stdout).into_owned(),
            },
            Err(e) => CheckoutOutcome {
                success: false,
                error: Some(e.to_string()),
                captured_output: String::new(),
            },
        }
    }

    fn delete_worktree(
        &self,
        project: &Project,
        verbose: bool,
        force: bool,
    ) -> Result<(), DeleteWorktreeError> {
        let mut cmd = self.git(&project.objdir);
        cmd.args(["worktree", "remove"]);
        if force {
            cmd.arg("--force");
        }
        cmd.arg(&project.gitdir);

        let output = shell_exec::run(&mut cmd, verbose.then_some(project.name.as_str()))
            .map_err(|e| DeleteWorktreeError {
                relpath: project.relpath.clone(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(DeleteWorktreeError {
                relpath: project.relpath.clone(),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    fn set_precious_objects(&self, project: &Project, enabled: bool) -> anyhow::Result<()> {
        let mut cmd = self.git(&project.objdir);
        cmd.args(["config", "extensions.preciousObjects", &enabled.to_string()]);
        let output = shell_exec::run(&mut cmd, Some(&project.name))?;
        anyhow::ensure!(output.status.success(), "git config extensions.preciousObjects failed");
        Ok(())
    }

    fn run_gc(&self, objdir: &Path, auto: bool, config: &GcConfig) -> anyhow::Result<()> {
        let mut cmd = self.git(objdir);
        cmd.args(["-c", &format!("pack.threads={}", config.pack_threads.max(1)), "gc"]);
        if auto {
            cmd.arg("--auto");
        }
        let output = shell_exec::run(&mut cmd, None)?;
        anyhow::ensure!(output.status.success(), "git gc failed");
        Ok(())
    }

    fn pack_refs(&self, objdir: &Path, config: &GcConfig) -> anyhow::Result<()> {
        let mut cmd = self.git(objdir);
        cmd.args(["-c", &format!("pack.threads={}", config.pack_threads.max(1)), "pack-refs", "--all"]);
        let output = shell_exec::run(&mut cmd, None)?;
        anyhow::ensure!(output.status.success(), "git pack-refs failed");
        Ok(())
    }

    fn last_fetch_timestamp(&self, project: &Project) -> Option<f64> {
        let fetch_head = project.gitdir.join("FETCH_HEAD");
        std::fs::metadata(fetch_head)
            .ok()?
            .modified()
            .ok()?
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs_f64())
    }
}

/// Pull the host out of a `git@host:path` or `ssh://host[:port]/path` remote URL.
fn extract_host(remote_url: &str) -> Option<&str> {
    if let Some(rest) = remote_url.strip_prefix("ssh://") {
        let host_port = rest.split('/').next()?;
        let host_port = host_port.split('@').last().unwrap_or(host_port);
        return Some(host_port.split(':').next().unwrap_or(host_port));
    }
    if let Some((user_host, _path)) = remote_url.split_once(':')
        && !remote_url.starts_with("http")
    {
        return user_host.split('@').last();
    }
    None
}
