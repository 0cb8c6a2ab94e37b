//! SSH connection-multiplexing proxy.
//!
//! A scoped resource acquired around the network phase: opens a
//! control-master socket directory once, and every worker's fetch reuses it
//! rather than negotiating a fresh SSH connection per project. Torn down
//! (masters terminated, socket directory removed) when the guard is dropped,
//! so cleanup happens on every exit path including cancellation and panics.
//!
//! On platforms without UNIX domain socket support, or when `GIT_SSH` is set
//! (disabling multiplexing, per the `GIT_SSH=ssh` environment convention),
//! this is a no-op.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;

pub struct SshProxy {
    sockets_dir: Option<tempfile::TempDir>,
    /// Remotes for which a control master has already been started.
    active_masters: Mutex<Vec<String>>,
}

impl SshProxy {
    /// Acquire the proxy scope. The returned guard must stay alive for the
    /// full duration of every fetch; all workers must see the same instance.
    pub fn acquire() -> anyhow::Result<Self> {
        if !Self::multiplexing_supported() {
            return Ok(Self {
                sockets_dir: None,
                active_masters: Mutex::new(Vec::new()),
            });
        }

        let dir = tempfile::Builder::new()
            .prefix("gitfleet-ssh-")
            .tempdir()?;
        Ok(Self {
            sockets_dir: Some(dir),
            active_masters: Mutex::new(Vec::new()),
        })
    }

    fn multiplexing_supported() -> bool {
        cfg!(unix) && std::env::var("GIT_SSH").as_deref() != Ok("ssh")
    }

    /// Path to the control socket for a given remote host, creating the
    /// control master on first use.
    pub fn socket_path(&self, host: &str) -> Option<PathBuf> {
        let dir = self.sockets_dir.as_ref()?;
        let socket = dir.path().join(sanitize(host));

        let mut active = self.active_masters.lock().unwrap();
        if !active.contains(&host.to_string()) {
            let _ = Command::new("ssh")
                .args(["-M", "-N", "-f", "-o", "ControlPersist=yes", "-o"])
                .arg(format!("ControlPath={}", socket.display()))
                .arg(host)
                .output();
            active.push(host.to_string());
        }

        Some(socket)
    }

    pub fn is_active(&self) -> bool {
        self.sockets_dir.is_some()
    }
}

impl Drop for SshProxy {
    fn drop(&mut self) {
        let Some(dir) = &self.sockets_dir else {
            return;
        };
        let active = self.active_masters.get_mut().unwrap();
        for host in active.drain(..) {
            let socket = dir.path().join(sanitize(&host));
            let _ = Command::new("ssh")
                .args(["-O", "exit", "-o"])
                .arg(format!("ControlPath={}", socket.display()))
                .arg(&host)
                .output();
        }
        // `dir` itself is removed by `TempDir`'s own `Drop`.
    }
}

fn sanitize(host: &str) -> String {
    host.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_succeeds() {
        let proxy = SshProxy::acquire().unwrap();
        if cfg!(unix) {
            assert!(proxy.is_active());
        }
    }

    #[test]
    fn test_git_ssh_disables_multiplexing() {
        // SAFETY-equivalent: sequential test process env mutation, restored
        // immediately; no other test reads GIT_SSH concurrently in this crate.
        unsafe {
            std::env::set_var("GIT_SSH", "ssh");
        }
        let proxy = SshProxy::acquire().unwrap();
        assert!(!proxy.is_active());
        unsafe {
            std::env::remove_var("GIT_SSH");
        }
    }

    #[test]
    fn test_sanitize_host() {
        assert_eq!(sanitize("example.com"), "example.com");
        assert_eq!(sanitize("user@host:22"), "user_host_22");
    }
}
