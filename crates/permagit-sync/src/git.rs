//! `git` command-line adapter.

use crate::adapters::Vcs;
use crate::BoxError;
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Variables git sets when it runs a helper from inside a repository.
pub const REPOSITORY_ENV: [&str; 4] = ["GIT_DIR", "GIT_WORK_TREE", "GIT_INDEX_FILE", "GIT_PREFIX"];

/// Runs the `git` binary.
///
/// Child output is captured and logged, never forwarded: the helper's
/// standard output belongs to the remote-helper protocol.
///
/// Git invokes remote helpers with `GIT_DIR` set. Commands that must not act
/// on the user's repository run with the repository environment removed.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    envs: Vec<(OsString, OsString)>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    /// Create an adapter invoking `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            envs: Vec::new(),
        }
    }

    /// Sets an environment variable on every invocation. Isolated commands
    /// still drop [`REPOSITORY_ENV`].
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Reads a git config value; `None` when unset or unreadable.
    pub async fn config_get(&self, repo_dir: &Path, key: &str) -> Option<String> {
        match self.run(Some(repo_dir), false, ["config", "--get", key]).await {
            Ok(value) => {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            }
            Err(_) => None,
        }
    }

    async fn run<I, S>(&self, dir: Option<&Path>, isolated: bool, args: I) -> Result<String, BoxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .envs(self.envs.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        if isolated {
            for var in REPOSITORY_ENV {
                cmd.env_remove(var);
            }
        }

        let output = cmd.output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "git output");
        }
        if !output.status.success() {
            return Err(format!("git exited with {}: {}", output.status, stderr.trim()).into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn bare_clone(&self, source: &Path, dest: &Path) -> Result<(), BoxError> {
        tracing::debug!(source = %source.display(), dest = %dest.display(), "Creating bare clone");
        let args = [
            OsStr::new("clone"),
            OsStr::new("--bare"),
            OsStr::new("--quiet"),
            source.as_os_str(),
            dest.as_os_str(),
        ];
        self.run(None, true, args).await.map(|_| ())
    }

    async fn set_remote_url(
        &self,
        repo_dir: &Path,
        remote: &str,
        url: &str,
    ) -> Result<(), BoxError> {
        self.run(Some(repo_dir), false, ["remote", "set-url", remote, url])
            .await
            .map(|_| ())
    }
}
