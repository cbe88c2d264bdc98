use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git binary not found on PATH")]
    BinaryNotFound,
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GitResult<T> = Result<T, GitError>;

/// Seam for repository operations so the sync manager can be exercised
/// without a real git checkout.
#[async_trait]
pub trait GitBackend: Send + Sync {
    async fn run(&self, repo: &Path, args: &[&str]) -> GitResult<()>;
}

/// Runs the system `git` binary as a subprocess.
pub struct SystemGit {
    binary: PathBuf,
}

impl SystemGit {
    pub fn locate() -> GitResult<Self> {
        let binary = which::which("git").map_err(|_| GitError::BinaryNotFound)?;
        Ok(Self { binary })
    }
}

#[async_trait]
impl GitBackend for SystemGit {
    async fn run(&self, repo: &Path, args: &[&str]) -> GitResult<()> {
        let output: Output = tokio::process::Command::new(&self.binary)
            .current_dir(repo)
            .args(args)
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
