use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::{Error, Result};

use super::git::{GitBackend, SystemGit};
use super::{course_directory, render_commit_message, SyncStatus, SyncTask};

#[derive(Default)]
struct PendingState {
    tasks: HashMap<Uuid, SyncTask>,
    /// Target paths claimed by unresolved pending tasks. Further syncs
    /// touching these paths are refused until the task is resolved.
    blocked_paths: HashSet<PathBuf>,
}

/// Commits and optionally pushes processed artifacts into organization
/// repositories.
pub struct OrgSyncManager {
    config: SyncConfig,
    git: Box<dyn GitBackend>,
    state: Mutex<PendingState>,
}

impl OrgSyncManager {
    #[must_use]
    pub fn new(config: SyncConfig, git: Box<dyn GitBackend>) -> Self {
        Self {
            config,
            git,
            state: Mutex::new(PendingState::default()),
        }
    }

    pub fn with_system_git(config: SyncConfig) -> Result<Self> {
        let git = SystemGit::locate()
            .map_err(|e| Error::Configuration(format!("git unavailable: {e}")))?;
        Ok(Self::new(config, Box::new(git)))
    }

    /// Sync `files` into `<org_root>/<target_repo>/<course-dir>/`.
    ///
    /// Returns a terminal task on commit/push completion or failure, or a
    /// `Pending` task when a conflicting target file needs confirmation and
    /// `auto_commit` is off. Paths claimed by an unresolved pending task
    /// refuse further syncs with `Error::SyncConflict`.
    pub async fn sync(
        &self,
        files: Vec<PathBuf>,
        target_repo: &str,
        course: &str,
    ) -> Result<SyncTask> {
        if files.is_empty() {
            return Err(Error::Configuration("sync invoked with no files".into()));
        }

        let repo_dir = self.config.org_root.join(target_repo);
        if !repo_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "target repository missing: {}",
                repo_dir.display()
            )));
        }

        let course_dir = repo_dir.join(course_directory(course));
        let mut task = SyncTask::new(files, target_repo, course);
        task.message =
            render_commit_message(&self.config.commit_template, task.files.len(), Utc::now());

        for source in &task.files {
            let name = source
                .file_name()
                .ok_or_else(|| Error::Configuration(format!("not a file: {}", source.display())))?;
            task.staged_paths.push(course_dir.join(name));
        }

        let mut conflict = false;
        for (source, target) in task.files.iter().zip(&task.staged_paths) {
            if target.exists() {
                let incoming = tokio::fs::read(source).await?;
                let existing = tokio::fs::read(target).await?;
                if incoming != existing {
                    conflict = true;
                }
            }
        }

        {
            let mut state = self.state.lock().await;
            for target in &task.staged_paths {
                if state.blocked_paths.contains(target) {
                    return Err(Error::SyncConflict {
                        path: target.clone(),
                    });
                }
            }

            if conflict && !self.config.auto_commit {
                tracing::info!(
                    "Sync task {} pending confirmation for {}",
                    task.id,
                    task.target_repo
                );
                for target in &task.staged_paths {
                    state.blocked_paths.insert(target.clone());
                }
                state.tasks.insert(task.id, task.clone());
                return Ok(task);
            }
        }

        self.commit_and_push(&repo_dir, &mut task).await;
        Ok(task)
    }

    /// Resolve a pending task: `approve` proceeds with the commit, refusal
    /// marks it failed. Either way its target paths are unblocked.
    pub async fn resolve(&self, task_id: Uuid, approve: bool) -> Result<SyncTask> {
        let mut task = {
            let mut state = self.state.lock().await;
            let task = state
                .tasks
                .remove(&task_id)
                .ok_or_else(|| Error::Configuration(format!("unknown sync task: {task_id}")))?;
            for target in &task.staged_paths {
                state.blocked_paths.remove(target);
            }
            task
        };

        if approve {
            let repo_dir = self.config.org_root.join(&task.target_repo);
            self.commit_and_push(&repo_dir, &mut task).await;
        } else {
            task.fail("sync declined by confirmation");
        }
        Ok(task)
    }

    pub async fn pending_tasks(&self) -> Vec<SyncTask> {
        let state = self.state.lock().await;
        let mut tasks: Vec<SyncTask> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Stage, commit, and optionally push. Commit failure rolls the staged
    /// copies back so no subset of files lands.
    async fn commit_and_push(&self, repo_dir: &Path, task: &mut SyncTask) {
        let mut rollback: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();

        for (source, target) in task.files.iter().zip(&task.staged_paths) {
            let prior = match tokio::fs::read(target).await {
                Ok(bytes) => Some(bytes),
                Err(_) => None,
            };
            rollback.push((target.clone(), prior));

            if let Some(parent) = target.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    task.fail(format!("staging failed: {e}"));
                    Self::roll_back(&rollback).await;
                    return;
                }
            }
            if let Err(e) = copy_file(source, target).await {
                task.fail(format!("staging failed: {e}"));
                Self::roll_back(&rollback).await;
                return;
            }
        }

        let mut add_args: Vec<String> = vec!["add".to_string(), "--".to_string()];
        for target in &task.staged_paths {
            let relative = target.strip_prefix(repo_dir).unwrap_or(target);
            add_args.push(relative.to_string_lossy().into_owned());
        }
        let add_refs: Vec<&str> = add_args.iter().map(String::as_str).collect();

        if let Err(e) = self.git.run(repo_dir, &add_refs).await {
            task.fail(format!("git add failed: {e}"));
            Self::roll_back(&rollback).await;
            return;
        }

        if let Err(e) = self
            .git
            .run(repo_dir, &["commit", "-m", &task.message])
            .await
        {
            task.fail(format!("git commit failed: {e}"));
            Self::roll_back(&rollback).await;
            return;
        }

        task.transition(SyncStatus::Committed);
        tracing::info!(
            "Committed {} files to {} ({})",
            task.staged_paths.len(),
            task.target_repo,
            task.id
        );

        if self.config.push_on_sync {
            self.push_with_retry(repo_dir, task).await;
        }
    }

    /// Push with bounded exponential backoff. The commit stands either way;
    /// exhausted retries leave the task failed with the push error.
    async fn push_with_retry(&self, repo_dir: &Path, task: &mut SyncTask) {
        let mut delay = Duration::from_millis(self.config.push_base_delay_ms);
        let mut last_error = String::new();

        for attempt in 1..=self.config.push_attempts.max(1) {
            match self
                .git
                .run(repo_dir, &["push", "origin", &self.config.branch])
                .await
            {
                Ok(()) => {
                    task.transition(SyncStatus::Pushed);
                    return;
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        "Push attempt {attempt}/{} failed for {}: {e}",
                        self.config.push_attempts,
                        task.target_repo
                    );
                    if attempt < self.config.push_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        task.fail(format!("push failed after retries: {last_error}"));
    }

    async fn roll_back(rollback: &[(PathBuf, Option<Vec<u8>>)]) {
        for (target, prior) in rollback {
            let result = match prior {
                Some(bytes) => tokio::fs::write(target, bytes).await,
                None => tokio::fs::remove_file(target).await,
            };
            if let Err(e) = result {
                tracing::warn!("Rollback of {} failed: {e}", target.display());
            }
        }
    }
}

async fn copy_file(source: &Path, target: &Path) -> std::io::Result<()> {
    let bytes = tokio::fs::read(source).await?;
    tokio::fs::write(target, bytes).await
}
