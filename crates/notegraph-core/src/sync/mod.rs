pub mod git;
pub mod manager;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use git::{GitBackend, GitError, SystemGit};
pub use manager::OrgSyncManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Awaiting external confirmation of a conflict.
    Pending,
    Committed,
    Pushed,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Pushed | Self::Failed)
    }
}

/// One sync invocation against a target repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: Uuid,
    pub files: Vec<PathBuf>,
    pub target_repo: String,
    pub course: String,
    pub message: String,
    pub status: SyncStatus,
    /// Paths inside the target repo this task writes.
    pub staged_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncTask {
    #[must_use]
    pub fn new(files: Vec<PathBuf>, target_repo: impl Into<String>, course: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            files,
            target_repo: target_repo.into(),
            course: course.into(),
            message: String::new(),
            status: SyncStatus::Pending,
            staged_paths: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn transition(&mut self, status: SyncStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.transition(SyncStatus::Failed);
    }
}

/// Render a commit-message template.
///
/// Supported placeholders: `{timestamp}` (RFC 3339) and `{fileCount}`.
#[must_use]
pub fn render_commit_message(template: &str, file_count: usize, now: DateTime<Utc>) -> String {
    template
        .replace("{timestamp}", &now.to_rfc3339())
        .replace("{fileCount}", &file_count.to_string())
}

/// Course tag → repository subdirectory, kebab-cased.
#[must_use]
pub fn course_directory(course: &str) -> String {
    let mut out = String::with_capacity(course.len());
    let mut last_dash = true;
    for c in course.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_commit_message() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let rendered = render_commit_message("sync {fileCount} files at {timestamp}", 2, now);

        assert_eq!(rendered, "sync 2 files at 2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_course_directory_kebab_case() {
        assert_eq!(course_directory("CS101"), "cs101");
        assert_eq!(course_directory("Linear Algebra II"), "linear-algebra-ii");
        assert_eq!(course_directory("  weird -- name  "), "weird-name");
    }

    #[test]
    fn test_status_terminality() {
        assert!(!SyncStatus::Pending.is_terminal());
        assert!(SyncStatus::Committed.is_terminal());
        assert!(SyncStatus::Pushed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
    }
}
