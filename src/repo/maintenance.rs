//! Unattended upkeep over every repository.
//!
//! Tasks never fail on a single repository: problems are recorded as notices
//! and the task moves on. Only failing to enumerate repositories is an error.

use std::path::Path;
use std::time::{Duration, SystemTime};

use super::list::RepositoryList;
use super::work::remove_best_effort;
use super::Engine;
use crate::error::Result;
use crate::git::hooks::install_hooks;
use crate::git::process;
use crate::store::{ops, repos};
use crate::types::Repository;

const ARCHIVE_FORMATS: [&str; 2] = ["zip", "targz"];

/// Outcome of a guarded task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRun {
    Completed,
    /// Another run of the same task was still in progress.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTask {
    DeleteOldArchives,
    DeleteArchives,
    Fsck,
    Gc,
    CheckStats,
    DeleteMissing,
    ReinitMissing,
    SyncHooks,
}

impl MaintenanceTask {
    pub const ALL: [MaintenanceTask; 8] = [
        Self::DeleteOldArchives,
        Self::DeleteArchives,
        Self::Fsck,
        Self::Gc,
        Self::CheckStats,
        Self::DeleteMissing,
        Self::ReinitMissing,
        Self::SyncHooks,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeleteOldArchives => "delete-old-archives",
            Self::DeleteArchives => "delete-archives",
            Self::Fsck => "fsck",
            Self::Gc => "gc",
            Self::CheckStats => "check-stats",
            Self::DeleteMissing => "delete-missing",
            Self::ReinitMissing => "reinit-missing",
            Self::SyncHooks => "sync-hooks",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Engine {
    pub async fn run_maintenance(&self, task: MaintenanceTask) -> Result<TaskRun> {
        tracing::info!(task = %task, "running maintenance task");
        match task {
            MaintenanceTask::DeleteOldArchives => {
                let older_than = Duration::from_secs(self.config().cron.archive_older_than_secs);
                self.delete_old_repository_archives(older_than).await
            }
            MaintenanceTask::DeleteArchives => self.delete_repository_archives().await,
            MaintenanceTask::Fsck => self.git_fsck().await,
            MaintenanceTask::Gc => self.git_gc_repos().await,
            MaintenanceTask::CheckStats => self.check_repo_stats(),
            MaintenanceTask::DeleteMissing => self.delete_missing_repositories().await,
            MaintenanceTask::ReinitMissing => self.reinit_missing_repositories().await,
            MaintenanceTask::SyncHooks => self.sync_repository_hooks().await,
        }
    }

    fn repositories_with_owners(&self) -> Result<Vec<Repository>> {
        let mut list = RepositoryList::from(self.store().read(repos::list_all_repositories)?);
        self.store().read(|c| list.load_attributes(c))?;
        Ok(list.into_inner())
    }

    /// Prunes generated archives older than `older_than`.
    pub async fn delete_old_repository_archives(&self, older_than: Duration) -> Result<TaskRun> {
        let Some(_running) = self.tasks().start("delete_old_repository_archives") else {
            return Ok(TaskRun::Skipped);
        };
        let cutoff = SystemTime::now()
            .checked_sub(older_than)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for repo in self.repositories_with_owners()? {
            let repo_path = self.repo_path_of(&repo)?;
            for format in ARCHIVE_FORMATS {
                let dir = repo_path.join("archives").join(format);
                if let Err(e) = prune_older_than(&dir, cutoff).await {
                    self.notice(format!(
                        "failed to prune archives of {}: {e}",
                        dir.display()
                    ));
                }
            }
        }
        Ok(TaskRun::Completed)
    }

    pub async fn delete_repository_archives(&self) -> Result<TaskRun> {
        for repo in self.repositories_with_owners()? {
            let dir = self.repo_path_of(&repo)?.join("archives");
            if let Err(e) = process::remove_tree(&dir).await {
                self.notice(format!("failed to delete archives of repository {}: {e}", repo.id));
            }
        }
        Ok(TaskRun::Completed)
    }

    pub async fn git_fsck(&self) -> Result<TaskRun> {
        let Some(_running) = self.tasks().start("git_fsck") else {
            return Ok(TaskRun::Skipped);
        };
        let args = &self.config().cron.fsck_args;
        for repo in self.repositories_with_owners()? {
            let path = self.repo_path_of(&repo)?;
            if let Err(e) = process::fsck(&path, args, self.config().fsck_timeout()).await {
                self.notice(format!("repository health check failed for {}: {e}", path.display()));
            }
        }
        Ok(TaskRun::Completed)
    }

    pub async fn git_gc_repos(&self) -> Result<TaskRun> {
        let Some(_running) = self.tasks().start("git_gc_repos") else {
            return Ok(TaskRun::Skipped);
        };
        let args = &self.config().git.gc_args;
        for repo in self.repositories_with_owners()? {
            let path = self.repo_path_of(&repo)?;
            let result = {
                let _guard = self.pool().check_in(repo.id.to_string()).await;
                process::gc(&path, args, self.config().gc_timeout()).await
            };
            match result {
                Ok(()) => self.refresh_size(repo.id, &path).await,
                Err(e) => self.notice(format!("garbage collection failed for {}: {e}", path.display())),
            }
        }
        Ok(TaskRun::Completed)
    }

    /// Recomputes every drifted denormalized counter.
    pub fn check_repo_stats(&self) -> Result<TaskRun> {
        let Some(_running) = self.tasks().start("check_repo_stats") else {
            return Ok(TaskRun::Skipped);
        };
        for check in ops::COUNTER_CHECKS {
            let ids = match self.store().read(|c| ops::find_counter_drift(c, check)) {
                Ok(ids) => ids,
                Err(e) => {
                    self.notice(format!("failed to check {}: {e}", check.description));
                    continue;
                }
            };
            for id in ids {
                tracing::debug!(id, check = check.description, "fixing counter");
                if let Err(e) = self.store().read(|c| ops::fix_counter(c, check, id)) {
                    self.notice(format!("failed to fix {} of {id}: {e}", check.description));
                }
            }
        }
        Ok(TaskRun::Completed)
    }

    /// Deletes the records of repositories whose tree is gone.
    pub async fn delete_missing_repositories(&self) -> Result<TaskRun> {
        for repo in self.repositories_with_owners()? {
            if tokio::fs::try_exists(self.repo_path_of(&repo)?).await? {
                continue;
            }
            tracing::info!(repo = repo.id, "deleting repository with missing tree");
            if let Err(e) = self.delete_repository(repo.owner_id, repo.id).await {
                self.notice(format!("failed to delete missing repository {}: {e}", repo.id));
            }
        }
        Ok(TaskRun::Completed)
    }

    /// Recreates empty bare trees for repositories whose tree is gone.
    pub async fn reinit_missing_repositories(&self) -> Result<TaskRun> {
        for repo in self.repositories_with_owners()? {
            let path = self.repo_path_of(&repo)?;
            if tokio::fs::try_exists(&path).await? {
                continue;
            }
            tracing::info!(repo = repo.id, "reinitializing repository with missing tree");
            let result = async {
                process::init_bare_repo(&path).await?;
                install_hooks(self.config(), &path).await?;
                process::set_head(&path, &repo.default_branch).await
            }
            .await;
            if let Err(e) = result {
                self.notice(format!("failed to reinitialize repository {}: {e}", repo.id));
                remove_best_effort(&path).await;
            }
        }
        Ok(TaskRun::Completed)
    }

    /// Rewrites the hook scripts of every repository and wiki.
    pub async fn sync_repository_hooks(&self) -> Result<TaskRun> {
        for repo in self.repositories_with_owners()? {
            let paths = [self.repo_path_of(&repo)?, self.wiki_path_of(&repo)?];
            for path in paths {
                if !tokio::fs::try_exists(&path).await? {
                    continue;
                }
                if let Err(e) = install_hooks(self.config(), &path).await {
                    self.notice(format!("failed to sync hooks of {}: {e}", path.display()));
                }
            }
        }
        Ok(TaskRun::Completed)
    }
}

async fn prune_older_than(dir: &Path, cutoff: SystemTime) -> std::io::Result<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if meta.is_file() && meta.modified()? < cutoff {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
