use chrono::Utc;

use super::Engine;
use crate::error::{Error, Result};
use crate::git::process;
use crate::store::repos;
use crate::types::Mirror;

impl Engine {
    /// Fetches upstream changes into a mirror and schedules the next sync.
    ///
    /// A failed fetch is recorded as a notice and returned; the schedule is
    /// left untouched so the next run retries.
    pub async fn sync_mirror(&self, repo_id: i64) -> Result<Mirror> {
        let repo = self.get_repository_by_id(repo_id)?;
        let mirror = self
            .store()
            .read(|c| repos::get_mirror(c, repo_id))?
            .ok_or_else(|| Error::not_found(format!("mirror of repository {repo_id}")))?;
        let repo_path = self.repo_path_of(&repo)?;

        {
            let _guard = self.pool().check_in(repo_id.to_string()).await;
            let fetched =
                process::remote_update(&repo_path, mirror.enable_prune, self.config().migrate_timeout()).await;
            if let Err(e) = fetched {
                self.notice(format!("failed to update mirror repository {}: {e}", repo.id));
                return Err(e);
            }
        }
        self.refresh_size(repo_id, &repo_path).await;

        let next_sync_at = Utc::now() + chrono::Duration::hours(mirror.interval_hours);
        self.store()
            .read(|c| repos::set_mirror_next_sync(c, repo_id, next_sync_at))?;
        tracing::debug!(repo = repo_id, next = %next_sync_at, "synced mirror");
        Ok(Mirror {
            next_sync_at,
            ..mirror
        })
    }
}
