use super::journal::OperationHandle;
use super::work::remove_best_effort;
use super::{Engine, load_owner};
use crate::error::{Error, Result};
use crate::store::repos::{self, RepoCounter};
use crate::store::{teams, users};
use crate::types::*;

impl Engine {
    /// Deletes repository `repo_id` of `owner_id` with all dependent rows.
    ///
    /// Removal of the on-disk trees and attachment files happens after the
    /// commit and is best-effort. Forks of the deleted repository become
    /// standalone repositories.
    pub async fn delete_repository(&self, owner_id: i64, repo_id: i64) -> Result<()> {
        let (owner, repo, attachments, mut handle) = self.store().transaction(|tx| {
            let repo = repos::get_repository_by_id(tx, repo_id)?
                .filter(|r| r.owner_id == owner_id)
                .ok_or_else(|| Error::not_found(format!("repository {repo_id} of user {owner_id}")))?;
            let owner = load_owner(tx, owner_id)?;

            if owner.is_organization() {
                for team in teams::list_teams_with_repo(tx, repo.id)? {
                    teams::remove_team_repo(tx, team.id, repo.id)?;
                }
            }

            let attachments = repos::delete_repository_cascade(tx, repo.id)?;
            if repo.is_fork {
                repos::incr_counter(tx, repo.fork_id, RepoCounter::Forks, -1)?;
            }
            users::incr_num_repos(tx, owner.id(), -1)?;

            let handle = OperationHandle::begin(tx, repo.id, OperationKind::Delete)?;
            Ok((owner, repo, attachments, handle))
        })?;
        handle.committed(self.store());
        tracing::info!(repo = repo.id, owner = owner.name(), "deleted repository");

        {
            let _guard = self.pool().check_in(repo.id.to_string()).await;
            for path in [
                self.repo_path(owner.name(), &repo.name),
                self.wiki_path(owner.name(), &repo.name),
                self.local_copy_path(repo.id),
                self.local_wiki_path(repo.id),
            ] {
                remove_best_effort(&path).await;
            }
        }
        for uuid in &attachments {
            let path = self.attachment_path(uuid);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove attachment");
                }
            }
        }
        handle.applied(self.store());

        match self.store().read(|c| repos::clear_fork_linkage(c, repo.id)) {
            Ok(0) => {}
            Ok(n) => tracing::info!(repo = repo.id, forks = n, "detached forks of deleted repository"),
            Err(e) => tracing::warn!(repo = repo.id, error = %e, "failed to detach forks"),
        }
        Ok(())
    }
}
