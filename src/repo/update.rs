use std::collections::HashSet;
use std::path::PathBuf;

use super::journal::OperationHandle;
use super::{Engine, load_owner, load_repository, truncate_chars};
use crate::access;
use crate::error::{Error, Result};
use crate::store::{repos, social};
use crate::types::*;

const DAEMON_EXPORT_FILE: &str = "git-daemon-export-ok";

impl Engine {
    /// Persists the mutable settings of `repo`.
    ///
    /// When `visibility_changed` is set, accesses are recomputed and the new
    /// visibility is pushed down to every fork, recursively. The daemon export
    /// markers of all affected repositories are toggled after the commit.
    pub async fn update_repository(
        &self,
        repo: &Repository,
        visibility_changed: bool,
    ) -> Result<Repository> {
        let mut updated = repo.clone();
        truncate_chars(&mut updated.description, 512);
        truncate_chars(&mut updated.website, 255);

        let (mut updated, affected, handle) = self.store().transaction(|tx| {
            repos::update_repository(tx, &updated)?;
            // Name, owner and emptiness come from the row, not the caller's copy.
            let updated = load_repository(tx, updated.id)?;
            if !visibility_changed {
                return Ok((updated, Vec::new(), None));
            }

            let owner = load_owner(tx, updated.owner_id)?;
            let mut affected = vec![(owner.name().to_string(), updated.clone())];
            apply_visibility(tx, &updated, &owner)?;

            let mut visited = HashSet::from([updated.id]);
            let mut pending = vec![updated.clone()];
            while let Some(parent) = pending.pop() {
                for mut fork in repos::list_forks(tx, parent.id)? {
                    if !visited.insert(fork.id) {
                        continue;
                    }
                    fork.is_private = parent.is_private || parent.is_unlisted;
                    fork.is_unlisted = parent.is_unlisted;
                    repos::set_visibility(tx, fork.id, fork.is_private, fork.is_unlisted)?;

                    let fork_owner = load_owner(tx, fork.owner_id)?;
                    apply_visibility(tx, &fork, &fork_owner)?;
                    affected.push((fork_owner.name().to_string(), fork.clone()));
                    pending.push(fork);
                }
            }

            let handle = OperationHandle::begin(tx, updated.id, OperationKind::Visibility)?;
            Ok((updated, affected, Some(handle)))
        })?;
        updated.owner = repo.owner.clone().filter(|o| o.id == updated.owner_id);

        let Some(mut handle) = handle else {
            return Ok(updated);
        };
        handle.committed(self.store());
        tracing::info!(
            repo = updated.id,
            private = updated.is_private,
            unlisted = updated.is_unlisted,
            affected = affected.len(),
            "changed repository visibility"
        );

        let mut result = Ok(());
        for (owner_name, r) in &affected {
            let marker = self.repo_path(owner_name, &r.name).join(DAEMON_EXPORT_FILE);
            if let Err(e) = toggle_export_marker(marker, !r.is_private).await {
                result = Err(e);
                break;
            }
        }
        match result {
            Ok(()) => handle.applied(self.store()),
            Err(e) => {
                handle.failed(self.store(), &e, false);
                return Err(e);
            }
        }
        Ok(updated)
    }
}

fn apply_visibility(conn: &rusqlite::Connection, repo: &Repository, owner: &Owner) -> Result<()> {
    access::recalculate_accesses(conn, repo, owner)?;
    social::set_actions_private(conn, repo.id, repo.is_action_private())
}

async fn toggle_export_marker(marker: PathBuf, exported: bool) -> Result<()> {
    let exists = tokio::fs::try_exists(&marker).await?;
    let outcome = if exported && !exists {
        tokio::fs::write(&marker, b"").await
    } else if !exported && exists {
        tokio::fs::remove_file(&marker).await
    } else {
        return Ok(());
    };
    outcome.map_err(|e| Error::operation(format!("toggle {}", marker.display()), e))
}

#[cfg(test)]
mod tests {
    use super::super::CreateRepoOptions;
    use super::super::test_support::*;
    use super::*;
    use crate::git::InitialFiles;
    use crate::store::Store;

    #[tokio::test]
    async fn test_truncates_long_fields() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let mut repo = t
            .engine
            .create_repository(
                &alice,
                &alice,
                CreateRepoOptions {
                    name: "demo".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        repo.description = "d".repeat(600);
        repo.website = "w".repeat(300);
        let updated = t.engine.update_repository(&repo, false).await.unwrap();
        assert_eq!(updated.description.len(), 512);

        let stored = t.engine.get_repository_by_id(repo.id).unwrap();
        assert_eq!(stored.website.len(), 255);
    }

    #[tokio::test]
    async fn test_update_with_outdated_copy_keeps_rename() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let stale = t
            .engine
            .create_repository(
                &alice,
                &alice,
                CreateRepoOptions {
                    name: "demo".into(),
                    is_private: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        t.engine
            .rename_repository(&alice, &alice, "demo", "renamed")
            .await
            .unwrap();

        let mut public = stale.clone();
        public.is_private = false;
        let updated = t.engine.update_repository(&public, true).await.unwrap();

        assert_eq!(updated.name, "renamed");
        assert!(!updated.is_private);
        assert!(t.engine.get_repository("alice", "renamed").is_ok());
        assert!(t
            .engine
            .repo_path("alice", "renamed")
            .join(DAEMON_EXPORT_FILE)
            .exists());
        assert!(!t.engine.repo_path("alice", "demo").exists());
    }

    #[tokio::test]
    async fn test_visibility_reaches_forks_of_forks() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let bob = user(&t.engine, "bob");
        let carol = user(&t.engine, "carol");

        let base = t
            .engine
            .create_repository(
                &alice,
                &alice,
                CreateRepoOptions {
                    name: "demo".into(),
                    auto_init: Some(InitialFiles::default()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let fork = t
            .engine
            .fork_repository(&bob, &bob, &base, "demo", "")
            .await
            .unwrap();
        let fork_of_fork = t
            .engine
            .fork_repository(&carol, &carol, &fork, "demo", "")
            .await
            .unwrap();

        let mut private = base.clone();
        private.is_private = true;
        t.engine.update_repository(&private, true).await.unwrap();

        for id in [fork.id, fork_of_fork.id] {
            assert!(t.engine.get_repository_by_id(id).unwrap().is_private);
        }
        let marker = t.engine.repo_path("carol", "demo").join(DAEMON_EXPORT_FILE);
        assert!(!marker.exists());

        let actions = t
            .engine
            .store()
            .read(|c| social::list_actions_for_repo(c, fork.id))
            .unwrap();
        assert!(actions.iter().all(|a| a.is_private));

        // Back to public restores the export marker.
        let mut public = private.clone();
        public.is_private = false;
        t.engine.update_repository(&public, true).await.unwrap();
        assert!(marker.exists());
    }
}
