use std::path::Path;
use std::time::Duration;

use super::create::insert_repository_tx;
use super::{Engine, validation};
use crate::error::{Error, Result};
use crate::git::hooks::install_hooks;
use crate::git::{CloneOptions, process};
use crate::store::repos::{self, RepoCounter};
use crate::store::Store;
use crate::types::*;

const FORK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

impl Engine {
    /// Forks `base` into `owner`'s namespace under `name`.
    pub async fn fork_repository(
        &self,
        doer: &User,
        owner: &User,
        base: &Repository,
        name: &str,
        description: &str,
    ) -> Result<Repository> {
        validation::validate_repo_name(name)?;
        if !base.can_be_forked() {
            return Err(Error::BadRequest(format!(
                "repository {} is empty and cannot be forked",
                base.id
            )));
        }

        let base_path = self.repo_path_of(base)?;
        let owner = Owner::from(owner.clone());

        let mut draft = Repository::new(owner.id(), name);
        draft.description = description.to_string();
        super::truncate_chars(&mut draft.description, 512);
        draft.is_private = base.is_private;
        draft.is_unlisted = base.is_unlisted;
        draft.default_branch = base.default_branch.clone();
        draft.is_fork = true;
        draft.fork_id = base.id;

        let limit = self.global_repo_limit();
        let (mut repo, mut handle) = self.store().transaction(|tx| {
            let created = insert_repository_tx(tx, limit, doer, &owner, &draft, OperationKind::Fork)?;
            repos::incr_counter(tx, base.id, RepoCounter::Forks, 1)?;
            Ok(created)
        })?;
        handle.committed(self.store());
        tracing::info!(base = base.id, fork = repo.id, owner = owner.name(), "forked repository");

        let repo_path = self.repo_path(owner.name(), &repo.name);
        let result = {
            let _guard = self.pool().check_in(repo.id.to_string()).await;
            self.clone_fork_tree(&base_path, &repo_path).await
        };
        if let Err(e) = result {
            return Err(self.compensate(&mut handle, e, &[&repo_path]).await);
        }
        handle.applied(self.store());

        self.refresh_size(repo.id, &repo_path).await;
        repo.owner = Some(owner.into_user());
        Ok(repo)
    }

    async fn clone_fork_tree(&self, base_path: &Path, repo_path: &Path) -> Result<()> {
        let opts = CloneOptions {
            bare: true,
            timeout: Some(FORK_TIMEOUT),
            ..Default::default()
        };
        process::clone(base_path.as_os_str(), repo_path, &opts).await?;
        process::update_server_info(repo_path).await?;
        install_hooks(self.config(), repo_path).await
    }

    /// Re-measures the on-disk size of a repository. Failures are only logged.
    pub(crate) async fn refresh_size(&self, repo_id: i64, repo_path: &Path) {
        let size = match process::count_objects_size(repo_path).await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(repo_id, error = %e, "failed to measure repository size");
                return;
            }
        };
        if let Err(e) = self.store().read(|c| repos::set_size(c, repo_id, size)) {
            tracing::warn!(repo_id, error = %e, "failed to record repository size");
        }
    }

    /// Returns true if `owner_id` already owns a fork of `base_id`.
    pub fn has_forked_repository(&self, owner_id: i64, base_id: i64) -> Result<bool> {
        Ok(self
            .store()
            .read(|c| repos::get_fork_by_owner(c, owner_id, base_id))?
            .is_some())
    }

    pub fn get_forks(&self, base: &Repository) -> Result<Vec<Repository>> {
        self.store().list_forks(base.id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::CreateRepoOptions;
    use super::*;
    use crate::git::InitialFiles;

    #[tokio::test]
    async fn test_fork_inherits_and_counts() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let bob = user(&t.engine, "bob");

        let base = t
            .engine
            .create_repository(
                &alice,
                &alice,
                CreateRepoOptions {
                    name: "demo".into(),
                    is_private: true,
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

        assert!(fork.is_fork);
        assert_eq!(fork.fork_id, base.id);
        assert!(fork.is_private);
        assert_eq!(fork.default_branch, base.default_branch);
        assert!(t.engine.repo_path("bob", "demo").join("hooks/update").exists());

        let base = t.engine.get_repository_by_id(base.id).unwrap();
        assert_eq!(base.num_forks, 1);
        assert!(t.engine.has_forked_repository(bob.id, base.id).unwrap());
        assert_eq!(t.engine.get_forks(&base).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_base_cannot_be_forked() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let base = t
            .engine
            .create_repository(
                &alice,
                &alice,
                CreateRepoOptions {
                    name: "empty".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = t
            .engine
            .fork_repository(&alice, &alice, &base, "copy", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
