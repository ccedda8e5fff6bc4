use super::Engine;
use super::work::remove_best_effort;
use crate::error::{Error, Result};
use crate::git::{GitCommand, sync_local_copy};
use crate::types::Repository;

impl Engine {
    /// Brings the repository's local copy to `branch`, cloning it if needed.
    pub async fn update_local_copy_branch(&self, repo: &Repository, branch: &str) -> Result<()> {
        let canonical = self.repo_path_of(repo)?;
        let local = self.local_copy_path(repo.id);
        let _guard = self.pool().check_in(repo.id.to_string()).await;
        sync_local_copy(&canonical, &local, branch, false, self.config().clone_timeout()).await
    }

    /// Brings the local wiki copy up to date with the wiki's default branch.
    pub async fn update_local_wiki_copy(&self, repo: &Repository) -> Result<()> {
        let canonical = self.wiki_path_of(repo)?;
        let local = self.local_wiki_path(repo.id);
        let _guard = self.pool().check_in(repo.id.to_string()).await;
        sync_local_copy(&canonical, &local, "master", true, self.config().clone_timeout()).await
    }

    pub async fn delete_local_copy(&self, repo: &Repository) {
        let _guard = self.pool().check_in(repo.id.to_string()).await;
        remove_best_effort(&self.local_copy_path(repo.id)).await;
    }

    /// Creates `new_branch` from `old_branch` and pushes it to the repository.
    pub async fn create_new_branch(&self, repo: &Repository, old_branch: &str, new_branch: &str) -> Result<()> {
        if new_branch.trim().is_empty() || new_branch.starts_with('-') {
            return Err(Error::BadRequest(format!("invalid branch name '{new_branch}'")));
        }
        let canonical = self.repo_path_of(repo)?;
        let local = self.local_copy_path(repo.id);

        let _guard = self.pool().check_in(repo.id.to_string()).await;
        sync_local_copy(&canonical, &local, old_branch, false, self.config().clone_timeout()).await?;
        GitCommand::new("create branch")
            .current_dir(&local)
            .args(["checkout", "-b", new_branch])
            .run()
            .await?;
        GitCommand::new("push branch")
            .current_dir(&local)
            .args(["push", "origin", new_branch])
            .timeout(self.config().clone_timeout())
            .run()
            .await?;
        tracing::info!(repo = repo.id, from = old_branch, branch = new_branch, "created branch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::CreateRepoOptions;
    use super::super::test_support::*;
    use super::*;
    use crate::git::InitialFiles;

    async fn initialized(t: &TestEngine) -> Repository {
        let alice = user(&t.engine, "alice");
        t.engine
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
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_copy_is_reused() {
        let t = engine();
        let repo = initialized(&t).await;

        t.engine.update_local_copy_branch(&repo, "main").await.unwrap();
        let readme = t.engine.local_copy_path(repo.id).join("README.md");
        assert!(readme.exists());

        std::fs::write(&readme, "local edit").unwrap();
        t.engine.update_local_copy_branch(&repo, "main").await.unwrap();
        assert_ne!(std::fs::read_to_string(&readme).unwrap(), "local edit");
        assert!(!t.engine.pool().is_checked_in(&repo.id.to_string()));

        t.engine.delete_local_copy(&repo).await;
        assert!(!t.engine.local_copy_path(repo.id).exists());
    }

    #[tokio::test]
    async fn test_create_new_branch_pushes() {
        let t = engine();
        let repo = initialized(&t).await;

        t.engine.create_new_branch(&repo, "main", "feature").await.unwrap();
        let canonical = git2::Repository::open_bare(t.engine.repo_path("alice", "demo")).unwrap();
        assert!(canonical.find_branch("feature", git2::BranchType::Local).is_ok());

        let err = t.engine.create_new_branch(&repo, "main", "-x").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_missing_branch_names_step() {
        let t = engine();
        let repo = initialized(&t).await;
        t.engine.update_local_copy_branch(&repo, "main").await.unwrap();

        let err = t
            .engine
            .update_local_copy_branch(&repo, "no-such-branch")
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some("checkout"));
    }
}
