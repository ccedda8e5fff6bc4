//! Operations that move a repository's tree: ownership transfer and rename.

use std::path::Path;

use super::journal::OperationHandle;
use super::{Engine, load_owner, load_repository, validation};
use crate::access;
use crate::error::{Error, Result};
use crate::git::process;
use crate::store::social::{self, NewAction};
use crate::store::{collab, repos, teams, users};
use crate::types::*;

impl Engine {
    /// Hands `repo` over to the user or organization named `new_owner_name`.
    pub async fn transfer_ownership(
        &self,
        doer: &User,
        new_owner_name: &str,
        repo: &Repository,
    ) -> Result<Repository> {
        let new_owner = Owner::from(self.get_user_by_name(new_owner_name)?);

        let (old_owner, mut repo, mut handle) = self.store().transaction(|tx| {
            // The caller's copy may predate another transfer or rename.
            let repo = load_repository(tx, repo.id)?;
            let old_owner = load_owner(tx, repo.owner_id)?;
            if repos::repository_exists(tx, new_owner.id(), &repo.name)? {
                return Err(Error::AlreadyExists(format!(
                    "repository '{}/{}'",
                    new_owner.name(),
                    repo.name
                )));
            }

            repos::set_owner(tx, repo.id, new_owner.id())?;

            // Grants that the new ownership already covers.
            collab::delete_collaboration(tx, repo.id, new_owner.id())?;
            if let Owner::Organization(org) = &new_owner {
                for member in users::org_member_ids(tx, org.id)? {
                    collab::delete_collaboration(tx, repo.id, member)?;
                }
            }

            if old_owner.is_organization() {
                for team in teams::list_teams_with_repo(tx, repo.id)? {
                    teams::remove_team_repo(tx, team.id, repo.id)?;
                }
            }

            let moved = load_repository(tx, repo.id)?;
            match &new_owner {
                Owner::Organization(org) => {
                    let owner_team = teams::get_owner_team(tx, org.id)?;
                    teams::add_team_repo(tx, &owner_team, moved.id)?;
                    access::recalculate_accesses(tx, &moved, &new_owner)?;
                    for member in teams::team_member_ids(tx, owner_team.id)? {
                        social::set_watch(tx, member, moved.id, true)?;
                    }
                }
                Owner::Individual(_) => access::recalculate_accesses(tx, &moved, &new_owner)?,
            }

            users::incr_num_repos(tx, new_owner.id(), 1)?;
            users::incr_num_repos(tx, old_owner.id(), -1)?;

            if old_owner.is_organization() {
                social::set_watch(tx, old_owner.id(), moved.id, false)?;
            }
            social::set_watch(tx, new_owner.id(), moved.id, true)?;

            let moved = load_repository(tx, moved.id)?;
            social::notify_watchers(
                tx,
                &NewAction {
                    op_type: ActionType::TransferRepo,
                    act_user: doer,
                    repo: &moved,
                    repo_owner_name: new_owner.name(),
                    content: format!("{}/{}", old_owner.name(), moved.name),
                },
            )?;

            let handle = OperationHandle::begin(tx, moved.id, OperationKind::Transfer)?;
            Ok((old_owner, moved, handle))
        })?;
        handle.committed(self.store());
        tracing::info!(
            repo = repo.id,
            from = old_owner.name(),
            to = new_owner.name(),
            "transferred repository"
        );

        let result = self
            .move_trees(old_owner.name(), &repo.name, new_owner.name(), &repo.name)
            .await;
        self.finish_move(&mut handle, result)?;
        self.drop_local_copies(repo.id).await;

        repo.owner = Some(new_owner.into_user());
        Ok(repo)
    }

    /// Renames `owner`'s repository `old_name` to `new_name`.
    pub async fn rename_repository(
        &self,
        doer: &User,
        owner: &User,
        old_name: &str,
        new_name: &str,
    ) -> Result<Repository> {
        validation::validate_repo_name(new_name)?;
        let case_only = old_name.eq_ignore_ascii_case(new_name);

        let (old_name, mut repo, mut handle) = self.store().transaction(|tx| {
            let repo = repos::get_repository_by_name(tx, owner.id, old_name)?.ok_or_else(|| {
                Error::not_found(format!("repository '{}/{old_name}'", owner.name))
            })?;
            if !case_only && repos::repository_exists(tx, owner.id, new_name)? {
                return Err(Error::AlreadyExists(format!(
                    "repository '{}/{new_name}'",
                    owner.name
                )));
            }

            repos::set_name(tx, repo.id, new_name)?;
            let renamed = load_repository(tx, repo.id)?;
            social::notify_watchers(
                tx,
                &NewAction {
                    op_type: ActionType::RenameRepo,
                    act_user: doer,
                    repo: &renamed,
                    repo_owner_name: &owner.name,
                    content: repo.name.clone(),
                },
            )?;

            let handle = OperationHandle::begin(tx, renamed.id, OperationKind::Rename)?;
            Ok((repo.name, renamed, handle))
        })?;
        handle.committed(self.store());
        tracing::info!(repo = repo.id, from = %old_name, to = new_name, "renamed repository");

        let result = if case_only {
            Ok(())
        } else {
            self.move_trees(&owner.name, &old_name, &owner.name, new_name)
                .await
        };
        self.finish_move(&mut handle, result)?;
        self.drop_local_copies(repo.id).await;

        repo.owner = Some(owner.clone());
        Ok(repo)
    }

    async fn move_trees(
        &self,
        old_owner: &str,
        old_name: &str,
        new_owner: &str,
        new_name: &str,
    ) -> Result<()> {
        process::move_tree(
            &self.repo_path(old_owner, old_name),
            &self.repo_path(new_owner, new_name),
        )
        .await?;

        let old_wiki = self.wiki_path(old_owner, old_name);
        if is_dir(&old_wiki).await {
            process::move_tree(&old_wiki, &self.wiki_path(new_owner, new_name)).await?;
        }
        Ok(())
    }

    /// A failed move leaves the tree wherever it is; only the journal records it.
    fn finish_move(&self, handle: &mut OperationHandle, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                handle.applied(self.store());
                Ok(())
            }
            Err(e) => {
                handle.failed(self.store(), &e, false);
                Err(e)
            }
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::super::CreateRepoOptions;
    use super::super::test_support::*;
    use super::*;
    use crate::store::Store;

    async fn create(t: &TestEngine, owner: &User, name: &str) -> Repository {
        t.engine
            .create_repository(
                owner,
                owner,
                CreateRepoOptions {
                    name: name.into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_transfer_to_individual() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let bob = user(&t.engine, "bob");
        let repo = create(&t, &alice, "demo").await;

        t.engine
            .store()
            .transaction(|tx| collab::upsert_collaboration(tx, repo.id, bob.id, AccessMode::Write))
            .unwrap();

        let moved = t
            .engine
            .transfer_ownership(&alice, "bob", &repo)
            .await
            .unwrap();

        assert_eq!(moved.owner_id, bob.id);
        assert!(!t.engine.repo_path("alice", "demo").exists());
        assert!(t.engine.repo_path("bob", "demo").exists());

        // Bob's collaboration is subsumed by ownership.
        assert!(t.engine.store().list_accesses(repo.id).unwrap().is_empty());
        assert_eq!(t.engine.store().get_user(alice.id).unwrap().unwrap().num_repos, 0);
        assert_eq!(t.engine.store().get_user(bob.id).unwrap().unwrap().num_repos, 1);

        let actions = t
            .engine
            .store()
            .read(|c| social::list_actions_for_repo(c, repo.id))
            .unwrap();
        let transfer = actions
            .iter()
            .find(|a| a.op_type == ActionType::TransferRepo)
            .unwrap();
        assert_eq!(transfer.content, "alice/demo");
    }

    #[tokio::test]
    async fn test_transfer_collision() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let bob = user(&t.engine, "bob");
        let repo = create(&t, &alice, "demo").await;
        create(&t, &bob, "demo").await;

        let err = t
            .engine
            .transfer_ownership(&alice, "bob", &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(t.engine.repo_path("alice", "demo").exists());
    }

    #[tokio::test]
    async fn test_transfer_with_outdated_copy_uses_current_owner() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let bob = user(&t.engine, "bob");
        let carol = user(&t.engine, "carol");
        let snapshot = create(&t, &alice, "demo").await;

        t.engine
            .transfer_ownership(&alice, "bob", &snapshot)
            .await
            .unwrap();
        let moved = t
            .engine
            .transfer_ownership(&bob, "carol", &snapshot)
            .await
            .unwrap();

        assert_eq!(moved.owner_id, carol.id);
        assert!(t.engine.repo_path("carol", "demo").is_dir());
        assert!(!t.engine.repo_path("bob", "demo").exists());
        assert!(!t.engine.repo_path("alice", "demo").exists());

        let store = t.engine.store();
        assert_eq!(store.get_user(alice.id).unwrap().unwrap().num_repos, 0);
        assert_eq!(store.get_user(bob.id).unwrap().unwrap().num_repos, 0);
        assert_eq!(store.get_user(carol.id).unwrap().unwrap().num_repos, 1);

        let actions = store
            .read(|c| social::list_actions_for_repo(c, snapshot.id))
            .unwrap();
        assert!(actions
            .iter()
            .any(|a| a.op_type == ActionType::TransferRepo && a.content == "bob/demo"));
    }

    #[tokio::test]
    async fn test_transfer_from_user_to_organization() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let bob = user(&t.engine, "bob");
        let carol = user(&t.engine, "carol");
        let acme = t.engine.create_organization(&carol, "acme").unwrap();
        let repo = create(&t, &alice, "tool").await;

        t.engine
            .store()
            .transaction(|tx| {
                collab::upsert_collaboration(tx, repo.id, bob.id, AccessMode::Write)?;
                collab::upsert_collaboration(tx, repo.id, carol.id, AccessMode::Read)
            })
            .unwrap();

        let moved = t
            .engine
            .transfer_ownership(&alice, "acme", &repo)
            .await
            .unwrap();
        assert_eq!(moved.owner_id, acme.id);
        assert!(t.engine.repo_path("acme", "tool").is_dir());

        let store = t.engine.store();
        assert_eq!(store.get_user(alice.id).unwrap().unwrap().num_repos, 0);
        assert_eq!(store.get_user(acme.id).unwrap().unwrap().num_repos, 1);

        let owners = store.get_team(acme.id, OWNER_TEAM_NAME).unwrap().unwrap();
        assert_eq!(owners.num_repos, 1);
        assert_eq!(owners.num_members, 1);

        // Carol's collaboration is dropped; her team membership grants Owner.
        let mut accesses: Vec<(i64, AccessMode)> = store
            .list_accesses(repo.id)
            .unwrap()
            .into_iter()
            .map(|a| (a.user_id, a.mode))
            .collect();
        accesses.sort();
        let mut expected = vec![(bob.id, AccessMode::Write), (carol.id, AccessMode::Owner)];
        expected.sort();
        assert_eq!(accesses, expected);
        assert!(store
            .read(|c| collab::list_collaborations(c, repo.id))
            .unwrap()
            .iter()
            .all(|c| c.user_id != carol.id));
        assert!(t.engine.is_watching(carol.id, repo.id).unwrap());
    }

    #[tokio::test]
    async fn test_rename_with_stale_name_fails_cleanly() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        create(&t, &alice, "demo").await;
        t.engine
            .rename_repository(&alice, &alice, "demo", "first")
            .await
            .unwrap();

        let err = t
            .engine
            .rename_repository(&alice, &alice, "demo", "second")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(t.engine.repo_path("alice", "first").is_dir());
        assert!(!t.engine.repo_path("alice", "second").exists());
    }

    #[tokio::test]
    async fn test_rename_moves_tree_and_records_action() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let repo = create(&t, &alice, "demo").await;
        tokio::fs::create_dir_all(t.engine.local_copy_path(repo.id))
            .await
            .unwrap();

        let renamed = t
            .engine
            .rename_repository(&alice, &alice, "demo", "renamed")
            .await
            .unwrap();

        assert_eq!(renamed.lower_name, "renamed");
        assert!(t.engine.repo_path("alice", "renamed").exists());
        assert!(!t.engine.repo_path("alice", "demo").exists());
        assert!(!t.engine.local_copy_path(repo.id).exists());

        let actions = t
            .engine
            .store()
            .read(|c| social::list_actions_for_repo(c, repo.id))
            .unwrap();
        assert!(actions
            .iter()
            .any(|a| a.op_type == ActionType::RenameRepo && a.content == "demo"));
    }

    #[tokio::test]
    async fn test_rename_rejects_existing_and_reserved() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        create(&t, &alice, "one").await;
        create(&t, &alice, "two").await;

        let err = t
            .engine
            .rename_repository(&alice, &alice, "one", "two")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = t
            .engine
            .rename_repository(&alice, &alice, "one", "one.wiki")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NameNotAllowed { .. }));
    }
}
