//! Organizations, teams and collaborators: every change here rewrites the
//! access rows of the repositories it touches.

use rusqlite::Connection;

use super::{Engine, load_owner, load_repository, validation};
use crate::access;
use crate::error::{Error, Result};
use crate::store::{collab, repos, social, teams, users};
use crate::types::*;

/// Drops a watch the user can no longer back with read access.
fn unwatch_if_unreachable(conn: &Connection, user_id: i64, repo: &Repository) -> Result<()> {
    if !repo.is_private || repo.is_owned_by(user_id) {
        return Ok(());
    }
    let mode = collab::get_access_mode(conn, user_id, repo.id)?.unwrap_or_default();
    if !mode.has(AccessMode::Read) {
        social::set_watch(conn, user_id, repo.id, false)?;
    }
    Ok(())
}

/// Repositories a team grants access to. The owner team covers every org repository.
fn team_repositories(conn: &Connection, team: &Team) -> Result<Vec<Repository>> {
    if team.is_owner_team() {
        return repos::list_repositories_by_owner(conn, team.org_id);
    }
    repos::get_repositories_by_ids(conn, &teams::team_repo_ids(conn, team.id)?)
}

fn load_team(conn: &Connection, team_id: i64) -> Result<Team> {
    teams::get_team_by_id(conn, team_id)?.ok_or_else(|| Error::not_found(format!("team {team_id}")))
}

fn load_org(conn: &Connection, org_id: i64) -> Result<Owner> {
    match load_owner(conn, org_id)? {
        owner @ Owner::Organization(_) => Ok(owner),
        Owner::Individual(user) => Err(Error::BadRequest(format!(
            "'{}' is not an organization",
            user.name
        ))),
    }
}

impl Engine {
    /// Registers a user account after checking the name.
    pub fn create_user(&self, name: &str, email: &str) -> Result<User> {
        validation::validate_user_name(name)?;
        self.store()
            .transaction(|tx| users::insert_user(tx, &NewUser::individual(name, email)))
    }

    /// Creates an organization whose Owners team contains `creator`.
    pub fn create_organization(&self, creator: &User, name: &str) -> Result<User> {
        validation::validate_user_name(name)?;
        let org = self.store().transaction(|tx| {
            let org = users::insert_user(tx, &NewUser::organization(name))?;
            users::add_org_user(tx, org.id, creator.id, true)?;
            let owners = teams::insert_team(tx, org.id, OWNER_TEAM_NAME, "", AccessMode::Owner)?;
            teams::add_team_user(tx, &owners, creator.id)?;
            users::get_user_by_id(tx, org.id)?
                .ok_or_else(|| Error::not_found(format!("organization '{name}'")))
        })?;
        tracing::info!(org = %org.name, creator = %creator.name, "created organization");
        Ok(org)
    }

    pub fn create_team(
        &self,
        org_id: i64,
        name: &str,
        description: &str,
        authorize: AccessMode,
    ) -> Result<Team> {
        validation::validate_team_name(name)?;
        if authorize == AccessMode::None || authorize == AccessMode::Owner {
            return Err(Error::BadRequest(format!(
                "team permission must be read, write or admin, got {authorize}"
            )));
        }
        self.store().transaction(|tx| {
            load_org(tx, org_id)?;
            teams::insert_team(tx, org_id, name, description, authorize)
        })
    }

    /// Adds a user to a team, making them an organization member if needed.
    pub fn add_team_member(&self, team_id: i64, user_id: i64) -> Result<bool> {
        self.store().transaction(|tx| {
            let team = load_team(tx, team_id)?;
            let org = load_org(tx, team.org_id)?;
            users::add_org_user(tx, team.org_id, user_id, team.is_owner_team())?;
            if !teams::add_team_user(tx, &team, user_id)? {
                return Ok(false);
            }

            for repo in team_repositories(tx, &team)? {
                access::recalculate_accesses(tx, &repo, &org)?;
                social::set_watch(tx, user_id, repo.id, true)?;
            }
            Ok(true)
        })
    }

    /// Removes a user from a team. The last member of the owner team stays.
    pub fn remove_team_member(&self, team_id: i64, user_id: i64) -> Result<bool> {
        self.store().transaction(|tx| {
            let team = load_team(tx, team_id)?;
            let org = load_org(tx, team.org_id)?;
            if team.is_owner_team() && team.num_members <= 1 {
                let members = teams::team_member_ids(tx, team.id)?;
                if members == [user_id] {
                    return Err(Error::BadRequest(
                        "cannot remove the last member of the owner team".into(),
                    ));
                }
            }
            if !teams::remove_team_user(tx, &team, user_id)? {
                return Ok(false);
            }

            for repo in team_repositories(tx, &team)? {
                access::recalculate_accesses(tx, &repo, &org)?;
                unwatch_if_unreachable(tx, user_id, &repo)?;
            }
            Ok(true)
        })
    }

    /// Grants a team access to one of its organization's repositories.
    pub fn add_team_repository(&self, team_id: i64, repo_id: i64) -> Result<bool> {
        self.store().transaction(|tx| {
            let team = load_team(tx, team_id)?;
            let repo = load_repository(tx, repo_id)?;
            if repo.owner_id != team.org_id {
                return Err(Error::BadRequest(format!(
                    "repository {repo_id} does not belong to the team's organization"
                )));
            }
            if !teams::add_team_repo(tx, &team, repo.id)? {
                return Ok(false);
            }

            let org = load_org(tx, team.org_id)?;
            access::recalculate_accesses(tx, &repo, &org)?;
            for member in teams::team_member_ids(tx, team.id)? {
                social::set_watch(tx, member, repo.id, true)?;
            }
            Ok(true)
        })
    }

    /// Detaches a repository from a team. The owner team cannot be detached.
    pub fn remove_team_repository(&self, team_id: i64, repo_id: i64) -> Result<bool> {
        self.store().transaction(|tx| {
            let team = load_team(tx, team_id)?;
            if team.is_owner_team() || !teams::has_team_repo(tx, team.id, repo_id)? {
                return Ok(false);
            }
            let repo = load_repository(tx, repo_id)?;
            let org = load_org(tx, team.org_id)?;

            teams::remove_team_repo(tx, team.id, repo.id)?;
            access::recalculate_accesses_ignoring(tx, &repo, &org, Some(team.id))?;
            for member in teams::team_member_ids(tx, team.id)? {
                unwatch_if_unreachable(tx, member, &repo)?;
            }
            Ok(true)
        })
    }

    pub fn set_team_authorize(&self, team_id: i64, authorize: AccessMode) -> Result<()> {
        self.store().transaction(|tx| {
            let team = load_team(tx, team_id)?;
            if team.is_owner_team() {
                return Err(Error::BadRequest(
                    "the owner team's permission cannot change".into(),
                ));
            }
            if team.authorize == authorize {
                return Ok(());
            }
            let org = load_org(tx, team.org_id)?;
            teams::set_team_authorize(tx, team.id, authorize)?;
            for repo in team_repositories(tx, &team)? {
                access::recalculate_accesses(tx, &repo, &org)?;
            }
            Ok(())
        })
    }

    /// Grants `user_id` write access to `repo_id`. Returns false if already a collaborator.
    pub fn add_collaborator(&self, repo_id: i64, user_id: i64) -> Result<bool> {
        self.store().transaction(|tx| {
            let repo = load_repository(tx, repo_id)?;
            if repo.is_owned_by(user_id) {
                return Err(Error::BadRequest(
                    "the owner cannot be a collaborator".into(),
                ));
            }
            users::get_user_by_id(tx, user_id)?
                .ok_or_else(|| Error::not_found(format!("user {user_id}")))?;
            if collab::get_collaboration(tx, repo.id, user_id)?.is_some() {
                return Ok(false);
            }

            collab::upsert_collaboration(tx, repo.id, user_id, AccessMode::Write)?;
            let owner = load_owner(tx, repo.owner_id)?;
            access::recalculate_accesses(tx, &repo, &owner)?;
            Ok(true)
        })
    }

    pub fn change_collaboration_mode(&self, repo_id: i64, user_id: i64, mode: AccessMode) -> Result<()> {
        if mode == AccessMode::None || mode == AccessMode::Owner {
            return Err(Error::BadRequest(format!(
                "collaboration mode must be read, write or admin, got {mode}"
            )));
        }
        self.store().transaction(|tx| {
            let repo = load_repository(tx, repo_id)?;
            let existing = collab::get_collaboration(tx, repo.id, user_id)?.ok_or_else(|| {
                Error::not_found(format!("collaboration of user {user_id} on repository {repo_id}"))
            })?;
            if existing.mode == mode {
                return Ok(());
            }

            collab::upsert_collaboration(tx, repo.id, user_id, mode)?;
            let owner = load_owner(tx, repo.owner_id)?;
            access::recalculate_accesses(tx, &repo, &owner)
        })
    }

    pub fn remove_collaborator(&self, repo_id: i64, user_id: i64) -> Result<bool> {
        self.store().transaction(|tx| {
            let repo = load_repository(tx, repo_id)?;
            if !collab::delete_collaboration(tx, repo.id, user_id)? {
                return Ok(false);
            }
            let owner = load_owner(tx, repo.owner_id)?;
            access::recalculate_accesses(tx, &repo, &owner)?;
            unwatch_if_unreachable(tx, user_id, &repo)?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::CreateRepoOptions;
    use super::super::test_support::*;
    use super::*;
    use crate::store::Store;

    async fn org_repo(t: &TestEngine, creator: &User, org: &User, name: &str) -> Repository {
        t.engine
            .create_repository(
                creator,
                org,
                CreateRepoOptions {
                    name: name.into(),
                    is_private: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_org_creation_gives_creator_owner_access() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let org = t.engine.create_organization(&alice, "acme").unwrap();
        assert!(org.is_organization());
        assert_eq!(org.num_teams, 1);

        let repo = org_repo(&t, &alice, &org, "tools").await;
        assert_eq!(
            t.engine.store().get_access_mode(alice.id, repo.id).unwrap(),
            Some(AccessMode::Owner)
        );
        assert!(t.engine.is_watching(alice.id, repo.id).unwrap());
    }

    #[tokio::test]
    async fn test_team_repository_lifecycle() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let wes = user(&t.engine, "wes");
        let org = t.engine.create_organization(&alice, "acme").unwrap();
        let repo = org_repo(&t, &alice, &org, "tools").await;

        let writers = t
            .engine
            .create_team(org.id, "Writers", "", AccessMode::Write)
            .unwrap();
        assert!(t.engine.add_team_member(writers.id, wes.id).unwrap());
        assert_eq!(t.engine.store().get_access_mode(wes.id, repo.id).unwrap(), None);

        assert!(t.engine.add_team_repository(writers.id, repo.id).unwrap());
        assert_eq!(
            t.engine.store().get_access_mode(wes.id, repo.id).unwrap(),
            Some(AccessMode::Write)
        );
        assert!(t.engine.is_watching(wes.id, repo.id).unwrap());

        t.engine.set_team_authorize(writers.id, AccessMode::Admin).unwrap();
        assert_eq!(
            t.engine.store().get_access_mode(wes.id, repo.id).unwrap(),
            Some(AccessMode::Admin)
        );

        assert!(t.engine.remove_team_repository(writers.id, repo.id).unwrap());
        assert_eq!(t.engine.store().get_access_mode(wes.id, repo.id).unwrap(), None);
        assert!(!t.engine.is_watching(wes.id, repo.id).unwrap());
        let writers = t.engine.store().get_team(org.id, "writers").unwrap().unwrap();
        assert_eq!(writers.num_repos, 0);
    }

    #[tokio::test]
    async fn test_owner_team_rules() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let org = t.engine.create_organization(&alice, "acme").unwrap();
        let repo = org_repo(&t, &alice, &org, "tools").await;
        let owners = t.engine.store().get_team(org.id, OWNER_TEAM_NAME).unwrap().unwrap();

        // Detaching the owner team is a no-op.
        assert!(!t.engine.remove_team_repository(owners.id, repo.id).unwrap());
        let err = t.engine.remove_team_member(owners.id, alice.id).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let olivia = user(&t.engine, "olivia");
        assert!(t.engine.add_team_member(owners.id, olivia.id).unwrap());
        assert_eq!(
            t.engine.store().get_access_mode(olivia.id, repo.id).unwrap(),
            Some(AccessMode::Owner)
        );
        assert!(t.engine.remove_team_member(owners.id, alice.id).unwrap());
        assert_eq!(t.engine.store().get_access_mode(alice.id, repo.id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_collaborators() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let bob = user(&t.engine, "bob");
        let repo = t
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

        assert!(matches!(
            t.engine.add_collaborator(repo.id, alice.id).unwrap_err(),
            Error::BadRequest(_)
        ));
        assert!(t.engine.add_collaborator(repo.id, bob.id).unwrap());
        assert!(!t.engine.add_collaborator(repo.id, bob.id).unwrap());
        assert!(t.engine.authorize(Some(&bob), &repo, AccessMode::Write).unwrap());

        t.engine
            .change_collaboration_mode(repo.id, bob.id, AccessMode::Read)
            .unwrap();
        assert!(!t.engine.authorize(Some(&bob), &repo, AccessMode::Write).unwrap());

        t.engine.watch_repository(bob.id, repo.id, true).unwrap();
        assert!(t.engine.remove_collaborator(repo.id, bob.id).unwrap());
        assert_eq!(t.engine.access_mode(Some(&bob), &repo).unwrap(), AccessMode::None);
        assert!(!t.engine.is_watching(bob.id, repo.id).unwrap());
    }

    #[test]
    fn test_create_user_validates() {
        let t = engine();
        assert!(t.engine.create_user("alice", "a@example.com").is_ok());
        assert!(matches!(
            t.engine.create_user("admin", "").unwrap_err(),
            Error::NameNotAllowed { .. }
        ));
    }
}
