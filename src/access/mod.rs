//! Effective access of users on repositories.
//!
//! The write side recomputes a repository's full user -> mode map from
//! collaborations and, for organization owners, team membership, then swaps
//! it into the `access` table. It always runs on the caller's transaction.
//! The read side only consults that table.

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::error::Result;
use crate::store::{Store, collab, teams};
use crate::types::*;

pub type AccessMap = BTreeMap<i64, AccessMode>;

/// Computes the access map of `repo`, skipping `ignored_team` when given.
pub fn compute_access_map(
    conn: &Connection,
    repo: &Repository,
    owner: &Owner,
    ignored_team: Option<i64>,
) -> Result<AccessMap> {
    let mut map: AccessMap = collab::list_collaborations(conn, repo.id)?
        .into_iter()
        .map(|c| (c.user_id, c.mode))
        .collect();

    let Owner::Organization(org) = owner else {
        return Ok(map);
    };

    for team in teams::list_org_teams(conn, org.id)? {
        if Some(team.id) == ignored_team {
            continue;
        }

        let authorize = if team.is_owner_team() {
            AccessMode::Owner
        } else if teams::has_team_repo(conn, team.id, repo.id)? {
            team.authorize
        } else {
            continue;
        };

        for user_id in teams::team_member_ids(conn, team.id)? {
            let entry = map.entry(user_id).or_default();
            *entry = (*entry).max(authorize);
        }
    }

    Ok(map)
}

/// Replaces the access rows of `repo` with `map`.
pub fn commit_access_map(conn: &Connection, repo_id: i64, map: &AccessMap) -> Result<()> {
    let entries: Vec<Access> = map
        .iter()
        .map(|(&user_id, &mode)| Access {
            user_id,
            repo_id,
            mode,
        })
        .collect();
    collab::replace_accesses(conn, repo_id, &entries)
}

pub fn recalculate_accesses(conn: &Connection, repo: &Repository, owner: &Owner) -> Result<()> {
    recalculate_accesses_ignoring(conn, repo, owner, None)
}

/// Recalculates while leaving out one team, used when that team is being
/// detached from the repository.
pub fn recalculate_accesses_ignoring(
    conn: &Connection,
    repo: &Repository,
    owner: &Owner,
    ignored_team: Option<i64>,
) -> Result<()> {
    let map = compute_access_map(conn, repo, owner, ignored_team)?;
    tracing::debug!(repo_id = repo.id, entries = map.len(), "recalculated accesses");
    commit_access_map(conn, repo.id, &map)
}

/// Effective mode of `user` on `repo`. `None` is an anonymous visitor.
pub fn access_mode(store: &dyn Store, user: Option<&User>, repo: &Repository) -> Result<AccessMode> {
    let default = if repo.is_private {
        AccessMode::None
    } else {
        AccessMode::Read
    };

    let Some(user) = user else {
        return Ok(default);
    };
    if repo.is_owned_by(user.id) {
        return Ok(AccessMode::Owner);
    }

    let cached = store.get_access_mode(user.id, repo.id)?.unwrap_or_default();
    Ok(default.max(cached))
}

/// Returns true if `user` holds at least `required` on `repo`.
pub fn authorize(
    store: &dyn Store,
    user: Option<&User>,
    repo: &Repository,
    required: AccessMode,
) -> Result<bool> {
    Ok(access_mode(store, user, repo)?.has(required))
}
