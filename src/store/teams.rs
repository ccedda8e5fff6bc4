use rusqlite::{Connection, OptionalExtension, params};

use super::rows::{TEAM_COLUMNS, is_unique_violation, team_from_row};
use crate::error::{Error, Result};
use crate::types::*;

pub fn insert_team(
    conn: &Connection,
    org_id: i64,
    name: &str,
    description: &str,
    authorize: AccessMode,
) -> Result<Team> {
    let result = conn.execute(
        "INSERT INTO teams (org_id, name, lower_name, description, authorize)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![org_id, name, name.to_lowercase(), description, authorize.as_i64()],
    );
    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(Error::AlreadyExists(format!("team '{name}'")));
        }
        Err(e) => return Err(Error::from(e)),
    }
    let id = conn.last_insert_rowid();
    conn.execute(
        "UPDATE users SET num_teams = num_teams + 1 WHERE id = ?1",
        params![org_id],
    )?;

    get_team_by_id(conn, id)?.ok_or_else(|| Error::not_found(format!("team '{name}'")))
}

pub fn get_team_by_id(conn: &Connection, id: i64) -> Result<Option<Team>> {
    conn.query_row(
        &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
        params![id],
        team_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_team_by_name(conn: &Connection, org_id: i64, name: &str) -> Result<Option<Team>> {
    conn.query_row(
        &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE org_id = ?1 AND lower_name = ?2"),
        params![org_id, name.to_lowercase()],
        team_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_owner_team(conn: &Connection, org_id: i64) -> Result<Team> {
    get_team_by_name(conn, org_id, OWNER_TEAM_NAME)?
        .ok_or_else(|| Error::not_found(format!("owner team of organization {org_id}")))
}

pub fn list_org_teams(conn: &Connection, org_id: i64) -> Result<Vec<Team>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEAM_COLUMNS} FROM teams WHERE org_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![org_id], team_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Teams of any organization that list `repo_id` among their repositories.
pub fn list_teams_with_repo(conn: &Connection, repo_id: i64) -> Result<Vec<Team>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEAM_COLUMNS} FROM teams
         WHERE id IN (SELECT team_id FROM team_repos WHERE repo_id = ?1) ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![repo_id], team_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn team_member_ids(conn: &Connection, team_id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM team_users WHERE team_id = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map(params![team_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn add_team_user(conn: &Connection, team: &Team, user_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO team_users (org_id, team_id, user_id) VALUES (?1, ?2, ?3)",
        params![team.org_id, team.id, user_id],
    )?;
    if inserted > 0 {
        conn.execute(
            "UPDATE teams SET num_members = num_members + 1 WHERE id = ?1",
            params![team.id],
        )?;
    }
    Ok(inserted > 0)
}

pub fn remove_team_user(conn: &Connection, team: &Team, user_id: i64) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM team_users WHERE team_id = ?1 AND user_id = ?2",
        params![team.id, user_id],
    )?;
    if removed > 0 {
        conn.execute(
            "UPDATE teams SET num_members = num_members - 1 WHERE id = ?1",
            params![team.id],
        )?;
    }
    Ok(removed > 0)
}

pub fn has_team_repo(conn: &Connection, team_id: i64, repo_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM team_repos WHERE team_id = ?1 AND repo_id = ?2",
            params![team_id, repo_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn add_team_repo(conn: &Connection, team: &Team, repo_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO team_repos (org_id, team_id, repo_id) VALUES (?1, ?2, ?3)",
        params![team.org_id, team.id, repo_id],
    )?;
    if inserted > 0 {
        conn.execute(
            "UPDATE teams SET num_repos = num_repos + 1 WHERE id = ?1",
            params![team.id],
        )?;
    }
    Ok(inserted > 0)
}

pub fn remove_team_repo(conn: &Connection, team_id: i64, repo_id: i64) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM team_repos WHERE team_id = ?1 AND repo_id = ?2",
        params![team_id, repo_id],
    )?;
    if removed > 0 {
        conn.execute(
            "UPDATE teams SET num_repos = num_repos - 1 WHERE id = ?1",
            params![team_id],
        )?;
    }
    Ok(removed > 0)
}

pub fn set_team_authorize(conn: &Connection, team_id: i64, authorize: AccessMode) -> Result<()> {
    conn.execute(
        "UPDATE teams SET authorize = ?1 WHERE id = ?2",
        params![authorize.as_i64(), team_id],
    )?;
    Ok(())
}

/// Repository IDs the team is explicitly associated with.
pub fn team_repo_ids(conn: &Connection, team_id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT repo_id FROM team_repos WHERE team_id = ?1 ORDER BY repo_id")?;
    let rows = stmt.query_map(params![team_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}
