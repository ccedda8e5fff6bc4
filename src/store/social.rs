use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use super::repos::{self, RepoCounter};
use super::rows::{format_datetime, parse_datetime};
use super::users;
use crate::error::{Error, Result};
use crate::types::*;

pub fn is_watching(conn: &Connection, user_id: i64, repo_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM watches WHERE user_id = ?1 AND repo_id = ?2",
            params![user_id, repo_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Toggles a watch, keeping `num_watches` in step. Returns true if anything changed.
pub fn set_watch(conn: &Connection, user_id: i64, repo_id: i64, watch: bool) -> Result<bool> {
    if watch == is_watching(conn, user_id, repo_id)? {
        return Ok(false);
    }
    if watch {
        conn.execute(
            "INSERT INTO watches (user_id, repo_id) VALUES (?1, ?2)",
            params![user_id, repo_id],
        )?;
        repos::incr_counter(conn, repo_id, RepoCounter::Watches, 1)?;
    } else {
        conn.execute(
            "DELETE FROM watches WHERE user_id = ?1 AND repo_id = ?2",
            params![user_id, repo_id],
        )?;
        repos::incr_counter(conn, repo_id, RepoCounter::Watches, -1)?;
    }
    Ok(true)
}

pub fn watcher_ids(conn: &Connection, repo_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT user_id FROM watches WHERE repo_id = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map(params![repo_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn is_starring(conn: &Connection, user_id: i64, repo_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM stars WHERE user_id = ?1 AND repo_id = ?2",
            params![user_id, repo_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Toggles a star, keeping both the repository and the user counter in step.
pub fn set_star(conn: &Connection, user_id: i64, repo_id: i64, star: bool) -> Result<bool> {
    if star == is_starring(conn, user_id, repo_id)? {
        return Ok(false);
    }
    let delta = if star {
        conn.execute(
            "INSERT INTO stars (user_id, repo_id) VALUES (?1, ?2)",
            params![user_id, repo_id],
        )?;
        1
    } else {
        conn.execute(
            "DELETE FROM stars WHERE user_id = ?1 AND repo_id = ?2",
            params![user_id, repo_id],
        )?;
        -1
    };
    repos::incr_counter(conn, repo_id, RepoCounter::Stars, delta)?;
    users::incr_num_stars(conn, user_id, delta)?;
    Ok(true)
}

/// An activity event before it is fanned out to its receivers.
#[derive(Debug, Clone)]
pub struct NewAction<'a> {
    pub op_type: ActionType,
    pub act_user: &'a User,
    pub repo: &'a Repository,
    pub repo_owner_name: &'a str,
    pub content: String,
}

/// Writes one action row for the acting user and one for every other watcher.
pub fn notify_watchers(conn: &Connection, action: &NewAction<'_>) -> Result<()> {
    let now = format_datetime(&Utc::now());
    let mut stmt = conn.prepare(
        "INSERT INTO actions (user_id, op_type, act_user_id, act_user_name, repo_id,
                              repo_user_name, repo_name, content, is_private, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;

    let mut receivers = vec![action.act_user.id];
    receivers.extend(
        watcher_ids(conn, action.repo.id)?
            .into_iter()
            .filter(|id| *id != action.act_user.id),
    );

    for user_id in receivers {
        stmt.execute(params![
            user_id,
            action.op_type.as_i64(),
            action.act_user.id,
            action.act_user.name,
            action.repo.id,
            action.repo_owner_name,
            action.repo.name,
            action.content,
            action.repo.is_action_private(),
            now,
        ])?;
    }
    Ok(())
}

/// Re-flags the privacy of every action recorded for a repository.
pub fn set_actions_private(conn: &Connection, repo_id: i64, is_private: bool) -> Result<()> {
    conn.execute(
        "UPDATE actions SET is_private = ?1 WHERE repo_id = ?2",
        params![is_private, repo_id],
    )?;
    Ok(())
}

pub fn list_actions_for_repo(conn: &Connection, repo_id: i64) -> Result<Vec<Action>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, op_type, act_user_id, act_user_name, repo_id, repo_user_name,
                repo_name, content, is_private, created_at
         FROM actions WHERE repo_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![repo_id], |row| {
        let op_type: i64 = row.get(2)?;
        Ok(Action {
            id: row.get(0)?,
            user_id: row.get(1)?,
            op_type: ActionType::from_i64(op_type).unwrap_or(ActionType::CreateRepo),
            act_user_id: row.get(3)?,
            act_user_name: row.get(4)?,
            repo_id: row.get(5)?,
            repo_user_name: row.get(6)?,
            repo_name: row.get(7)?,
            content: row.get(8)?,
            is_private: row.get(9)?,
            created_at: parse_datetime(&row.get::<_, String>(10)?),
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}
