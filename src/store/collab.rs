use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Error, Result};
use crate::types::*;

pub fn list_collaborations(conn: &Connection, repo_id: i64) -> Result<Vec<Collaboration>> {
    let mut stmt = conn.prepare(
        "SELECT repo_id, user_id, mode FROM collaborations WHERE repo_id = ?1 ORDER BY user_id",
    )?;
    let rows = stmt.query_map(params![repo_id], |row| {
        Ok(Collaboration {
            repo_id: row.get(0)?,
            user_id: row.get(1)?,
            mode: AccessMode::from_i64(row.get(2)?),
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Inserts or updates a grant. Returns true if the row is new.
pub fn upsert_collaboration(conn: &Connection, repo_id: i64, user_id: i64, mode: AccessMode) -> Result<bool> {
    let existed = get_collaboration(conn, repo_id, user_id)?.is_some();
    conn.execute(
        "INSERT INTO collaborations (repo_id, user_id, mode) VALUES (?1, ?2, ?3)
         ON CONFLICT(repo_id, user_id) DO UPDATE SET mode = excluded.mode",
        params![repo_id, user_id, mode.as_i64()],
    )?;
    Ok(!existed)
}

pub fn get_collaboration(conn: &Connection, repo_id: i64, user_id: i64) -> Result<Option<Collaboration>> {
    conn.query_row(
        "SELECT repo_id, user_id, mode FROM collaborations WHERE repo_id = ?1 AND user_id = ?2",
        params![repo_id, user_id],
        |row| {
            Ok(Collaboration {
                repo_id: row.get(0)?,
                user_id: row.get(1)?,
                mode: AccessMode::from_i64(row.get(2)?),
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

pub fn delete_collaboration(conn: &Connection, repo_id: i64, user_id: i64) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM collaborations WHERE repo_id = ?1 AND user_id = ?2",
        params![repo_id, user_id],
    )?;
    Ok(rows > 0)
}

/// Replaces every access row of a repository with `entries`.
pub fn replace_accesses(conn: &Connection, repo_id: i64, entries: &[Access]) -> Result<()> {
    conn.execute("DELETE FROM access WHERE repo_id = ?1", params![repo_id])?;
    let mut stmt = conn.prepare("INSERT INTO access (user_id, repo_id, mode) VALUES (?1, ?2, ?3)")?;
    for entry in entries {
        stmt.execute(params![entry.user_id, repo_id, entry.mode.as_i64()])?;
    }
    Ok(())
}

pub fn list_accesses(conn: &Connection, repo_id: i64) -> Result<Vec<Access>> {
    let mut stmt = conn
        .prepare("SELECT user_id, repo_id, mode FROM access WHERE repo_id = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map(params![repo_id], |row| {
        Ok(Access {
            user_id: row.get(0)?,
            repo_id: row.get(1)?,
            mode: AccessMode::from_i64(row.get(2)?),
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn get_access_mode(conn: &Connection, user_id: i64, repo_id: i64) -> Result<Option<AccessMode>> {
    let mode: Option<i64> = conn
        .query_row(
            "SELECT mode FROM access WHERE user_id = ?1 AND repo_id = ?2",
            params![user_id, repo_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(mode.map(AccessMode::from_i64))
}
