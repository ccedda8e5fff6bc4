use chrono::Utc;
use rusqlite::{Connection, params};

use super::rows::{format_datetime, parse_datetime};
use crate::error::{Error, Result};
use crate::types::*;

/// Opens a journal entry in the `Pending` phase.
pub fn insert_operation(conn: &Connection, repo_id: i64, kind: OperationKind) -> Result<i64> {
    let now = format_datetime(&Utc::now());
    conn.execute(
        "INSERT INTO repo_operations (repo_id, kind, phase, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![repo_id, kind.as_str(), OperationPhase::Pending.as_str(), now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_operation_phase(
    conn: &Connection,
    id: i64,
    phase: OperationPhase,
    step: Option<&str>,
    error: Option<&str>,
) -> Result<()> {
    let rows = conn.execute(
        "UPDATE repo_operations SET phase = ?1, step = ?2, error = ?3, updated_at = ?4 WHERE id = ?5",
        params![phase.as_str(), step, error, format_datetime(&Utc::now()), id],
    )?;
    if rows == 0 {
        return Err(Error::not_found(format!("operation {id}")));
    }
    Ok(())
}

fn operation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RepoOperation> {
    let kind: String = row.get(2)?;
    let phase: String = row.get(3)?;
    Ok(RepoOperation {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        kind: OperationKind::parse(&kind).unwrap_or(OperationKind::Create),
        phase: OperationPhase::parse(&phase)
            .unwrap_or(OperationPhase::FilesystemFailed { compensated: false }),
        step: row.get(4)?,
        error: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

/// Journal rows, newest first. `unsettled_only` skips `FilesystemApplied` entries.
pub fn list_operations(conn: &Connection, unsettled_only: bool) -> Result<Vec<RepoOperation>> {
    let sql = if unsettled_only {
        "SELECT id, repo_id, kind, phase, step, error, created_at, updated_at
         FROM repo_operations WHERE phase != 'applied' ORDER BY id DESC"
    } else {
        "SELECT id, repo_id, kind, phase, step, error, created_at, updated_at
         FROM repo_operations ORDER BY id DESC"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], operation_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn list_repo_operations(conn: &Connection, repo_id: i64) -> Result<Vec<RepoOperation>> {
    let mut stmt = conn.prepare(
        "SELECT id, repo_id, kind, phase, step, error, created_at, updated_at
         FROM repo_operations WHERE repo_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![repo_id], operation_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn insert_notice(conn: &Connection, description: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO notices (description, created_at) VALUES (?1, ?2)",
        params![description, format_datetime(&Utc::now())],
    )?;
    Ok(())
}

pub fn list_notices(conn: &Connection) -> Result<Vec<Notice>> {
    let mut stmt = conn.prepare("SELECT id, description, created_at FROM notices ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Notice {
            id: row.get(0)?,
            description: row.get(1)?,
            created_at: parse_datetime(&row.get::<_, String>(2)?),
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// A denormalized counter and the queries that detect and repair its drift.
///
/// `find` selects the IDs whose cached value disagrees with the truth; `fix`
/// takes that ID as `?1` and rewrites the cached value.
#[derive(Debug, Clone, Copy)]
pub struct CounterCheck {
    pub description: &'static str,
    pub find: &'static str,
    pub fix: &'static str,
}

pub const COUNTER_CHECKS: &[CounterCheck] = &[
    CounterCheck {
        description: "repository count 'num_watches'",
        find: "SELECT r.id FROM repositories r
               WHERE r.num_watches != (SELECT COUNT(*) FROM watches WHERE repo_id = r.id)",
        fix: "UPDATE repositories SET num_watches =
                (SELECT COUNT(*) FROM watches WHERE repo_id = ?1) WHERE id = ?1",
    },
    CounterCheck {
        description: "repository count 'num_stars'",
        find: "SELECT r.id FROM repositories r
               WHERE r.num_stars != (SELECT COUNT(*) FROM stars WHERE repo_id = r.id)",
        fix: "UPDATE repositories SET num_stars =
                (SELECT COUNT(*) FROM stars WHERE repo_id = ?1) WHERE id = ?1",
    },
    CounterCheck {
        description: "repository count 'num_forks'",
        find: "SELECT r.id FROM repositories r
               WHERE r.num_forks != (SELECT COUNT(*) FROM repositories WHERE fork_id = r.id AND is_fork = 1)",
        fix: "UPDATE repositories SET num_forks =
                (SELECT COUNT(*) FROM repositories WHERE fork_id = ?1 AND is_fork = 1) WHERE id = ?1",
    },
    CounterCheck {
        description: "repository count 'num_closed_issues'",
        find: "SELECT r.id FROM repositories r
               WHERE r.num_closed_issues != (SELECT COUNT(*) FROM issues
                   WHERE repo_id = r.id AND is_closed = 1 AND is_pull = 0)",
        fix: "UPDATE repositories SET num_closed_issues = (SELECT COUNT(*) FROM issues
                   WHERE repo_id = ?1 AND is_closed = 1 AND is_pull = 0) WHERE id = ?1",
    },
    CounterCheck {
        description: "repository count 'num_closed_pulls'",
        find: "SELECT r.id FROM repositories r
               WHERE r.num_closed_pulls != (SELECT COUNT(*) FROM issues
                   WHERE repo_id = r.id AND is_closed = 1 AND is_pull = 1)",
        fix: "UPDATE repositories SET num_closed_pulls = (SELECT COUNT(*) FROM issues
                   WHERE repo_id = ?1 AND is_closed = 1 AND is_pull = 1) WHERE id = ?1",
    },
    CounterCheck {
        description: "user count 'num_repos'",
        find: "SELECT u.id FROM users u
               WHERE u.num_repos != (SELECT COUNT(*) FROM repositories WHERE owner_id = u.id)",
        fix: "UPDATE users SET num_repos =
                (SELECT COUNT(*) FROM repositories WHERE owner_id = ?1) WHERE id = ?1",
    },
    CounterCheck {
        description: "user count 'num_stars'",
        find: "SELECT u.id FROM users u
               WHERE u.num_stars != (SELECT COUNT(*) FROM stars WHERE user_id = u.id)",
        fix: "UPDATE users SET num_stars =
                (SELECT COUNT(*) FROM stars WHERE user_id = ?1) WHERE id = ?1",
    },
    CounterCheck {
        description: "issue count 'num_comments'",
        find: "SELECT i.id FROM issues i
               WHERE i.num_comments != (SELECT COUNT(*) FROM comments WHERE issue_id = i.id)",
        fix: "UPDATE issues SET num_comments =
                (SELECT COUNT(*) FROM comments WHERE issue_id = ?1) WHERE id = ?1",
    },
];

pub fn find_counter_drift(conn: &Connection, check: &CounterCheck) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(check.find)?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn fix_counter(conn: &Connection, check: &CounterCheck, id: i64) -> Result<()> {
    conn.execute(check.fix, params![id])?;
    Ok(())
}
