use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::rows::{
    REPO_COLUMNS, format_datetime, is_unique_violation, mirror_from_row, placeholders,
    repo_from_row,
};
use crate::error::{Error, Result};
use crate::types::*;

/// Denormalized repository counters that are adjusted in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoCounter {
    Watches,
    Stars,
    Forks,
    Issues,
    ClosedIssues,
    Pulls,
    ClosedPulls,
    Milestones,
    ClosedMilestones,
}

impl RepoCounter {
    const fn column(self) -> &'static str {
        match self {
            Self::Watches => "num_watches",
            Self::Stars => "num_stars",
            Self::Forks => "num_forks",
            Self::Issues => "num_issues",
            Self::ClosedIssues => "num_closed_issues",
            Self::Pulls => "num_pulls",
            Self::ClosedPulls => "num_closed_pulls",
            Self::Milestones => "num_milestones",
            Self::ClosedMilestones => "num_closed_milestones",
        }
    }
}

pub fn insert_repository(conn: &Connection, repo: &Repository) -> Result<i64> {
    let now = format_datetime(&Utc::now());
    let result = conn.execute(
        "INSERT INTO repositories (
            owner_id, lower_name, name, description, website, default_branch,
            is_private, is_unlisted, is_bare, is_mirror,
            enable_wiki, allow_public_wiki, enable_issues, allow_public_issues, enable_pulls,
            is_fork, fork_id, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
        params![
            repo.owner_id,
            repo.name.to_lowercase(),
            repo.name,
            repo.description,
            repo.website,
            repo.default_branch,
            repo.is_private,
            repo.is_unlisted,
            repo.is_bare,
            repo.is_mirror,
            repo.enable_wiki,
            repo.allow_public_wiki,
            repo.enable_issues,
            repo.allow_public_issues,
            repo.enable_pulls,
            repo.is_fork,
            repo.fork_id,
            now,
        ],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => {
            Err(Error::AlreadyExists(format!("repository '{}'", repo.name)))
        }
        Err(e) => Err(Error::from(e)),
    }
}

pub fn get_repository_by_id(conn: &Connection, id: i64) -> Result<Option<Repository>> {
    conn.query_row(
        &format!("SELECT {REPO_COLUMNS} FROM repositories WHERE id = ?1"),
        params![id],
        repo_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_repository_by_name(
    conn: &Connection,
    owner_id: i64,
    name: &str,
) -> Result<Option<Repository>> {
    conn.query_row(
        &format!("SELECT {REPO_COLUMNS} FROM repositories WHERE owner_id = ?1 AND lower_name = ?2"),
        params![owner_id, name.to_lowercase()],
        repo_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn repository_exists(conn: &Connection, owner_id: i64, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM repositories WHERE owner_id = ?1 AND lower_name = ?2",
            params![owner_id, name.to_lowercase()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn get_repositories_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Repository>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPO_COLUMNS} FROM repositories WHERE id IN ({})",
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), repo_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn list_repositories_by_owner(conn: &Connection, owner_id: i64) -> Result<Vec<Repository>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPO_COLUMNS} FROM repositories WHERE owner_id = ?1 ORDER BY lower_name"
    ))?;
    let rows = stmt.query_map(params![owner_id], repo_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn list_all_repositories(conn: &Connection) -> Result<Vec<Repository>> {
    let mut stmt = conn.prepare(&format!("SELECT {REPO_COLUMNS} FROM repositories ORDER BY id"))?;
    let rows = stmt.query_map([], repo_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn list_forks(conn: &Connection, base_id: i64) -> Result<Vec<Repository>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPO_COLUMNS} FROM repositories WHERE fork_id = ?1 AND is_fork = 1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![base_id], repo_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Returns the fork of `base_id` owned by `owner_id`, if any.
pub fn get_fork_by_owner(
    conn: &Connection,
    owner_id: i64,
    base_id: i64,
) -> Result<Option<Repository>> {
    conn.query_row(
        &format!(
            "SELECT {REPO_COLUMNS} FROM repositories WHERE owner_id = ?1 AND fork_id = ?2 AND is_fork = 1"
        ),
        params![owner_id, base_id],
        repo_from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Persists the user-editable settings of a repository.
///
/// Name, emptiness, size, default branch and mirror state have their own
/// writers and are left untouched.
pub fn update_repository(conn: &Connection, repo: &Repository) -> Result<()> {
    let rows = conn.execute(
        "UPDATE repositories SET
            description = ?1, website = ?2, is_private = ?3, is_unlisted = ?4,
            enable_wiki = ?5, allow_public_wiki = ?6, enable_external_wiki = ?7,
            external_wiki_url = ?8, enable_issues = ?9, allow_public_issues = ?10,
            enable_external_tracker = ?11, external_tracker_url = ?12,
            external_tracker_format = ?13, external_tracker_style = ?14, enable_pulls = ?15,
            pulls_ignore_whitespace = ?16, pulls_allow_rebase = ?17, updated_at = ?18
         WHERE id = ?19",
        params![
            repo.description,
            repo.website,
            repo.is_private,
            repo.is_unlisted,
            repo.enable_wiki,
            repo.allow_public_wiki,
            repo.enable_external_wiki,
            repo.external_wiki_url,
            repo.enable_issues,
            repo.allow_public_issues,
            repo.enable_external_tracker,
            repo.external_tracker_url,
            repo.external_tracker_format,
            repo.external_tracker_style,
            repo.enable_pulls,
            repo.pulls_ignore_whitespace,
            repo.pulls_allow_rebase,
            format_datetime(&Utc::now()),
            repo.id,
        ],
    )?;

    if rows == 0 {
        return Err(Error::not_found(format!("repository {}", repo.id)));
    }
    Ok(())
}

pub fn set_owner(conn: &Connection, repo_id: i64, owner_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE repositories SET owner_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![owner_id, format_datetime(&Utc::now()), repo_id],
    )?;
    Ok(())
}

pub fn set_name(conn: &Connection, repo_id: i64, name: &str) -> Result<()> {
    let result = conn.execute(
        "UPDATE repositories SET name = ?1, lower_name = ?2, updated_at = ?3 WHERE id = ?4",
        params![name, name.to_lowercase(), format_datetime(&Utc::now()), repo_id],
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            Err(Error::AlreadyExists(format!("repository '{name}'")))
        }
        Err(e) => Err(Error::from(e)),
    }
}

pub fn set_visibility(conn: &Connection, repo_id: i64, is_private: bool, is_unlisted: bool) -> Result<()> {
    conn.execute(
        "UPDATE repositories SET is_private = ?1, is_unlisted = ?2 WHERE id = ?3",
        params![is_private, is_unlisted, repo_id],
    )?;
    Ok(())
}

pub fn set_bare_and_branch(
    conn: &Connection,
    repo_id: i64,
    is_bare: bool,
    default_branch: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE repositories SET is_bare = ?1, default_branch = ?2 WHERE id = ?3",
        params![is_bare, default_branch, repo_id],
    )?;
    Ok(())
}

pub fn set_mirror_flag(conn: &Connection, repo_id: i64, is_mirror: bool) -> Result<()> {
    conn.execute(
        "UPDATE repositories SET is_mirror = ?1 WHERE id = ?2",
        params![is_mirror, repo_id],
    )?;
    Ok(())
}

pub fn set_size(conn: &Connection, repo_id: i64, size: i64) -> Result<()> {
    conn.execute(
        "UPDATE repositories SET size = ?1 WHERE id = ?2",
        params![size, repo_id],
    )?;
    Ok(())
}

pub fn incr_counter(conn: &Connection, repo_id: i64, counter: RepoCounter, delta: i64) -> Result<()> {
    conn.execute(
        &format!(
            "UPDATE repositories SET {col} = {col} + ?1 WHERE id = ?2",
            col = counter.column()
        ),
        params![delta, repo_id],
    )?;
    Ok(())
}

/// Turns every fork of `base_id` into a standalone repository.
pub fn clear_fork_linkage(conn: &Connection, base_id: i64) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE repositories SET is_fork = 0, fork_id = 0 WHERE fork_id = ?1",
        params![base_id],
    )?;
    Ok(rows)
}

/// Deletes a repository row and every row that depends on it.
///
/// Returns the UUIDs of attachments whose files must be removed once the
/// surrounding transaction commits.
pub fn delete_repository_cascade(conn: &Connection, repo_id: i64) -> Result<Vec<String>> {
    const DEPENDENTS: &[(&str, &str)] = &[
        ("access", "repo_id"),
        ("actions", "repo_id"),
        ("watches", "repo_id"),
        ("stars", "repo_id"),
        ("mirrors", "repo_id"),
        ("issue_users", "repo_id"),
        ("milestones", "repo_id"),
        ("labels", "repo_id"),
        ("releases", "repo_id"),
        ("collaborations", "repo_id"),
        ("pull_requests", "base_repo_id"),
        ("protect_branches", "repo_id"),
        ("protect_branch_whitelists", "repo_id"),
        ("webhooks", "repo_id"),
        ("hook_tasks", "repo_id"),
        ("lfs_objects", "repo_id"),
        ("team_repos", "repo_id"),
    ];

    conn.execute("DELETE FROM repositories WHERE id = ?1", params![repo_id])?;
    for (table, column) in DEPENDENTS {
        conn.execute(
            &format!("DELETE FROM {table} WHERE {column} = ?1"),
            params![repo_id],
        )?;
    }

    let attachments = {
        let mut stmt = conn.prepare(
            "SELECT uuid FROM attachments
             WHERE issue_id IN (SELECT id FROM issues WHERE repo_id = ?1)",
        )?;
        let rows = stmt.query_map(params![repo_id], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    conn.execute(
        "DELETE FROM comments WHERE issue_id IN (SELECT id FROM issues WHERE repo_id = ?1)",
        params![repo_id],
    )?;
    conn.execute(
        "DELETE FROM attachments WHERE issue_id IN (SELECT id FROM issues WHERE repo_id = ?1)",
        params![repo_id],
    )?;
    conn.execute("DELETE FROM issues WHERE repo_id = ?1", params![repo_id])?;

    Ok(attachments)
}

pub fn insert_mirror(
    conn: &Connection,
    repo_id: i64,
    interval_hours: i64,
    next_sync_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO mirrors (repo_id, interval_hours, enable_prune, next_sync_at)
         VALUES (?1, ?2, 1, ?3)",
        params![repo_id, interval_hours, format_datetime(&next_sync_at)],
    )?;
    Ok(())
}

pub fn get_mirror(conn: &Connection, repo_id: i64) -> Result<Option<Mirror>> {
    conn.query_row(
        "SELECT id, repo_id, interval_hours, enable_prune, next_sync_at FROM mirrors WHERE repo_id = ?1",
        params![repo_id],
        mirror_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn set_mirror_next_sync(conn: &Connection, repo_id: i64, next_sync_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE mirrors SET next_sync_at = ?1 WHERE repo_id = ?2",
        params![format_datetime(&next_sync_at), repo_id],
    )?;
    Ok(())
}
