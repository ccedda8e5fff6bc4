use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::types::*;

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime('now') format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn datetime_col(row: &Row<'_>, col: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: Option<String> = row.get(col)?;
    Ok(raw.as_deref().map(parse_datetime).unwrap_or_else(Utc::now))
}

pub(crate) const USER_COLUMNS: &str = "id, name, lower_name, kind, email, max_repo_creation, \
     num_repos, num_stars, num_teams, num_members, created_at, updated_at";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        lower_name: row.get("lower_name")?,
        kind: UserKind::from_i64(row.get("kind")?),
        email: row.get("email")?,
        max_repo_creation: row.get("max_repo_creation")?,
        num_repos: row.get("num_repos")?,
        num_stars: row.get("num_stars")?,
        num_teams: row.get("num_teams")?,
        num_members: row.get("num_members")?,
        created_at: datetime_col(row, "created_at")?,
        updated_at: datetime_col(row, "updated_at")?,
    })
}

pub(crate) const REPO_COLUMNS: &str = "id, owner_id, lower_name, name, description, website, \
     default_branch, size, num_watches, num_stars, num_forks, num_issues, num_closed_issues, \
     num_pulls, num_closed_pulls, num_milestones, num_closed_milestones, is_private, \
     is_unlisted, is_bare, is_mirror, enable_wiki, allow_public_wiki, enable_external_wiki, \
     external_wiki_url, enable_issues, allow_public_issues, enable_external_tracker, \
     external_tracker_url, external_tracker_format, external_tracker_style, enable_pulls, \
     pulls_ignore_whitespace, pulls_allow_rebase, is_fork, fork_id, created_at, updated_at";

/// Maps a repository row and recomputes the derived open counters.
pub(crate) fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    let mut repo = Repository {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        lower_name: row.get("lower_name")?,
        name: row.get("name")?,
        description: row.get("description")?,
        website: row.get("website")?,
        default_branch: row.get("default_branch")?,
        size: row.get("size")?,
        num_watches: row.get("num_watches")?,
        num_stars: row.get("num_stars")?,
        num_forks: row.get("num_forks")?,
        num_issues: row.get("num_issues")?,
        num_closed_issues: row.get("num_closed_issues")?,
        num_open_issues: 0,
        num_pulls: row.get("num_pulls")?,
        num_closed_pulls: row.get("num_closed_pulls")?,
        num_open_pulls: 0,
        num_milestones: row.get("num_milestones")?,
        num_closed_milestones: row.get("num_closed_milestones")?,
        num_open_milestones: 0,
        is_private: row.get("is_private")?,
        is_unlisted: row.get("is_unlisted")?,
        is_bare: row.get("is_bare")?,
        is_mirror: row.get("is_mirror")?,
        enable_wiki: row.get("enable_wiki")?,
        allow_public_wiki: row.get("allow_public_wiki")?,
        enable_external_wiki: row.get("enable_external_wiki")?,
        external_wiki_url: row.get("external_wiki_url")?,
        enable_issues: row.get("enable_issues")?,
        allow_public_issues: row.get("allow_public_issues")?,
        enable_external_tracker: row.get("enable_external_tracker")?,
        external_tracker_url: row.get("external_tracker_url")?,
        external_tracker_format: row.get("external_tracker_format")?,
        external_tracker_style: row.get("external_tracker_style")?,
        enable_pulls: row.get("enable_pulls")?,
        pulls_ignore_whitespace: row.get("pulls_ignore_whitespace")?,
        pulls_allow_rebase: row.get("pulls_allow_rebase")?,
        is_fork: row.get("is_fork")?,
        fork_id: row.get("fork_id")?,
        created_at: datetime_col(row, "created_at")?,
        updated_at: datetime_col(row, "updated_at")?,
        owner: None,
        base_repo: None,
        mirror: None,
    };
    repo.recompute_open_counters();
    Ok(repo)
}

pub(crate) const TEAM_COLUMNS: &str =
    "id, org_id, lower_name, name, description, authorize, num_repos, num_members";

pub(crate) fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        lower_name: row.get("lower_name")?,
        name: row.get("name")?,
        description: row.get("description")?,
        authorize: AccessMode::from_i64(row.get("authorize")?),
        num_repos: row.get("num_repos")?,
        num_members: row.get("num_members")?,
    })
}

pub(crate) fn mirror_from_row(row: &Row<'_>) -> rusqlite::Result<Mirror> {
    Ok(Mirror {
        id: row.get("id")?,
        repo_id: row.get("repo_id")?,
        interval_hours: row.get("interval_hours")?,
        enable_prune: row.get("enable_prune")?,
        next_sync_at: datetime_col(row, "next_sync_at")?,
    })
}

/// Renders `?1, ?2, ...` for an IN clause of `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// True when an insert failed on a UNIQUE or PRIMARY KEY constraint.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
