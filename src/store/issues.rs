use rusqlite::{Connection, OptionalExtension, params};

use super::repos::{self, RepoCounter};
use crate::error::{Error, Result};
use crate::types::*;

fn issue_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get("id")?,
        repo_id: row.get("repo_id")?,
        index: row.get("idx")?,
        poster_id: row.get("poster_id")?,
        title: row.get("title")?,
        is_pull: row.get("is_pull")?,
        is_closed: row.get("is_closed")?,
        num_comments: row.get("num_comments")?,
    })
}

const ISSUE_COLUMNS: &str = "id, repo_id, idx, poster_id, title, is_pull, is_closed, num_comments";

/// Inserts an issue or pull request at the repository's next index and bumps its total.
pub fn insert_issue(
    conn: &Connection,
    repo: &Repository,
    poster_id: i64,
    title: &str,
    is_pull: bool,
) -> Result<Issue> {
    let index = repo.next_issue_index();
    conn.execute(
        "INSERT INTO issues (repo_id, idx, poster_id, title, is_pull) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![repo.id, index, poster_id, title, is_pull],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT OR IGNORE INTO issue_users (issue_id, repo_id, user_id) VALUES (?1, ?2, ?3)",
        params![id, repo.id, poster_id],
    )?;

    let counter = if is_pull {
        RepoCounter::Pulls
    } else {
        RepoCounter::Issues
    };
    repos::incr_counter(conn, repo.id, counter, 1)?;

    get_issue(conn, id)?.ok_or_else(|| Error::not_found(format!("issue {id}")))
}

pub fn get_issue(conn: &Connection, id: i64) -> Result<Option<Issue>> {
    conn.query_row(
        &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1"),
        params![id],
        issue_from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Flips the closed state and the matching closed counter. Returns false if unchanged.
pub fn set_issue_closed(conn: &Connection, issue: &Issue, closed: bool) -> Result<bool> {
    if issue.is_closed == closed {
        return Ok(false);
    }
    conn.execute(
        "UPDATE issues SET is_closed = ?1 WHERE id = ?2",
        params![closed, issue.id],
    )?;
    let counter = if issue.is_pull {
        RepoCounter::ClosedPulls
    } else {
        RepoCounter::ClosedIssues
    };
    repos::incr_counter(conn, issue.repo_id, counter, if closed { 1 } else { -1 })?;
    Ok(true)
}

pub fn insert_comment(conn: &Connection, issue_id: i64, poster_id: i64, content: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO comments (issue_id, poster_id, content) VALUES (?1, ?2, ?3)",
        params![issue_id, poster_id, content],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute(
        "UPDATE issues SET num_comments = num_comments + 1 WHERE id = ?1",
        params![issue_id],
    )?;
    Ok(id)
}

pub fn insert_attachment(conn: &Connection, uuid: &str, issue_id: i64, name: &str) -> Result<Attachment> {
    conn.execute(
        "INSERT INTO attachments (uuid, issue_id, name) VALUES (?1, ?2, ?3)",
        params![uuid, issue_id, name],
    )?;
    Ok(Attachment {
        id: conn.last_insert_rowid(),
        uuid: uuid.to_string(),
        issue_id,
        name: name.to_string(),
    })
}

pub fn insert_milestone(conn: &Connection, repo_id: i64, name: &str) -> Result<Milestone> {
    conn.execute(
        "INSERT INTO milestones (repo_id, name) VALUES (?1, ?2)",
        params![repo_id, name],
    )?;
    let id = conn.last_insert_rowid();
    repos::incr_counter(conn, repo_id, RepoCounter::Milestones, 1)?;
    Ok(Milestone {
        id,
        repo_id,
        name: name.to_string(),
        is_closed: false,
    })
}

pub fn get_milestone(conn: &Connection, id: i64) -> Result<Option<Milestone>> {
    conn.query_row(
        "SELECT id, repo_id, name, is_closed FROM milestones WHERE id = ?1",
        params![id],
        |row| {
            Ok(Milestone {
                id: row.get(0)?,
                repo_id: row.get(1)?,
                name: row.get(2)?,
                is_closed: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

pub fn set_milestone_closed(conn: &Connection, milestone: &Milestone, closed: bool) -> Result<bool> {
    if milestone.is_closed == closed {
        return Ok(false);
    }
    conn.execute(
        "UPDATE milestones SET is_closed = ?1 WHERE id = ?2",
        params![closed, milestone.id],
    )?;
    repos::incr_counter(
        conn,
        milestone.repo_id,
        RepoCounter::ClosedMilestones,
        if closed { 1 } else { -1 },
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::SCHEMA;
    use crate::store::users;

    #[test]
    fn test_close_reopen_keeps_open_counter() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        let user = users::insert_user(&conn, &NewUser::individual("alice", "")).unwrap();
        let repo_id = repos::insert_repository(&conn, &Repository::new(user.id, "demo")).unwrap();

        let repo = repos::get_repository_by_id(&conn, repo_id).unwrap().unwrap();
        let first = insert_issue(&conn, &repo, user.id, "first", false).unwrap();
        let repo = repos::get_repository_by_id(&conn, repo_id).unwrap().unwrap();
        let second = insert_issue(&conn, &repo, user.id, "second", false).unwrap();
        assert_eq!((first.index, second.index), (1, 2));

        assert!(set_issue_closed(&conn, &first, true).unwrap());
        let repo = repos::get_repository_by_id(&conn, repo_id).unwrap().unwrap();
        assert_eq!(repo.num_issues, 2);
        assert_eq!(repo.num_closed_issues, 1);
        assert_eq!(repo.num_open_issues, 1);

        let first = get_issue(&conn, first.id).unwrap().unwrap();
        assert!(set_issue_closed(&conn, &first, false).unwrap());
        let repo = repos::get_repository_by_id(&conn, repo_id).unwrap().unwrap();
        assert_eq!(repo.num_open_issues, 2);
    }
}
