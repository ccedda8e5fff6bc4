use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::rows::{USER_COLUMNS, format_datetime, is_unique_violation, placeholders, user_from_row};
use crate::error::{Error, Result};
use crate::types::*;

pub fn insert_user(conn: &Connection, new: &NewUser) -> Result<User> {
    let now = format_datetime(&Utc::now());
    let result = conn.execute(
        "INSERT INTO users (name, lower_name, kind, email, max_repo_creation, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            new.name,
            new.name.to_lowercase(),
            new.kind.as_i64(),
            new.email,
            new.max_repo_creation,
            now,
        ],
    );

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(Error::AlreadyExists(format!("user '{}'", new.name)));
        }
        Err(e) => return Err(Error::from(e)),
    }

    get_user_by_id(conn, conn.last_insert_rowid())?
        .ok_or_else(|| Error::not_found(format!("user '{}'", new.name)))
}

pub fn get_user_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        user_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_user_by_name(conn: &Connection, name: &str) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE lower_name = ?1"),
        params![name.to_lowercase()],
        user_from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_users_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<User>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), user_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
    let rows = stmt.query_map([], user_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn incr_num_repos(conn: &Connection, user_id: i64, delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET num_repos = num_repos + ?1 WHERE id = ?2",
        params![delta, user_id],
    )?;
    Ok(())
}

pub fn incr_num_stars(conn: &Connection, user_id: i64, delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET num_stars = num_stars + ?1 WHERE id = ?2",
        params![delta, user_id],
    )?;
    Ok(())
}

/// Exact count of repositories owned by `owner_id`, independent of the cached counter.
pub fn count_owned_repos(conn: &Connection, owner_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM repositories WHERE owner_id = ?1",
        params![owner_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

/// Adds a user to an organization. Returns false if already a member.
pub fn add_org_user(conn: &Connection, org_id: i64, user_id: i64, is_owner: bool) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO org_users (org_id, user_id, is_owner) VALUES (?1, ?2, ?3)",
        params![org_id, user_id, is_owner],
    )?;
    if inserted > 0 {
        conn.execute(
            "UPDATE users SET num_members = num_members + 1 WHERE id = ?1",
            params![org_id],
        )?;
    }
    Ok(inserted > 0)
}

pub fn is_org_member(conn: &Connection, org_id: i64, user_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM org_users WHERE org_id = ?1 AND user_id = ?2",
            params![org_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn org_member_ids(conn: &Connection, org_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT user_id FROM org_users WHERE org_id = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map(params![org_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::SCHEMA;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_lookup_case_insensitive() {
        let conn = conn();
        let user = insert_user(&conn, &NewUser::individual("Alice", "alice@example.com")).unwrap();
        assert_eq!(user.lower_name, "alice");
        assert_eq!(user.kind, UserKind::Individual);

        let by_name = get_user_by_name(&conn, "ALICE").unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let conn = conn();
        insert_user(&conn, &NewUser::individual("bob", "")).unwrap();
        let err = insert_user(&conn, &NewUser::organization("Bob")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_org_membership_counts_once() {
        let conn = conn();
        let org = insert_user(&conn, &NewUser::organization("acme")).unwrap();
        let user = insert_user(&conn, &NewUser::individual("carol", "")).unwrap();

        assert!(add_org_user(&conn, org.id, user.id, false).unwrap());
        assert!(!add_org_user(&conn, org.id, user.id, false).unwrap());
        assert!(is_org_member(&conn, org.id, user.id).unwrap());

        let org = get_user_by_id(&conn, org.id).unwrap().unwrap();
        assert_eq!(org.num_members, 1);
    }
}
