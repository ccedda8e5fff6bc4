use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::schema::SCHEMA;
use super::{Store, collab, ops, repos, teams, users};
use crate::error::Result;
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` on the shared connection without opening a transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn();
        f(&conn)
    }

    /// Runs `f` inside an immediate transaction and commits if it returns `Ok`.
    ///
    /// Any error rolls the transaction back when it is dropped. The closure
    /// must not call back into this store: the connection lock is held for
    /// the whole call.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn create_user(&self, user: &NewUser) -> Result<User> {
        self.read(|c| users::insert_user(c, user))
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.read(|c| users::get_user_by_id(c, id))
    }

    fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        self.read(|c| users::get_user_by_name(c, name))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.read(users::list_users)
    }

    fn get_repository(&self, id: i64) -> Result<Option<Repository>> {
        self.read(|c| repos::get_repository_by_id(c, id))
    }

    fn get_repository_by_name(&self, owner_id: i64, name: &str) -> Result<Option<Repository>> {
        self.read(|c| repos::get_repository_by_name(c, owner_id, name))
    }

    fn list_owner_repositories(&self, owner_id: i64) -> Result<Vec<Repository>> {
        self.read(|c| repos::list_repositories_by_owner(c, owner_id))
    }

    fn list_forks(&self, base_id: i64) -> Result<Vec<Repository>> {
        self.read(|c| repos::list_forks(c, base_id))
    }

    fn list_org_teams(&self, org_id: i64) -> Result<Vec<Team>> {
        self.read(|c| teams::list_org_teams(c, org_id))
    }

    fn get_team(&self, org_id: i64, name: &str) -> Result<Option<Team>> {
        self.read(|c| teams::get_team_by_name(c, org_id, name))
    }

    fn list_accesses(&self, repo_id: i64) -> Result<Vec<Access>> {
        self.read(|c| collab::list_accesses(c, repo_id))
    }

    fn get_access_mode(&self, user_id: i64, repo_id: i64) -> Result<Option<AccessMode>> {
        self.read(|c| collab::get_access_mode(c, user_id, repo_id))
    }

    fn list_operations(&self, unsettled_only: bool) -> Result<Vec<RepoOperation>> {
        self.read(|c| ops::list_operations(c, unsettled_only))
    }

    fn list_notices(&self) -> Result<Vec<Notice>> {
        self.read(ops::list_notices)
    }

    fn create_notice(&self, description: &str) -> Result<()> {
        self.read(|c| ops::insert_notice(c, description))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
