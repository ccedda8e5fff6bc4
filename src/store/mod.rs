//! Relational state of users, repositories and their access cache.
//!
//! Query functions live in submodules and take a plain `&Connection`, so the
//! same code runs standalone or inside a transaction handed out by
//! [`SqliteStore::transaction`].

pub mod collab;
pub mod issues;
pub mod ops;
pub mod repos;
mod rows;
pub(crate) mod schema;
mod sqlite;
pub mod social;
pub mod teams;
pub mod users;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the read and admin surface used outside of lifecycle transactions.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Users and organizations
    fn create_user(&self, user: &NewUser) -> Result<User>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn get_user_by_name(&self, name: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;

    // Repositories
    fn get_repository(&self, id: i64) -> Result<Option<Repository>>;
    fn get_repository_by_name(&self, owner_id: i64, name: &str) -> Result<Option<Repository>>;
    fn list_owner_repositories(&self, owner_id: i64) -> Result<Vec<Repository>>;
    fn list_forks(&self, base_id: i64) -> Result<Vec<Repository>>;

    // Teams
    fn list_org_teams(&self, org_id: i64) -> Result<Vec<Team>>;
    fn get_team(&self, org_id: i64, name: &str) -> Result<Option<Team>>;

    // Access cache
    fn list_accesses(&self, repo_id: i64) -> Result<Vec<Access>>;
    fn get_access_mode(&self, user_id: i64, repo_id: i64) -> Result<Option<AccessMode>>;

    // Operator tooling
    fn list_operations(&self, unsettled_only: bool) -> Result<Vec<RepoOperation>>;
    fn list_notices(&self) -> Result<Vec<Notice>>;
    fn create_notice(&self, description: &str) -> Result<()>;

    fn close(&self) -> Result<()>;
}
