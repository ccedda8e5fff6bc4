//! Repository lifecycle: every operation that changes a repository's rows
//! together with its on-disk tree.
//!
//! Each operation runs one short database transaction and performs its
//! filesystem work strictly before or after it. Work on a repository's tree
//! or local copy holds that repository's slot in the [`ExclusivePool`].

mod branch;
mod create;
mod delete;
mod fork;
mod issues;
pub mod journal;
mod list;
pub mod maintenance;
mod migrate;
mod mirror;
mod org;
mod social;
mod transfer;
mod update;
pub mod validation;
mod work;

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;

pub use create::CreateRepoOptions;
pub use list::RepositoryList;
pub use maintenance::{MaintenanceTask, TaskRun};
pub use migrate::MigrateRepoOptions;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{SqliteStore, Store, users};
use crate::sync::{ExclusivePool, TaskStatusTable};
use crate::types::*;

/// Orchestrates repository lifecycle operations against the store and the filesystem.
#[derive(Clone)]
pub struct Engine {
    store: Arc<SqliteStore>,
    config: Arc<Config>,
    pool: ExclusivePool,
    tasks: TaskStatusTable,
}

impl Engine {
    pub fn new(store: Arc<SqliteStore>, config: Arc<Config>) -> Self {
        Self {
            store,
            config,
            pool: ExclusivePool::new(),
            tasks: TaskStatusTable::new(),
        }
    }

    /// Opens (and initializes) the database under the configured data directory.
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = SqliteStore::new(config.db_path())?;
        store.initialize()?;
        Ok(Self::new(Arc::new(store), Arc::new(config)))
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &ExclusivePool {
        &self.pool
    }

    pub fn tasks(&self) -> &TaskStatusTable {
        &self.tasks
    }

    pub fn user_path(&self, owner_name: &str) -> PathBuf {
        self.config.repository_root().join(owner_name.to_lowercase())
    }

    pub fn repo_path(&self, owner_name: &str, repo_name: &str) -> PathBuf {
        self.user_path(owner_name)
            .join(format!("{}.git", repo_name.to_lowercase()))
    }

    pub fn wiki_path(&self, owner_name: &str, repo_name: &str) -> PathBuf {
        self.user_path(owner_name)
            .join(format!("{}.wiki.git", repo_name.to_lowercase()))
    }

    pub fn local_copy_path(&self, repo_id: i64) -> PathBuf {
        self.config
            .data_dir
            .join("tmp")
            .join("local-r")
            .join(repo_id.to_string())
    }

    pub fn local_wiki_path(&self, repo_id: i64) -> PathBuf {
        self.config
            .data_dir
            .join("tmp")
            .join("local-wiki")
            .join(repo_id.to_string())
    }

    pub fn attachment_path(&self, uuid: &str) -> PathBuf {
        let mut chars = uuid.chars();
        let a = chars.next().map(String::from).unwrap_or_default();
        let b = chars.next().map(String::from).unwrap_or_default();
        self.config
            .data_dir
            .join("attachments")
            .join(a)
            .join(b)
            .join(uuid)
    }

    fn scratch_path(&self, label: &str) -> PathBuf {
        self.config
            .data_dir
            .join("tmp")
            .join(format!("{label}-{}", uuid::Uuid::new_v4()))
    }

    /// Resolves the owner name of `repo`, using the loaded relation when present.
    pub fn owner_name(&self, repo: &Repository) -> Result<String> {
        if let Some(owner) = &repo.owner {
            return Ok(owner.name.clone());
        }
        self.store
            .get_user(repo.owner_id)?
            .map(|u| u.name)
            .ok_or_else(|| Error::not_found(format!("user {}", repo.owner_id)))
    }

    pub fn repo_path_of(&self, repo: &Repository) -> Result<PathBuf> {
        Ok(self.repo_path(&self.owner_name(repo)?, &repo.name))
    }

    pub fn wiki_path_of(&self, repo: &Repository) -> Result<PathBuf> {
        Ok(self.wiki_path(&self.owner_name(repo)?, &repo.name))
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<User> {
        self.store
            .get_user_by_name(name)?
            .ok_or_else(|| Error::not_found(format!("user '{name}'")))
    }

    pub fn get_repository_by_id(&self, id: i64) -> Result<Repository> {
        self.store
            .get_repository(id)?
            .ok_or_else(|| Error::not_found(format!("repository {id}")))
    }

    /// Looks up `owner/name` and attaches the owner relation.
    pub fn get_repository(&self, owner_name: &str, repo_name: &str) -> Result<Repository> {
        let owner = self.get_user_by_name(owner_name)?;
        let mut repo = self
            .store
            .get_repository_by_name(owner.id, repo_name)?
            .ok_or_else(|| Error::not_found(format!("repository '{owner_name}/{repo_name}'")))?;
        repo.owner = Some(owner);
        Ok(repo)
    }

    pub fn access_mode(&self, user: Option<&User>, repo: &Repository) -> Result<AccessMode> {
        crate::access::access_mode(self.store.as_ref(), user, repo)
    }

    pub fn authorize(&self, user: Option<&User>, repo: &Repository, required: AccessMode) -> Result<bool> {
        crate::access::authorize(self.store.as_ref(), user, repo, required)
    }

    pub fn repo_operations(&self, repo_id: i64) -> Result<Vec<RepoOperation>> {
        self.store
            .read(|c| crate::store::ops::list_repo_operations(c, repo_id))
    }

    /// Records an operator-visible notice, logging if even that fails.
    fn notice(&self, description: String) {
        tracing::warn!("{description}");
        if let Err(e) = self.store.create_notice(&description) {
            tracing::error!(error = %e, "failed to record notice");
        }
    }
}

pub(crate) fn load_owner(conn: &Connection, owner_id: i64) -> Result<Owner> {
    users::get_user_by_id(conn, owner_id)?
        .map(Owner::from)
        .ok_or_else(|| Error::not_found(format!("user {owner_id}")))
}

pub(crate) fn load_repository(conn: &Connection, repo_id: i64) -> Result<Repository> {
    crate::store::repos::get_repository_by_id(conn, repo_id)?
        .ok_or_else(|| Error::not_found(format!("repository {repo_id}")))
}

/// Truncates to at most `max` characters.
pub(crate) fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}
