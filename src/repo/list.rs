use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::store::{repos, users};
use crate::types::Repository;

/// Upper bound of IDs bound into a single `IN (...)` query.
const LOAD_BATCH_SIZE: usize = 500;

/// A page of repositories whose relations are loaded in batches.
#[derive(Debug, Clone, Default)]
pub struct RepositoryList(pub Vec<Repository>);

impl RepositoryList {
    pub fn new(repos: Vec<Repository>) -> Self {
        Self(repos)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<Repository> {
        self.0
    }

    /// Loads owners and fork bases of every repository in the list.
    ///
    /// A fork whose base no longer exists is turned into a standalone
    /// repository, both in memory and in the store.
    pub fn load_attributes(&mut self, conn: &Connection) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }

        let mut owner_ids: Vec<i64> = self.0.iter().map(|r| r.owner_id).collect();
        owner_ids.sort_unstable();
        owner_ids.dedup();
        let mut owners = HashMap::new();
        for chunk in owner_ids.chunks(LOAD_BATCH_SIZE) {
            for user in users::get_users_by_ids(conn, chunk)? {
                owners.insert(user.id, user);
            }
        }

        let mut base_ids: Vec<i64> = self
            .0
            .iter()
            .filter(|r| r.is_fork)
            .map(|r| r.fork_id)
            .collect();
        base_ids.sort_unstable();
        base_ids.dedup();
        let mut bases = HashMap::new();
        for chunk in base_ids.chunks(LOAD_BATCH_SIZE) {
            for base in repos::get_repositories_by_ids(conn, chunk)? {
                bases.insert(base.id, base);
            }
        }

        for repo in &mut self.0 {
            let owner = owners
                .get(&repo.owner_id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("owner {} of repository {}", repo.owner_id, repo.id)))?;
            repo.owner = Some(owner);

            if !repo.is_fork {
                continue;
            }
            match bases.get(&repo.fork_id) {
                Some(base) => repo.base_repo = Some(Box::new(base.clone())),
                None => {
                    tracing::warn!(repo = repo.id, base = repo.fork_id, "fork base is gone, detaching");
                    repos::clear_fork_linkage(conn, repo.fork_id)?;
                    repo.is_fork = false;
                    repo.fork_id = 0;
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<Repository>> for RepositoryList {
    fn from(repos: Vec<Repository>) -> Self {
        Self(repos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteStore, Store};
    use crate::types::NewUser;

    #[test]
    fn test_load_attributes_heals_missing_base() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let (alice, orphan_id, fork_id) = store
            .transaction(|tx| {
                let alice = users::insert_user(tx, &NewUser::individual("alice", ""))?;
                let base = repos::insert_repository(tx, &Repository::new(alice.id, "base"))?;
                let mut fork = Repository::new(alice.id, "fork");
                fork.is_fork = true;
                fork.fork_id = base;
                let fork_id = repos::insert_repository(tx, &fork)?;
                let mut orphan = Repository::new(alice.id, "orphan");
                orphan.is_fork = true;
                orphan.fork_id = 9999;
                let orphan_id = repos::insert_repository(tx, &orphan)?;
                Ok((alice, orphan_id, fork_id))
            })
            .unwrap();

        let mut list = RepositoryList::from(store.list_owner_repositories(alice.id).unwrap());
        store.read(|c| list.load_attributes(c)).unwrap();

        assert!(list.0.iter().all(|r| r.owner.as_ref().map(|o| o.id) == Some(alice.id)));
        let fork = list.0.iter().find(|r| r.id == fork_id).unwrap();
        assert_eq!(fork.base_repo.as_ref().unwrap().name, "base");

        let orphan = list.0.iter().find(|r| r.id == orphan_id).unwrap();
        assert!(!orphan.is_fork);
        let stored = store.get_repository(orphan_id).unwrap().unwrap();
        assert!(!stored.is_fork);
        assert_eq!(stored.fork_id, 0);
    }

    #[test]
    fn test_batches_more_than_one_chunk() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        let repos_list = store
            .transaction(|tx| {
                let mut all = Vec::new();
                for i in 0..(LOAD_BATCH_SIZE + 20) {
                    let owner = users::insert_user(tx, &NewUser::individual(format!("u{i}"), ""))?;
                    let id = repos::insert_repository(tx, &Repository::new(owner.id, "r"))?;
                    all.extend(repos::get_repository_by_id(tx, id)?);
                }
                Ok(all)
            })
            .unwrap();

        let mut list = RepositoryList::new(repos_list);
        store.read(|c| list.load_attributes(c)).unwrap();
        assert_eq!(list.len(), LOAD_BATCH_SIZE + 20);
        assert!(list.0.iter().all(|r| r.owner.is_some()));
    }
}
