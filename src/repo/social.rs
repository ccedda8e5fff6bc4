use super::{Engine, load_repository};
use crate::error::Result;
use crate::store::social;

impl Engine {
    /// Watches or unwatches a repository. Repeating the same call is a no-op.
    pub fn watch_repository(&self, user_id: i64, repo_id: i64, watch: bool) -> Result<bool> {
        self.store().transaction(|tx| {
            load_repository(tx, repo_id)?;
            social::set_watch(tx, user_id, repo_id, watch)
        })
    }

    /// Stars or unstars a repository. Repeating the same call is a no-op.
    pub fn star_repository(&self, user_id: i64, repo_id: i64, star: bool) -> Result<bool> {
        self.store().transaction(|tx| {
            load_repository(tx, repo_id)?;
            social::set_star(tx, user_id, repo_id, star)
        })
    }

    pub fn is_watching(&self, user_id: i64, repo_id: i64) -> Result<bool> {
        self.store().read(|c| social::is_watching(c, user_id, repo_id))
    }

    pub fn is_starring(&self, user_id: i64, repo_id: i64) -> Result<bool> {
        self.store().read(|c| social::is_starring(c, user_id, repo_id))
    }
}
