use std::path::Path;

use super::Engine;
use super::journal::OperationHandle;
use crate::error::Error;
use crate::git::{Signature, process};
use crate::types::User;

impl Engine {
    /// Undoes the filesystem side of a failed post-commit phase.
    ///
    /// The `cleanup` paths are removed and the journal entry is marked failed,
    /// compensated only if every removal succeeded. Returns `err` for the
    /// caller to surface.
    pub(crate) async fn compensate(
        &self,
        handle: &mut OperationHandle,
        err: Error,
        cleanup: &[&Path],
    ) -> Error {
        let mut compensated = true;
        for path in cleanup {
            if let Err(e) = process::remove_tree(path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to undo filesystem step");
                compensated = false;
            }
        }
        handle.failed(self.store(), &err, compensated);
        err
    }

    /// Drops both scratch copies of a repository while holding its pool slot.
    pub(crate) async fn drop_local_copies(&self, repo_id: i64) {
        let _guard = self.pool().check_in(repo_id.to_string()).await;
        for path in [self.local_copy_path(repo_id), self.local_wiki_path(repo_id)] {
            remove_best_effort(&path).await;
        }
    }

    /// Identity used for commits made on behalf of `user`.
    pub(crate) fn signature_for(&self, user: &User) -> Signature {
        let email = if user.email.is_empty() {
            format!("{}@{}", user.lower_name, self.config().ssh.domain)
        } else {
            user.email.clone()
        };
        Signature {
            name: user.name.clone(),
            email,
        }
    }
}

pub(crate) async fn remove_best_effort(path: &Path) {
    if let Err(e) = process::remove_tree(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove directory");
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::store::Store;
    use crate::types::{OperationKind, OperationPhase};

    #[tokio::test]
    async fn test_compensate_removes_paths() {
        let t = engine();
        let dir = t.engine.config().data_dir.join("half-written");
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let mut handle = t
            .engine
            .store()
            .transaction(|tx| super::OperationHandle::begin(tx, 7, OperationKind::Create))
            .unwrap();
        handle.committed(t.engine.store());

        let err = t
            .engine
            .compensate(&mut handle, Error::operation("init", "boom"), &[&dir])
            .await;
        assert_eq!(err.step(), Some("init"));
        assert!(!dir.exists());

        let ops = t.engine.store().list_operations(true).unwrap();
        assert_eq!(ops[0].phase, OperationPhase::FilesystemFailed { compensated: true });
    }

    #[test]
    fn test_signature_falls_back_to_domain() {
        let t = engine();
        let mut alice = user(&t.engine, "Alice");
        alice.email.clear();
        let sig = t.engine.signature_for(&alice);
        assert_eq!(sig.email, "alice@localhost");
    }
}
