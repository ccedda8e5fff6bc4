use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::store::{SqliteStore, ops};
use crate::types::{OperationKind, OperationPhase};

/// Tracks one lifecycle operation through the database/filesystem state machine.
///
/// The entry is created inside the operation's database transaction, so a
/// rolled-back transaction leaves no trace. An entry still `Pending` after a
/// restart means the process stopped between commit and acknowledgement.
/// Phase updates after the commit are best-effort and only logged on failure.
#[derive(Debug)]
pub struct OperationHandle {
    id: i64,
    repo_id: i64,
    kind: OperationKind,
    phase: OperationPhase,
}

impl OperationHandle {
    pub(crate) fn begin(conn: &Connection, repo_id: i64, kind: OperationKind) -> Result<Self> {
        let id = ops::insert_operation(conn, repo_id, kind)?;
        Ok(Self {
            id,
            repo_id,
            kind,
            phase: OperationPhase::Pending,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn phase(&self) -> OperationPhase {
        self.phase
    }

    pub(crate) fn committed(&mut self, store: &SqliteStore) {
        self.advance(store, OperationPhase::Committed, None);
    }

    pub(crate) fn applied(&mut self, store: &SqliteStore) {
        self.advance(store, OperationPhase::FilesystemApplied, None);
    }

    pub(crate) fn failed(&mut self, store: &SqliteStore, err: &Error, compensated: bool) {
        tracing::error!(
            repo_id = self.repo_id,
            kind = self.kind.as_str(),
            compensated,
            error = %err,
            "filesystem step failed after commit"
        );
        self.advance(
            store,
            OperationPhase::FilesystemFailed { compensated },
            Some(err),
        );
    }

    fn advance(&mut self, store: &SqliteStore, next: OperationPhase, err: Option<&Error>) {
        if !self.phase.can_advance_to(next) {
            tracing::warn!(
                operation = self.id,
                from = self.phase.as_str(),
                to = next.as_str(),
                "ignoring invalid journal transition"
            );
            return;
        }

        let step = err.and_then(Error::step);
        let message = err.map(ToString::to_string);
        let result = store.read(|c| {
            ops::set_operation_phase(c, self.id, next, step, message.as_deref())
        });
        if let Err(e) = result {
            tracing::warn!(operation = self.id, error = %e, "failed to record journal phase");
        }
        self.phase = next;
    }
}
