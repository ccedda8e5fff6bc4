use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Process-local registry of named tasks that are currently running.
#[derive(Clone, Default)]
pub struct TaskStatusTable {
    running: Arc<Mutex<HashSet<String>>>,
}

impl TaskStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` as running. Returns `None` if it already is.
    pub fn start(&self, name: &str) -> Option<TaskGuard> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(name.to_string()) {
            return None;
        }
        Some(TaskGuard {
            running: Arc::clone(&self.running),
            name: name.to_string(),
        })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }
}

/// Clears the running mark of a task when dropped.
pub struct TaskGuard {
    running: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_run_refused() {
        let table = TaskStatusTable::new();
        let guard = table.start("check_repo_stats").unwrap();
        assert!(table.is_running("check_repo_stats"));
        assert!(table.start("check_repo_stats").is_none());
        assert!(table.start("git_gc_repos").is_some());

        drop(guard);
        assert!(!table.is_running("check_repo_stats"));
        assert!(table.start("check_repo_stats").is_some());
    }
}
