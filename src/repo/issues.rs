use super::{Engine, load_repository};
use crate::error::{Error, Result};
use crate::store::issues;
use crate::types::*;

impl Engine {
    /// Opens an issue or pull request at the repository's next index.
    pub fn create_issue(&self, repo_id: i64, poster: &User, title: &str, is_pull: bool) -> Result<Issue> {
        self.store().transaction(|tx| {
            let repo = load_repository(tx, repo_id)?;
            issues::insert_issue(tx, &repo, poster.id, title, is_pull)
        })
    }

    /// Closes or reopens an issue. Returns false if it already was in that state.
    pub fn set_issue_closed(&self, issue_id: i64, closed: bool) -> Result<bool> {
        self.store().transaction(|tx| {
            let issue = issues::get_issue(tx, issue_id)?
                .ok_or_else(|| Error::not_found(format!("issue {issue_id}")))?;
            issues::set_issue_closed(tx, &issue, closed)
        })
    }

    pub fn add_comment(&self, issue_id: i64, poster: &User, content: &str) -> Result<i64> {
        self.store().transaction(|tx| {
            issues::get_issue(tx, issue_id)?
                .ok_or_else(|| Error::not_found(format!("issue {issue_id}")))?;
            issues::insert_comment(tx, issue_id, poster.id, content)
        })
    }

    /// Stores `data` under a fresh UUID and links it to the issue.
    pub async fn add_attachment(&self, issue_id: i64, name: &str, data: &[u8]) -> Result<Attachment> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let path = self.attachment_path(&uuid);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;

        let inserted = self.store().transaction(|tx| {
            issues::get_issue(tx, issue_id)?
                .ok_or_else(|| Error::not_found(format!("issue {issue_id}")))?;
            issues::insert_attachment(tx, &uuid, issue_id, name)
        });
        if inserted.is_err() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove orphaned attachment");
            }
        }
        inserted
    }

    pub fn create_milestone(&self, repo_id: i64, name: &str) -> Result<Milestone> {
        self.store().transaction(|tx| {
            load_repository(tx, repo_id)?;
            issues::insert_milestone(tx, repo_id, name)
        })
    }

    pub fn set_milestone_closed(&self, milestone_id: i64, closed: bool) -> Result<bool> {
        self.store().transaction(|tx| {
            let milestone = issues::get_milestone(tx, milestone_id)?
                .ok_or_else(|| Error::not_found(format!("milestone {milestone_id}")))?;
            issues::set_milestone_closed(tx, &milestone, closed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::store::Store;

    fn repo(t: &TestEngine, owner: &User) -> Repository {
        t.engine
            .store()
            .transaction(|tx| {
                let id = crate::store::repos::insert_repository(tx, &Repository::new(owner.id, "demo"))?;
                load_repository(tx, id)
            })
            .unwrap()
    }

    #[test]
    fn test_open_counters_follow_closing() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let repo = repo(&t, &alice);

        let first = t.engine.create_issue(repo.id, &alice, "first", false).unwrap();
        let second = t.engine.create_issue(repo.id, &alice, "second", false).unwrap();
        let pull = t.engine.create_issue(repo.id, &alice, "pull", true).unwrap();
        assert_eq!((first.index, second.index, pull.index), (1, 2, 3));

        assert!(t.engine.set_issue_closed(first.id, true).unwrap());
        assert!(!t.engine.set_issue_closed(first.id, true).unwrap());
        assert!(t.engine.set_issue_closed(pull.id, true).unwrap());

        let loaded = t.engine.store().get_repository(repo.id).unwrap().unwrap();
        assert_eq!(loaded.num_open_issues, 1);
        assert_eq!(loaded.num_open_pulls, 0);

        t.engine.set_issue_closed(first.id, false).unwrap();
        let loaded = t.engine.store().get_repository(repo.id).unwrap().unwrap();
        assert_eq!(loaded.num_open_issues, 2);
    }

    #[test]
    fn test_milestone_counters() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let repo = repo(&t, &alice);

        let m = t.engine.create_milestone(repo.id, "v1").unwrap();
        t.engine.create_milestone(repo.id, "v2").unwrap();
        t.engine.set_milestone_closed(m.id, true).unwrap();

        let loaded = t.engine.store().get_repository(repo.id).unwrap().unwrap();
        assert_eq!(loaded.num_milestones, 2);
        assert_eq!(loaded.num_open_milestones, 1);
    }

    #[tokio::test]
    async fn test_attachment_written_to_fanned_out_path() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let repo = repo(&t, &alice);
        let issue = t.engine.create_issue(repo.id, &alice, "crash", false).unwrap();

        let att = t.engine.add_attachment(issue.id, "trace.txt", b"panic").await.unwrap();
        let path = t.engine.attachment_path(&att.uuid);
        assert_eq!(std::fs::read(&path).unwrap(), b"panic");

        let err = t.engine.add_attachment(9999, "x", b"x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_comment_counts() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let repo = repo(&t, &alice);
        let issue = t.engine.create_issue(repo.id, &alice, "q", false).unwrap();
        t.engine.add_comment(issue.id, &alice, "a").unwrap();
        t.engine.add_comment(issue.id, &alice, "b").unwrap();
        let issue = t
            .engine
            .store()
            .read(|c| issues::get_issue(c, issue.id))
            .unwrap()
            .unwrap();
        assert_eq!(issue.num_comments, 2);
    }
}
