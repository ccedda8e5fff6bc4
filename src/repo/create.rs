use rusqlite::Connection;

use super::journal::OperationHandle;
use super::{Engine, load_repository, validation};
use crate::access;
use crate::error::{Error, Result};
use crate::git::init::{self, InitRequest};
use crate::git::{InitialFiles, process};
use crate::store::social::{self, NewAction};
use crate::store::{repos, teams, users};
use crate::types::*;

/// Options for a new repository.
#[derive(Debug, Clone, Default)]
pub struct CreateRepoOptions {
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub is_unlisted: bool,
    /// Mirrors get their contents from a migration, so no tree is initialized.
    pub is_mirror: bool,
    /// Commit README/.gitignore/LICENSE right away.
    pub auto_init: Option<InitialFiles>,
    /// Falls back to the configured default branch.
    pub default_branch: Option<String>,
}

/// Inserts a repository row and everything that comes with it.
///
/// Must run inside the caller's transaction. Checks the owner's quota with an
/// exact count, attaches organization repositories to the owner team, computes
/// accesses, sets up watches and fans out the creation action.
pub(crate) fn insert_repository_tx(
    conn: &Connection,
    global_limit: i64,
    doer: &User,
    owner: &Owner,
    draft: &Repository,
    kind: OperationKind,
) -> Result<(Repository, OperationHandle)> {
    let limit = owner.user().max_repos(global_limit);
    if limit > -1 && users::count_owned_repos(conn, owner.id())? >= limit {
        return Err(Error::QuotaExceeded { limit });
    }
    if repos::repository_exists(conn, owner.id(), &draft.name)? {
        return Err(Error::AlreadyExists(format!(
            "repository '{}/{}'",
            owner.name(),
            draft.name
        )));
    }

    let repo_id = repos::insert_repository(conn, draft)?;
    users::incr_num_repos(conn, owner.id(), 1)?;
    let repo = load_repository(conn, repo_id)?;

    match owner {
        Owner::Organization(org) => {
            let owner_team = teams::get_owner_team(conn, org.id)?;
            teams::add_team_repo(conn, &owner_team, repo.id)?;
            access::recalculate_accesses(conn, &repo, owner)?;
            for member in teams::team_member_ids(conn, owner_team.id)? {
                social::set_watch(conn, member, repo.id, true)?;
            }
        }
        Owner::Individual(_) => access::recalculate_accesses(conn, &repo, owner)?,
    }
    social::set_watch(conn, owner.id(), repo.id, true)?;

    let repo = load_repository(conn, repo_id)?;
    social::notify_watchers(
        conn,
        &NewAction {
            op_type: if repo.is_fork {
                ActionType::ForkRepo
            } else {
                ActionType::CreateRepo
            },
            act_user: doer,
            repo: &repo,
            repo_owner_name: owner.name(),
            content: String::new(),
        },
    )?;

    let handle = OperationHandle::begin(conn, repo.id, kind)?;
    Ok((repo, handle))
}

impl Engine {
    pub(crate) fn global_repo_limit(&self) -> i64 {
        self.config().repository.max_creation_limit
    }

    /// Creates a repository for `owner` on behalf of `doer`.
    ///
    /// The row is committed first. A failure while initializing the bare
    /// repository removes the partial tree but keeps the row.
    pub async fn create_repository(
        &self,
        doer: &User,
        owner: &User,
        opts: CreateRepoOptions,
    ) -> Result<Repository> {
        validation::validate_repo_name(&opts.name)?;

        let owner = Owner::from(owner.clone());
        let default_branch = opts
            .default_branch
            .clone()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| self.config().repository.default_branch.clone());

        let mut draft = Repository::new(owner.id(), opts.name.clone());
        draft.description = opts.description.clone();
        super::truncate_chars(&mut draft.description, 512);
        draft.is_private = opts.is_private;
        draft.is_unlisted = opts.is_unlisted;
        draft.is_mirror = opts.is_mirror;
        draft.is_bare = true;
        draft.default_branch = default_branch.clone();

        let limit = self.global_repo_limit();
        let (mut repo, mut handle) = self.store().transaction(|tx| {
            insert_repository_tx(tx, limit, doer, &owner, &draft, OperationKind::Create)
        })?;
        handle.committed(self.store());
        tracing::info!(repo = %format!("{}/{}", owner.name(), repo.name), id = repo.id, "created repository");

        if opts.is_mirror {
            handle.applied(self.store());
            repo.owner = Some(owner.into_user());
            return Ok(repo);
        }

        let repo_path = self.repo_path(owner.name(), &repo.name);
        let result = self
            .init_repository_tree(doer, &owner, &repo, opts.auto_init.as_ref())
            .await;
        let still_empty = match result {
            Ok(empty) => empty,
            Err(e) => return Err(self.compensate(&mut handle, e, &[&repo_path]).await),
        };

        let recorded = self.store().read(|c| {
            repos::set_bare_and_branch(c, repo.id, still_empty, &default_branch)
        });
        if let Err(e) = recorded {
            handle.failed(self.store(), &e, false);
            return Err(e);
        }
        handle.applied(self.store());

        repo.is_bare = still_empty;
        repo.owner = Some(owner.into_user());
        Ok(repo)
    }

    async fn init_repository_tree(
        &self,
        doer: &User,
        owner: &Owner,
        repo: &Repository,
        files: Option<&InitialFiles>,
    ) -> Result<bool> {
        let repo_path = self.repo_path(owner.name(), &repo.name);
        let scratch = self.scratch_path(&format!("init-{}", repo.lower_name));
        let author = self.signature_for(doer);

        let _guard = self.pool().check_in(repo.id.to_string()).await;
        let still_empty = init::initialize(
            self.config(),
            &InitRequest {
                repo_path: &repo_path,
                scratch_dir: &scratch,
                owner_name: owner.name(),
                repo_name: &repo.name,
                description: &repo.description,
                default_branch: &repo.default_branch,
                files,
                author: &author,
            },
        )
        .await?;
        process::update_server_info(&repo_path).await?;
        Ok(still_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::store::Store;

    fn opts(name: &str) -> CreateRepoOptions {
        CreateRepoOptions {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_bare_repository() {
        let t = engine();
        let alice = user(&t.engine, "alice");

        let repo = t
            .engine
            .create_repository(&alice, &alice, opts("demo"))
            .await
            .unwrap();

        assert!(repo.is_bare);
        assert_eq!(repo.default_branch, "main");
        assert!(t.engine.repo_path("alice", "demo").join("HEAD").exists());
        assert_eq!(t.engine.store().get_user(alice.id).unwrap().unwrap().num_repos, 1);

        let stored = t.engine.get_repository("alice", "demo").unwrap();
        assert_eq!(stored.num_watches, 1);
        let ops = t.engine.repo_operations(repo.id).unwrap();
        assert_eq!(ops[0].phase, OperationPhase::FilesystemApplied);
    }

    #[tokio::test]
    async fn test_create_with_readme_template() {
        let temp = tempfile::TempDir::new().unwrap();
        let templates = temp.path().join("templates");
        std::fs::create_dir_all(templates.join("readme")).unwrap();
        std::fs::write(
            templates.join("readme").join("Welcome"),
            "Welcome to {{Name}}\n\n{{Description}}\n",
        )
        .unwrap();

        let mut config = crate::config::Config {
            data_dir: temp.path().join("data"),
            app_path: std::path::PathBuf::from("/bin/true"),
            ..Default::default()
        };
        config.repository.templates_dir = Some(templates);
        let engine = Engine::open(config).unwrap();
        let alice = user(&engine, "alice");

        let repo = engine
            .create_repository(
                &alice,
                &alice,
                CreateRepoOptions {
                    description: "Tools for widgets".into(),
                    auto_init: Some(InitialFiles {
                        readme: "Welcome".into(),
                        ..InitialFiles::default()
                    }),
                    ..opts("widgets")
                },
            )
            .await
            .unwrap();

        assert!(!repo.is_bare);
        assert!(!engine.get_repository("alice", "widgets").unwrap().is_bare);

        let path = engine.repo_path("alice", "widgets");
        assert!(!process::is_empty(&path).unwrap());
        let git = git2::Repository::open_bare(&path).unwrap();
        let blob = git
            .revparse_single("HEAD:README.md")
            .unwrap()
            .peel_to_blob()
            .unwrap();
        assert_eq!(
            std::str::from_utf8(blob.content()).unwrap(),
            "Welcome to widgets\n\nTools for widgets\n"
        );
    }

    #[tokio::test]
    async fn test_create_rejects_reserved_and_duplicate_names() {
        let t = engine();
        let alice = user(&t.engine, "alice");

        let err = t
            .engine
            .create_repository(&alice, &alice, opts("x.git"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NameNotAllowed { .. }));

        t.engine
            .create_repository(&alice, &alice, opts("demo"))
            .await
            .unwrap();
        let err = t
            .engine
            .create_repository(&alice, &alice, opts("Demo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_enforces_quota() {
        let t = engine();
        let mut alice = t
            .engine
            .store()
            .create_user(&NewUser {
                max_repo_creation: 1,
                ..NewUser::individual("alice", "alice@example.com")
            })
            .unwrap();
        t.engine
            .create_repository(&alice, &alice, opts("one"))
            .await
            .unwrap();

        alice = t.engine.store().get_user(alice.id).unwrap().unwrap();
        let err = t
            .engine
            .create_repository(&alice, &alice, opts("two"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { limit: 1 }));
        assert_eq!(t.engine.store().list_owner_repositories(alice.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_keeps_row_and_removes_tree() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let path = t.engine.repo_path("alice", "taken");
        std::fs::create_dir_all(&path).unwrap();

        let err = t
            .engine
            .create_repository(&alice, &alice, opts("taken"))
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some("init repository"));
        assert!(!path.exists());

        let repo = t.engine.get_repository("alice", "taken").unwrap();
        let ops = t.engine.repo_operations(repo.id).unwrap();
        assert_eq!(ops[0].phase, OperationPhase::FilesystemFailed { compensated: true });
    }

    #[tokio::test]
    async fn test_mirror_skips_tree() {
        let t = engine();
        let alice = user(&t.engine, "alice");
        let repo = t
            .engine
            .create_repository(
                &alice,
                &alice,
                CreateRepoOptions {
                    is_mirror: true,
                    ..opts("mirror")
                },
            )
            .await
            .unwrap();
        assert!(repo.is_mirror);
        assert!(!t.engine.repo_path("alice", "mirror").exists());
    }
}
