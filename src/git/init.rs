use std::path::Path;

use tokio::fs;

use super::process::{self, CloneOptions, GitCommand};
use super::templates::{self, CloneLink, TemplateKind};
use crate::config::Config;
use crate::error::{Error, Result};

/// Files committed into a freshly created repository.
#[derive(Debug, Clone)]
pub struct InitialFiles {
    /// README template name.
    pub readme: String,
    /// Comma-separated gitignore template names, empty for none.
    pub gitignores: String,
    /// License template name, empty for none.
    pub license: String,
}

impl Default for InitialFiles {
    fn default() -> Self {
        Self {
            readme: "Default".to_string(),
            gitignores: String::new(),
            license: String::new(),
        }
    }
}

/// Identity recorded as author and committer of the initial commit.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

pub struct InitRequest<'a> {
    pub repo_path: &'a Path,
    pub scratch_dir: &'a Path,
    pub owner_name: &'a str,
    pub repo_name: &'a str,
    pub description: &'a str,
    pub default_branch: &'a str,
    pub files: Option<&'a InitialFiles>,
    pub author: &'a Signature,
}

/// Creates the bare repository with hooks and HEAD, then optionally pushes an initial commit.
///
/// Returns true when the repository is still empty afterwards.
pub async fn initialize(config: &Config, req: &InitRequest<'_>) -> Result<bool> {
    if fs::try_exists(req.repo_path).await? {
        return Err(Error::operation(
            "init repository",
            format!("path already exists: {}", req.repo_path.display()),
        ));
    }

    process::init_bare_repo(req.repo_path).await?;
    super::hooks::install_hooks(config, req.repo_path).await?;
    process::set_head(req.repo_path, req.default_branch).await?;

    let Some(files) = req.files else {
        return Ok(true);
    };

    fs::create_dir_all(req.scratch_dir).await?;
    let result = commit_initial_files(config, req, files).await;
    if let Err(e) = process::remove_tree(req.scratch_dir).await {
        tracing::warn!(path = %req.scratch_dir.display(), error = %e, "failed to remove scratch clone");
    }
    result?;
    Ok(false)
}

/// Server hooks are skipped for the engine's own initial commit.
const INITIAL_RECEIVE_PACK: &str = "--receive-pack=git -c core.hooksPath=/dev/null receive-pack";

async fn commit_initial_files(
    config: &Config,
    req: &InitRequest<'_>,
    files: &InitialFiles,
) -> Result<()> {
    let tmp = req.scratch_dir;
    process::clone(req.repo_path.as_os_str(), tmp, &CloneOptions::default()).await?;

    let link = CloneLink::new(config, req.owner_name, req.repo_name);
    let readme = templates::load_template(config, TemplateKind::Readme, &files.readme)?;
    let readme = templates::render_readme(&readme, req.repo_name, req.description, &link);
    write_file(&tmp.join("README.md"), &readme).await?;

    if !files.gitignores.trim().is_empty() {
        let gitignore = templates::render_gitignore(config, &files.gitignores)?;
        if !gitignore.is_empty() {
            write_file(&tmp.join(".gitignore"), &gitignore).await?;
        }
    }

    if !files.license.trim().is_empty() {
        let license = templates::load_template(config, TemplateKind::License, &files.license)?;
        write_file(&tmp.join("LICENSE"), &license).await?;
    }

    GitCommand::new("git add")
        .current_dir(tmp)
        .args(["add", "--all"])
        .run()
        .await?;

    GitCommand::new("git commit")
        .current_dir(tmp)
        .args(["-c", "commit.gpgsign=false", "commit", "--message", "Initial commit"])
        .env("GIT_AUTHOR_NAME", &req.author.name)
        .env("GIT_AUTHOR_EMAIL", &req.author.email)
        .env("GIT_COMMITTER_NAME", &req.author.name)
        .env("GIT_COMMITTER_EMAIL", &req.author.email)
        .run()
        .await?;

    GitCommand::new("git push")
        .current_dir(tmp)
        .args(["push", INITIAL_RECEIVE_PACK, "origin"])
        .arg(format!("HEAD:refs/heads/{}", req.default_branch))
        .timeout(config.clone_timeout())
        .run()
        .await?;

    Ok(())
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).await.map_err(|e| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Error::operation(format!("write {name}"), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn read_blob(repo_path: &Path, spec: &str) -> String {
        let repo = git2::Repository::open_bare(repo_path).unwrap();
        let blob = repo.revparse_single(spec).unwrap().peel_to_blob().unwrap();
        String::from_utf8(blob.content().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_initial_commit_skips_server_hooks() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp.path().to_path_buf(),
            app_path: PathBuf::from("/nonexistent/repoforge"),
            ..Config::default()
        };
        let repo_path = temp.path().join("alice").join("demo.git");
        let files = InitialFiles {
            license: "MIT".to_string(),
            ..InitialFiles::default()
        };
        let author = Signature {
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
        };

        let empty = initialize(
            &config,
            &InitRequest {
                repo_path: &repo_path,
                scratch_dir: &temp.path().join("scratch"),
                owner_name: "alice",
                repo_name: "demo",
                description: "A demo",
                default_branch: "trunk",
                files: Some(&files),
                author: &author,
            },
        )
        .await
        .unwrap();

        assert!(!empty);
        assert!(repo_path.join("hooks").join("pre-receive").exists());
        assert!(!process::is_empty(&repo_path).unwrap());
        assert!(read_blob(&repo_path, "trunk:README.md").starts_with("# demo\n\nA demo"));
        assert!(read_blob(&repo_path, "HEAD:LICENSE").contains("MIT"));
        assert!(!temp.path().join("scratch").exists());
    }
}
