use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::fs;
use tokio::process::Command;

use crate::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// A single `git` invocation, tagged with the step name reported on failure.
#[derive(Debug, Clone)]
pub struct GitCommand {
    step: String,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl GitCommand {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the command and returns its stdout.
    ///
    /// A non-zero exit or an expired timeout becomes [`Error::Operation`]
    /// naming this command's step. The child is killed on timeout.
    pub async fn run(self) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        tracing::debug!(step = %self.step, args = ?self.args, "running git");

        let child = cmd
            .spawn()
            .map_err(|e| Error::operation(&self.step, format!("spawn git: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::operation(
                    &self.step,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| Error::operation(&self.step, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::operation(&self.step, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub bare: bool,
    pub mirror: bool,
    pub quiet: bool,
    pub branch: Option<String>,
    pub timeout: Option<Duration>,
}

pub async fn clone(from: impl AsRef<OsStr>, to: &Path, opts: &CloneOptions) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut cmd = GitCommand::new("clone").arg("clone");
    if opts.bare {
        cmd = cmd.arg("--bare");
    }
    if opts.mirror {
        cmd = cmd.arg("--mirror");
    }
    if opts.quiet {
        cmd = cmd.arg("--quiet");
    }
    if let Some(branch) = &opts.branch {
        cmd = cmd.args(["--branch", branch.as_str()]);
    }
    if let Some(timeout) = opts.timeout {
        cmd = cmd.timeout(timeout);
    }
    cmd.arg("--").arg(from).arg(to).run().await?;
    Ok(())
}

pub async fn init_bare_repo(repo_path: &Path) -> Result<()> {
    if let Some(parent) = repo_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    GitCommand::new("init bare repository")
        .args(["init", "--bare"])
        .arg(repo_path)
        .run()
        .await?;
    Ok(())
}

/// Points HEAD of `repo_path` at `refs/heads/<branch>`.
pub async fn set_head(repo_path: &Path, branch: &str) -> Result<()> {
    GitCommand::new("set default branch")
        .current_dir(repo_path)
        .args(["symbolic-ref", "HEAD"])
        .arg(format!("refs/heads/{branch}"))
        .run()
        .await?;
    Ok(())
}

/// Branch HEAD points at, or `None` when HEAD is detached.
pub async fn head_branch(repo_path: &Path) -> Result<Option<String>> {
    let out = GitCommand::new("read default branch")
        .current_dir(repo_path)
        .args(["symbolic-ref", "HEAD"])
        .run()
        .await;
    match out {
        Ok(out) => Ok(out
            .trim()
            .strip_prefix("refs/heads/")
            .map(str::to_string)),
        Err(e) if e.to_string().contains("not a symbolic ref") => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn update_server_info(repo_path: &Path) -> Result<()> {
    GitCommand::new("update server info")
        .current_dir(repo_path)
        .arg("update-server-info")
        .run()
        .await?;
    Ok(())
}

/// True when the repository holds no commit, whatever branch HEAD names.
pub fn is_empty(repo_path: &Path) -> Result<bool> {
    let git_err = |e: git2::Error| Error::operation("probe repository", e.message());
    let repo = git2::Repository::open_bare(repo_path)
        .map_err(|e| Error::operation("open repository", e.message()))?;

    match repo.head() {
        Ok(head) => return head.peel_to_commit().map(|_| false).map_err(git_err),
        Err(e) if matches!(e.code(), git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound) => {}
        Err(e) => return Err(git_err(e)),
    }

    // HEAD may name an unborn branch while other refs carry history.
    for reference in repo.references().map_err(git_err)? {
        if reference.map_err(git_err)?.peel_to_commit().is_ok() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// On-disk size in bytes as reported by `git count-objects -v`.
pub async fn count_objects_size(repo_path: &Path) -> Result<i64> {
    let out = GitCommand::new("count objects")
        .current_dir(repo_path)
        .args(["count-objects", "-v"])
        .run()
        .await?;
    Ok(parse_count_objects(&out))
}

fn parse_count_objects(out: &str) -> i64 {
    out.lines()
        .filter_map(|line| line.split_once(": "))
        .filter(|(key, _)| *key == "size" || *key == "size-pack")
        .filter_map(|(_, value)| value.trim().parse::<i64>().ok())
        .sum::<i64>()
        * 1024
}

/// Removes the `[remote "origin"]` section, along with any credentials embedded in its URL.
pub async fn remove_origin(repo_path: &Path) -> Result<()> {
    let out = GitCommand::new("remove origin")
        .current_dir(repo_path)
        .args(["config", "--file", "config", "--remove-section", "remote.origin"])
        .run()
        .await;
    match out {
        Ok(_) => Ok(()),
        // Nothing to strip
        Err(e) if e.to_string().contains("no such section") => Ok(()),
        Err(e) => Err(e),
    }
}

/// True if `url` answers `git ls-remote` within `timeout`.
pub async fn is_reachable(url: &str, timeout: Duration) -> bool {
    GitCommand::new("ls-remote")
        .args(["ls-remote", "-h", "--", url])
        .env("GIT_TERMINAL_PROMPT", "0")
        .timeout(timeout)
        .run()
        .await
        .is_ok()
}

pub async fn remote_update(repo_path: &Path, prune: bool, timeout: Duration) -> Result<()> {
    let mut cmd = GitCommand::new("remote update")
        .current_dir(repo_path)
        .args(["remote", "update"])
        .timeout(timeout);
    if prune {
        cmd = cmd.arg("--prune");
    }
    cmd.run().await?;
    Ok(())
}

pub async fn fsck(repo_path: &Path, args: &[String], timeout: Duration) -> Result<()> {
    GitCommand::new("fsck")
        .current_dir(repo_path)
        .arg("fsck")
        .args(args)
        .timeout(timeout)
        .run()
        .await?;
    Ok(())
}

pub async fn gc(repo_path: &Path, args: &[String], timeout: Duration) -> Result<()> {
    GitCommand::new("gc")
        .current_dir(repo_path)
        .arg("gc")
        .args(args)
        .timeout(timeout)
        .run()
        .await?;
    Ok(())
}

/// Removes a directory tree, treating an already missing one as success.
pub async fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::operation(
            format!("remove {}", path.display()),
            e,
        )),
    }
}

/// Moves a directory tree, creating the destination's parent.
pub async fn move_tree(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::rename(from, to)
        .await
        .map_err(|e| Error::operation(format!("move {}", from.display()), e))
}
