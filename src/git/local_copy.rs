use std::path::Path;
use std::time::Duration;

use tokio::fs;

use super::process::{self, CloneOptions, GitCommand};
use crate::error::Result;

/// Brings the scratch clone at `local_path` in line with `canonical_path` at `branch`.
///
/// A missing local copy is cloned (without `--branch` for wikis, which may be
/// empty). An existing one is fetched with pruning, checked out and hard-reset
/// to `origin/<branch>`. The first failing step aborts and is named in the error.
pub async fn sync_local_copy(
    canonical_path: &Path,
    local_path: &Path,
    branch: &str,
    is_wiki: bool,
    clone_timeout: Duration,
) -> Result<()> {
    if !fs::try_exists(local_path).await? {
        let opts = CloneOptions {
            branch: (!is_wiki).then(|| branch.to_string()),
            timeout: Some(clone_timeout),
            ..Default::default()
        };
        process::clone(canonical_path.as_os_str(), local_path, &opts).await?;
        return Ok(());
    }

    GitCommand::new("fetch")
        .current_dir(local_path)
        .args(["fetch", "--prune"])
        .timeout(clone_timeout)
        .run()
        .await?;
    GitCommand::new("checkout")
        .current_dir(local_path)
        .args(["checkout", branch])
        .run()
        .await?;
    GitCommand::new("reset")
        .current_dir(local_path)
        .args(["reset", "--hard"])
        .arg(format!("origin/{branch}"))
        .run()
        .await?;
    Ok(())
}

/// Current commit of a local copy.
pub async fn head_commit(local_path: &Path) -> Result<String> {
    let out = GitCommand::new("rev-parse")
        .current_dir(local_path)
        .args(["rev-parse", "HEAD"])
        .run()
        .await?;
    Ok(out.trim().to_string())
}
