use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database, scratch copies and attachments.
    pub data_dir: PathBuf,
    /// Executable that installed hook scripts call back into.
    pub app_path: PathBuf,
    /// Public base URL, used for HTTPS clone links (e.g., "https://git.example.com/").
    pub external_url: String,
    pub repository: RepositoryConfig,
    pub git: GitConfig,
    pub cron: CronConfig,
    pub mirror: MirrorConfig,
    pub ssh: SshConfig,

    /// Path of the file this config was loaded from. Embedded in hook scripts.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Root of the `<owner>/<repo>.git` tree. Relative paths resolve against `data_dir`.
    pub root: PathBuf,
    pub default_branch: String,
    /// Global repository limit per owner, -1 means unlimited.
    pub max_creation_limit: i64,
    /// Interpreter named in the shebang of hook scripts.
    pub script_type: String,
    /// Optional directory overriding the built-in readme/gitignore/license templates.
    pub templates_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub clone_timeout_secs: u64,
    pub migrate_timeout_secs: u64,
    pub gc_timeout_secs: u64,
    pub gc_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    pub archive_older_than_secs: u64,
    pub fsck_args: Vec<String>,
    pub fsck_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub default_interval_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub domain: String,
    pub port: u16,
    pub run_user: String,
}

impl Config {
    /// Loads a TOML config file. Missing keys fall back to defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
        config.source_path = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.repository.default_branch.trim().is_empty() {
            return Err(Error::Config("repository.default_branch cannot be empty".into()));
        }
        if self.mirror.default_interval_hours <= 0 {
            return Err(Error::Config(
                "mirror.default_interval_hours must be positive".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("repoforge.db")
    }

    #[must_use]
    pub fn repository_root(&self) -> PathBuf {
        if self.repository.root.is_absolute() {
            self.repository.root.clone()
        } else {
            self.data_dir.join(&self.repository.root)
        }
    }

    /// Path written into hook scripts as `--config`.
    #[must_use]
    pub fn config_path_for_hooks(&self) -> PathBuf {
        self.source_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("repoforge.toml"))
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.git.clone_timeout_secs)
    }

    pub fn migrate_timeout(&self) -> Duration {
        Duration::from_secs(self.git.migrate_timeout_secs)
    }

    pub fn gc_timeout(&self) -> Duration {
        Duration::from_secs(self.git.gc_timeout_secs)
    }

    pub fn fsck_timeout(&self) -> Duration {
        Duration::from_secs(self.cron.fsck_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            app_path: std::env::current_exe().unwrap_or_else(|_| PathBuf::from("repoforge")),
            external_url: "http://localhost:3000/".to_string(),
            repository: RepositoryConfig::default(),
            git: GitConfig::default(),
            cron: CronConfig::default(),
            mirror: MirrorConfig::default(),
            ssh: SshConfig::default(),
            source_path: None,
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("repositories"),
            default_branch: "main".to_string(),
            max_creation_limit: -1,
            script_type: "bash".to_string(),
            templates_dir: None,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            clone_timeout_secs: 300,
            migrate_timeout_secs: 600,
            gc_timeout_secs: 60,
            gc_args: Vec::new(),
        }
    }
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            archive_older_than_secs: 24 * 60 * 60,
            fsck_args: Vec::new(),
            fsck_timeout_secs: 300,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            default_interval_hours: 8,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            port: 22,
            run_user: "git".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("repoforge.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/srv/forge"

[repository]
default_branch = "trunk"
max_creation_limit = 5
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/forge"));
        assert_eq!(config.repository.default_branch, "trunk");
        assert_eq!(config.repository.max_creation_limit, 5);
        assert_eq!(config.repository.script_type, "bash");
        assert_eq!(config.git.clone_timeout_secs, 300);
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.config_path_for_hooks(), path);
    }

    #[test]
    fn test_repository_root_relative_to_data_dir() {
        let config = Config {
            data_dir: PathBuf::from("/data"),
            ..Config::default()
        };
        assert_eq!(config.repository_root(), PathBuf::from("/data/repositories"));
        assert_eq!(config.db_path(), PathBuf::from("/data/repoforge.db"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "[mirror]\ndefault_interval_hours = 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
