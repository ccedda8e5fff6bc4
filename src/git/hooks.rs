use std::path::Path;

use tokio::fs;

use crate::config::Config;
use crate::error::{Error, Result};

/// Server-side hooks installed into every repository, with the arguments git passes them.
pub const HOOK_NAMES: [(&str, &str); 3] = [
    ("pre-receive", ""),
    ("update", " $1 $2 $3"),
    ("post-receive", ""),
];

fn hook_script(config: &Config, name: &str, args: &str) -> String {
    format!(
        "#!/usr/bin/env {}\n\"{}\" hook --config='{}' {}{}\n",
        config.repository.script_type,
        config.app_path.display(),
        config.config_path_for_hooks().display(),
        name,
        args,
    )
}

/// Writes the hook scripts into `<repo_path>/hooks`, replacing existing ones.
pub async fn install_hooks(config: &Config, repo_path: &Path) -> Result<()> {
    let hooks_dir = repo_path.join("hooks");
    fs::create_dir_all(&hooks_dir)
        .await
        .map_err(|e| Error::operation("install hooks", e))?;

    for (name, args) in HOOK_NAMES {
        let path = hooks_dir.join(name);
        fs::write(&path, hook_script(config, name, args))
            .await
            .map_err(|e| Error::operation(format!("write hook {name}"), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| Error::operation(format!("chmod hook {name}"), e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config() -> Config {
        Config {
            app_path: PathBuf::from("/usr/local/bin/repoforge"),
            source_path: Some(PathBuf::from("/etc/repoforge.toml")),
            ..Config::default()
        }
    }

    #[test]
    fn test_hook_script_format() {
        let script = hook_script(&config(), "update", " $1 $2 $3");
        assert_eq!(
            script,
            "#!/usr/bin/env bash\n\"/usr/local/bin/repoforge\" hook --config='/etc/repoforge.toml' update $1 $2 $3\n"
        );
    }

    #[tokio::test]
    async fn test_install_hooks_executable() {
        let temp = TempDir::new().unwrap();
        install_hooks(&config(), temp.path()).await.unwrap();

        for (name, _) in HOOK_NAMES {
            let path = temp.path().join("hooks").join(name);
            let content = std::fs::read_to_string(&path).unwrap();
            assert!(content.contains(&format!("hook --config='/etc/repoforge.toml' {name}")));

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = std::fs::metadata(&path).unwrap().permissions().mode();
                assert_eq!(mode & 0o777, 0o755);
            }
        }
    }
}
