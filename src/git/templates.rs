use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};

const README_DEFAULT: &str = "# {{Name}}\n\n{{Description}}\n\n## Clone\n\n```\ngit clone {{CloneURL.HTTPS}}\n```\n\nor over SSH:\n\n```\ngit clone {{CloneURL.SSH}}\n```\n";

const GITIGNORE_RUST: &str = "/target\n**/*.rs.bk\n";

const GITIGNORE_GO: &str = "*.exe\n*.test\n*.out\nvendor/\n";

const LICENSE_MIT: &str = "MIT License\n\nPermission is hereby granted, free of charge, to any person obtaining a copy\nof this software and associated documentation files (the \"Software\"), to deal\nin the Software without restriction, including without limitation the rights\nto use, copy, modify, merge, publish, distribute, sublicense, and/or sell\ncopies of the Software, and to permit persons to whom the Software is\nfurnished to do so, subject to the following conditions:\n\nThe above copyright notice and this permission notice shall be included in all\ncopies or substantial portions of the Software.\n\nTHE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR\nIMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,\nFITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE\nAUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER\nLIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,\nOUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE\nSOFTWARE.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Readme,
    Gitignore,
    License,
}

impl TemplateKind {
    const fn dir(self) -> &'static str {
        match self {
            Self::Readme => "readme",
            Self::Gitignore => "gitignore",
            Self::License => "license",
        }
    }

    fn builtin(self, name: &str) -> Option<&'static str> {
        match (self, name) {
            (Self::Readme, "Default") => Some(README_DEFAULT),
            (Self::Gitignore, "Rust") => Some(GITIGNORE_RUST),
            (Self::Gitignore, "Go") => Some(GITIGNORE_GO),
            (Self::License, "MIT") => Some(LICENSE_MIT),
            _ => None,
        }
    }
}

/// Loads an init-file template, preferring `<templates_dir>/<kind>/<name>` over the built-ins.
pub fn load_template(config: &Config, kind: TemplateKind, name: &str) -> Result<String> {
    let name = name.trim();
    let rel = Path::new(name);
    if name.is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(Error::BadRequest(format!(
            "invalid {} template name '{name}'",
            kind.dir()
        )));
    }

    if let Some(dir) = &config.repository.templates_dir {
        let custom: PathBuf = dir.join(kind.dir()).join(rel);
        if custom.is_file() {
            return Ok(std::fs::read_to_string(&custom)?);
        }
    }

    kind.builtin(name)
        .map(str::to_string)
        .ok_or_else(|| Error::not_found(format!("{} template '{name}'", kind.dir())))
}

/// SSH and HTTPS clone URLs of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneLink {
    pub ssh: String,
    pub https: String,
}

impl CloneLink {
    pub fn new(config: &Config, owner: &str, repo: &str) -> Self {
        let ssh = if config.ssh.port == 22 {
            format!(
                "{}@{}:{owner}/{repo}.git",
                config.ssh.run_user, config.ssh.domain
            )
        } else {
            format!(
                "ssh://{}@{}:{}/{owner}/{repo}.git",
                config.ssh.run_user, config.ssh.domain, config.ssh.port
            )
        };
        let https = format!(
            "{}/{owner}/{repo}.git",
            config.external_url.trim_end_matches('/')
        );
        Self { ssh, https }
    }
}

/// Substitutes the README placeholders.
pub fn render_readme(template: &str, name: &str, description: &str, link: &CloneLink) -> String {
    template
        .replace("{{Name}}", name)
        .replace("{{Description}}", description)
        .replace("{{CloneURL.SSH}}", &link.ssh)
        .replace("{{CloneURL.HTTPS}}", &link.https)
}

/// Concatenates comma-separated gitignore templates, each headed by `# ---> name`.
pub fn render_gitignore(config: &Config, names: &str) -> Result<String> {
    let mut buf = String::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let data = load_template(config, TemplateKind::Gitignore, name)?;
        buf.push_str("# ---> ");
        buf.push_str(name);
        buf.push('\n');
        buf.push_str(&data);
        buf.push('\n');
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_readme_substitution() {
        let config = Config::default();
        let link = CloneLink::new(&config, "alice", "demo");
        let template = load_template(&config, TemplateKind::Readme, "Default").unwrap();
        let readme = render_readme(&template, "demo", "A demo", &link);

        assert!(readme.starts_with("# demo\n\nA demo"));
        assert!(readme.contains("git@localhost:alice/demo.git"));
        assert!(readme.contains("http://localhost:3000/alice/demo.git"));
        assert!(!readme.contains("{{"));
    }

    #[test]
    fn test_ssh_link_with_custom_port() {
        let mut config = Config::default();
        config.ssh.port = 2222;
        let link = CloneLink::new(&config, "alice", "demo");
        assert_eq!(link.ssh, "ssh://git@localhost:2222/alice/demo.git");
    }

    #[test]
    fn test_gitignore_concatenation() {
        let config = Config::default();
        let out = render_gitignore(&config, "Rust, Go").unwrap();
        assert!(out.starts_with("# ---> Rust\n/target\n"));
        assert!(out.contains("# ---> Go\n*.exe\n"));
    }

    #[test]
    fn test_custom_template_overrides_builtin() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("license")).unwrap();
        std::fs::write(temp.path().join("license").join("MIT"), "custom").unwrap();

        let mut config = Config::default();
        config.repository.templates_dir = Some(temp.path().to_path_buf());
        assert_eq!(
            load_template(&config, TemplateKind::License, "MIT").unwrap(),
            "custom"
        );
    }

    #[test]
    fn test_unknown_and_traversal_names_rejected() {
        let config = Config::default();
        assert!(
            load_template(&config, TemplateKind::License, "GPL-9")
                .unwrap_err()
                .is_not_found()
        );
        assert!(matches!(
            load_template(&config, TemplateKind::Readme, "../secret"),
            Err(Error::BadRequest(_))
        ));
    }
}
