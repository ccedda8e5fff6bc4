use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};

const MAX_USER_NAME_LEN: usize = 40;
const MAX_TEAM_NAME_LEN: usize = 30;
const MAX_REPO_NAME_LEN: usize = 100;

const RESERVED_REPO_NAMES: &[&str] = &[".", ".."];
const RESERVED_REPO_PATTERNS: &[&str] = &["*.git", "*.wiki"];

const RESERVED_USER_NAMES: &[&str] = &[
    "admin", "api", "assets", "css", "explore", "img", "install", "issues", "js", "login",
    "new", "org", "plugins", "pulls", "repo", "template", "user", "-", ".", "..",
];
const RESERVED_USER_PATTERNS: &[&str] = &["*.keys"];

fn is_valid_name_char(c: char, allow_period: bool) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_period && c == '.')
}

fn not_allowed(name: &str, reason: impl Into<String>) -> Error {
    Error::NameNotAllowed {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn check_reserved(name: &str, names: &[&str], patterns: &[&str]) -> Result<()> {
    let lower = name.to_lowercase();
    if names.contains(&lower.as_str()) {
        return Err(not_allowed(name, "name is reserved"));
    }

    let opts = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    for raw in patterns {
        let pattern = Pattern::new(raw)
            .map_err(|e| Error::Config(format!("reserved pattern {raw}: {e}")))?;
        if pattern.matches_with(name, opts) {
            return Err(not_allowed(name, format!("pattern '{raw}' is reserved")));
        }
    }
    Ok(())
}

fn check_characters(name: &str, entity: &str, max_len: usize, allow_period: bool) -> Result<()> {
    if name.is_empty() {
        return Err(not_allowed(name, format!("{entity} name cannot be empty")));
    }
    if name.chars().count() > max_len {
        return Err(not_allowed(
            name,
            format!("{entity} name cannot exceed {max_len} characters"),
        ));
    }
    if !name.chars().all(|c| is_valid_name_char(c, allow_period)) {
        let mut allowed = "alphanumeric characters, hyphens, and underscores".to_string();
        if allow_period {
            allowed.push_str(", and periods");
        }
        return Err(not_allowed(name, format!("{entity} name can only contain {allowed}")));
    }
    Ok(())
}

/// Rejects repository names that are reserved or would clash with on-disk suffixes.
pub fn validate_repo_name(name: &str) -> Result<()> {
    check_reserved(name, RESERVED_REPO_NAMES, RESERVED_REPO_PATTERNS)?;
    check_characters(name, "Repository", MAX_REPO_NAME_LEN, true)
}

pub fn validate_user_name(name: &str) -> Result<()> {
    check_reserved(name, RESERVED_USER_NAMES, RESERVED_USER_PATTERNS)?;
    check_characters(name, "User", MAX_USER_NAME_LEN, true)?;
    if name.starts_with('-') || name.starts_with('_') {
        return Err(not_allowed(
            name,
            "User name cannot start with a hyphen or underscore",
        ));
    }
    Ok(())
}

pub fn validate_team_name(name: &str) -> Result<()> {
    check_reserved(name, &["new"], &[])?;
    check_characters(name, "Team", MAX_TEAM_NAME_LEN, true)
}
