use std::fmt;

use serde::{Deserialize, Serialize};

/// AccessMode is the ordered permission level a user holds on a repository.
///
/// Ordering matters: `None < Read < Write < Admin < Owner`, and every
/// comparison in the access calculator relies on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    None,
    Read,
    Write,
    Admin,
    Owner,
}

impl AccessMode {
    pub const ALL: [AccessMode; 5] = [
        AccessMode::None,
        AccessMode::Read,
        AccessMode::Write,
        AccessMode::Admin,
        AccessMode::Owner,
    ];

    /// Returns true if this mode satisfies the required mode.
    #[must_use]
    pub fn has(self, required: AccessMode) -> bool {
        self >= required
    }

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Read => 1,
            Self::Write => 2,
            Self::Admin => 3,
            Self::Owner => 4,
        }
    }

    /// Unknown values collapse to `None` rather than granting anything.
    #[must_use]
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Self::Read,
            2 => Self::Write,
            3 => Self::Admin,
            4 => Self::Owner,
            _ => Self::None,
        }
    }

    pub fn parse(s: &str) -> Option<AccessMode> {
        match s {
            "none" => Some(Self::None),
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AccessMode> for i64 {
    fn from(mode: AccessMode) -> Self {
        mode.as_i64()
    }
}

impl From<i64> for AccessMode {
    fn from(v: i64) -> Self {
        Self::from_i64(v)
    }
}
