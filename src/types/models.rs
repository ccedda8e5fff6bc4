use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AccessMode;

/// Name of the distinguished team whose members own every organization repository.
pub const OWNER_TEAM_NAME: &str = "Owners";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Individual,
    Organization,
}

impl UserKind {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Individual => 0,
            Self::Organization => 1,
        }
    }

    #[must_use]
    pub fn from_i64(v: i64) -> Self {
        if v == 1 {
            Self::Organization
        } else {
            Self::Individual
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub lower_name: String,
    pub kind: UserKind,
    pub email: String,
    /// Per-owner repository limit, -1 defers to the global limit.
    pub max_repo_creation: i64,
    pub num_repos: i64,
    pub num_stars: i64,
    pub num_teams: i64,
    pub num_members: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn is_organization(&self) -> bool {
        self.kind == UserKind::Organization
    }

    /// Effective repository limit given the global default, -1 means unlimited.
    #[must_use]
    pub fn max_repos(&self, global_limit: i64) -> i64 {
        if self.max_repo_creation <= -1 {
            global_limit
        } else {
            self.max_repo_creation
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub kind: UserKind,
    pub max_repo_creation: i64,
}

impl NewUser {
    pub fn individual(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            kind: UserKind::Individual,
            max_repo_creation: -1,
        }
    }

    pub fn organization(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: String::new(),
            kind: UserKind::Organization,
            max_repo_creation: -1,
        }
    }
}

/// The owner of a repository: either an individual account or an organization.
///
/// Access computation, watch bookkeeping and team detachment all branch on
/// this variant rather than on a flag.
#[derive(Debug, Clone)]
pub enum Owner {
    Individual(User),
    Organization(User),
}

impl Owner {
    #[must_use]
    pub fn user(&self) -> &User {
        match self {
            Self::Individual(u) | Self::Organization(u) => u,
        }
    }

    #[must_use]
    pub fn into_user(self) -> User {
        match self {
            Self::Individual(u) | Self::Organization(u) => u,
        }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.user().id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.user().name
    }

    #[must_use]
    pub fn is_organization(&self) -> bool {
        matches!(self, Self::Organization(_))
    }
}

impl From<User> for Owner {
    fn from(user: User) -> Self {
        match user.kind {
            UserKind::Individual => Self::Individual(user),
            UserKind::Organization => Self::Organization(user),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub owner_id: i64,
    pub lower_name: String,
    pub name: String,
    pub description: String,
    pub website: String,
    pub default_branch: String,
    pub size: i64,

    pub num_watches: i64,
    pub num_stars: i64,
    pub num_forks: i64,
    pub num_issues: i64,
    pub num_closed_issues: i64,
    pub num_open_issues: i64,
    pub num_pulls: i64,
    pub num_closed_pulls: i64,
    pub num_open_pulls: i64,
    pub num_milestones: i64,
    pub num_closed_milestones: i64,
    pub num_open_milestones: i64,

    pub is_private: bool,
    pub is_unlisted: bool,
    pub is_bare: bool,
    pub is_mirror: bool,

    pub enable_wiki: bool,
    pub allow_public_wiki: bool,
    pub enable_external_wiki: bool,
    pub external_wiki_url: String,
    pub enable_issues: bool,
    pub allow_public_issues: bool,
    pub enable_external_tracker: bool,
    pub external_tracker_url: String,
    pub external_tracker_format: String,
    pub external_tracker_style: String,
    pub enable_pulls: bool,
    pub pulls_ignore_whitespace: bool,
    pub pulls_allow_rebase: bool,

    pub is_fork: bool,
    /// Base repository ID for forks, 0 otherwise.
    pub fork_id: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    pub owner: Option<User>,
    #[serde(skip)]
    pub base_repo: Option<Box<Repository>>,
    #[serde(skip)]
    pub mirror: Option<Mirror>,
}

impl Repository {
    /// Unsaved repository with the default feature toggles enabled.
    pub fn new(owner_id: i64, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: 0,
            owner_id,
            lower_name: name.to_lowercase(),
            name,
            description: String::new(),
            website: String::new(),
            default_branch: String::new(),
            size: 0,
            num_watches: 0,
            num_stars: 0,
            num_forks: 0,
            num_issues: 0,
            num_closed_issues: 0,
            num_open_issues: 0,
            num_pulls: 0,
            num_closed_pulls: 0,
            num_open_pulls: 0,
            num_milestones: 0,
            num_closed_milestones: 0,
            num_open_milestones: 0,
            is_private: false,
            is_unlisted: false,
            is_bare: false,
            is_mirror: false,
            enable_wiki: true,
            allow_public_wiki: false,
            enable_external_wiki: false,
            external_wiki_url: String::new(),
            enable_issues: true,
            allow_public_issues: false,
            enable_external_tracker: false,
            external_tracker_url: String::new(),
            external_tracker_format: String::new(),
            external_tracker_style: String::new(),
            enable_pulls: true,
            pulls_ignore_whitespace: false,
            pulls_allow_rebase: false,
            is_fork: false,
            fork_id: 0,
            created_at: now,
            updated_at: now,
            owner: None,
            base_repo: None,
            mirror: None,
        }
    }

    /// Recomputes the derived open counters from totals and closed counts.
    pub fn recompute_open_counters(&mut self) {
        self.num_open_issues = self.num_issues - self.num_closed_issues;
        self.num_open_pulls = self.num_pulls - self.num_closed_pulls;
        self.num_open_milestones = self.num_milestones - self.num_closed_milestones;
    }

    /// Returns `owner/name` when the owner is loaded, the bare name otherwise.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}/{}", owner.name, self.name),
            None => self.name.clone(),
        }
    }

    #[must_use]
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }

    /// Public, or exposes its wiki or issues to guests.
    #[must_use]
    pub fn is_partial_public(&self) -> bool {
        !self.is_private || self.allow_public_wiki || self.allow_public_issues
    }

    #[must_use]
    pub fn can_guest_view_wiki(&self) -> bool {
        self.enable_wiki && !self.enable_external_wiki && self.allow_public_wiki
    }

    #[must_use]
    pub fn can_guest_view_issues(&self) -> bool {
        self.enable_issues && !self.enable_external_tracker && self.allow_public_issues
    }

    #[must_use]
    pub fn can_be_forked(&self) -> bool {
        !self.is_bare
    }

    #[must_use]
    pub fn can_enable_pulls(&self) -> bool {
        !self.is_mirror && !self.is_bare
    }

    #[must_use]
    pub fn allows_pulls(&self) -> bool {
        self.can_enable_pulls() && self.enable_pulls
    }

    #[must_use]
    pub fn can_enable_editor(&self) -> bool {
        !self.is_mirror
    }

    #[must_use]
    pub fn next_issue_index(&self) -> i64 {
        self.num_issues + self.num_pulls + 1
    }

    /// Actions recorded for hidden repositories are hidden too.
    #[must_use]
    pub fn is_action_private(&self) -> bool {
        self.is_private || self.is_unlisted
    }
}

/// Materialized effective access of a user on a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub user_id: i64,
    pub repo_id: i64,
    pub mode: AccessMode,
}

/// Explicit grant entered by a repository owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaboration {
    pub repo_id: i64,
    pub user_id: i64,
    pub mode: AccessMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub org_id: i64,
    pub lower_name: String,
    pub name: String,
    pub description: String,
    pub authorize: AccessMode,
    pub num_repos: i64,
    pub num_members: i64,
}

impl Team {
    #[must_use]
    pub fn is_owner_team(&self) -> bool {
        self.lower_name == OWNER_TEAM_NAME.to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateRepo,
    RenameRepo,
    TransferRepo,
    ForkRepo,
    MirrorSyncPush,
}

impl ActionType {
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::CreateRepo => 1,
            Self::RenameRepo => 2,
            Self::TransferRepo => 8,
            Self::ForkRepo => 20,
            Self::MirrorSyncPush => 21,
        }
    }

    #[must_use]
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            1 => Some(Self::CreateRepo),
            2 => Some(Self::RenameRepo),
            8 => Some(Self::TransferRepo),
            20 => Some(Self::ForkRepo),
            21 => Some(Self::MirrorSyncPush),
            _ => None,
        }
    }
}

/// Activity feed entry. One row is written per receiving user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub user_id: i64,
    pub op_type: ActionType,
    pub act_user_id: i64,
    pub act_user_name: String,
    pub repo_id: i64,
    pub repo_user_name: String,
    pub repo_name: String,
    pub content: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mirror {
    pub id: i64,
    pub repo_id: i64,
    pub interval_hours: i64,
    pub enable_prune: bool,
    pub next_sync_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub id: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub repo_id: i64,
    pub index: i64,
    pub poster_id: i64,
    pub title: String,
    pub is_pull: bool,
    pub is_closed: bool,
    pub num_comments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: i64,
    pub repo_id: i64,
    pub name: String,
    pub is_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub uuid: String,
    pub issue_id: i64,
    pub name: String,
}

/// Kind of cross-substrate lifecycle operation tracked in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Fork,
    Migrate,
    Transfer,
    Rename,
    Delete,
    Visibility,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Fork => "fork",
            Self::Migrate => "migrate",
            Self::Transfer => "transfer",
            Self::Rename => "rename",
            Self::Delete => "delete",
            Self::Visibility => "visibility",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "fork" => Some(Self::Fork),
            "migrate" => Some(Self::Migrate),
            "transfer" => Some(Self::Transfer),
            "rename" => Some(Self::Rename),
            "delete" => Some(Self::Delete),
            "visibility" => Some(Self::Visibility),
            _ => None,
        }
    }
}

/// Phase of a lifecycle operation spanning the database and the filesystem.
///
/// `Pending -> Committed -> FilesystemApplied | FilesystemFailed`. A
/// `FilesystemFailed` row marks a database record whose on-disk side is
/// missing or partial and needs operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    Pending,
    Committed,
    FilesystemApplied,
    FilesystemFailed { compensated: bool },
}

impl OperationPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::FilesystemApplied => "applied",
            Self::FilesystemFailed { compensated: true } => "failed_compensated",
            Self::FilesystemFailed { compensated: false } => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "committed" => Some(Self::Committed),
            "applied" => Some(Self::FilesystemApplied),
            "failed_compensated" => Some(Self::FilesystemFailed { compensated: true }),
            "failed" => Some(Self::FilesystemFailed { compensated: false }),
            _ => None,
        }
    }

    /// Allowed transitions: `Pending -> Committed -> FilesystemApplied | FilesystemFailed`.
    #[must_use]
    pub fn can_advance_to(self, next: OperationPhase) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Committed)
                | (Self::Committed, Self::FilesystemApplied)
                | (Self::Committed, Self::FilesystemFailed { .. })
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::FilesystemApplied | Self::FilesystemFailed { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOperation {
    pub id: i64,
    pub repo_id: i64,
    pub kind: OperationKind,
    pub phase: OperationPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
