pub const SCHEMA: &str = r#"
-- Individuals and organizations share one table; kind 1 is an organization
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    lower_name TEXT NOT NULL UNIQUE,
    kind INTEGER NOT NULL DEFAULT 0,
    email TEXT NOT NULL DEFAULT '',

    -- -1 = use the global limit
    max_repo_creation INTEGER NOT NULL DEFAULT -1,

    num_repos INTEGER NOT NULL DEFAULT 0,
    num_stars INTEGER NOT NULL DEFAULT 0,
    num_teams INTEGER NOT NULL DEFAULT 0,
    num_members INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS org_users (
    org_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    is_owner INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (org_id, user_id)
);

CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    org_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    lower_name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    authorize INTEGER NOT NULL DEFAULT 1,
    num_repos INTEGER NOT NULL DEFAULT 0,
    num_members INTEGER NOT NULL DEFAULT 0,
    UNIQUE(org_id, lower_name)
);

CREATE TABLE IF NOT EXISTS team_users (
    org_id INTEGER NOT NULL,
    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (team_id, user_id)
);

-- Repository dependents are removed explicitly by the lifecycle code,
-- so repository references carry no foreign keys.
CREATE TABLE IF NOT EXISTS team_repos (
    org_id INTEGER NOT NULL,
    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    repo_id INTEGER NOT NULL,
    PRIMARY KEY (team_id, repo_id)
);

CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    lower_name TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    website TEXT NOT NULL DEFAULT '',
    default_branch TEXT NOT NULL DEFAULT '',
    size INTEGER NOT NULL DEFAULT 0,

    num_watches INTEGER NOT NULL DEFAULT 0,
    num_stars INTEGER NOT NULL DEFAULT 0,
    num_forks INTEGER NOT NULL DEFAULT 0,
    num_issues INTEGER NOT NULL DEFAULT 0,
    num_closed_issues INTEGER NOT NULL DEFAULT 0,
    num_pulls INTEGER NOT NULL DEFAULT 0,
    num_closed_pulls INTEGER NOT NULL DEFAULT 0,
    num_milestones INTEGER NOT NULL DEFAULT 0,
    num_closed_milestones INTEGER NOT NULL DEFAULT 0,

    is_private INTEGER NOT NULL DEFAULT 0,
    is_unlisted INTEGER NOT NULL DEFAULT 0,
    is_bare INTEGER NOT NULL DEFAULT 0,
    is_mirror INTEGER NOT NULL DEFAULT 0,

    enable_wiki INTEGER NOT NULL DEFAULT 1,
    allow_public_wiki INTEGER NOT NULL DEFAULT 0,
    enable_external_wiki INTEGER NOT NULL DEFAULT 0,
    external_wiki_url TEXT NOT NULL DEFAULT '',
    enable_issues INTEGER NOT NULL DEFAULT 1,
    allow_public_issues INTEGER NOT NULL DEFAULT 0,
    enable_external_tracker INTEGER NOT NULL DEFAULT 0,
    external_tracker_url TEXT NOT NULL DEFAULT '',
    external_tracker_format TEXT NOT NULL DEFAULT '',
    external_tracker_style TEXT NOT NULL DEFAULT '',
    enable_pulls INTEGER NOT NULL DEFAULT 1,
    pulls_ignore_whitespace INTEGER NOT NULL DEFAULT 0,
    pulls_allow_rebase INTEGER NOT NULL DEFAULT 0,

    -- Fork linkage is a weak reference; 0 = not a fork
    is_fork INTEGER NOT NULL DEFAULT 0,
    fork_id INTEGER NOT NULL DEFAULT 0,

    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(owner_id, lower_name)
);

CREATE INDEX IF NOT EXISTS idx_repositories_fork ON repositories(fork_id);

-- Materialized effective access, rewritten wholesale per repository
CREATE TABLE IF NOT EXISTS access (
    user_id INTEGER NOT NULL,
    repo_id INTEGER NOT NULL,
    mode INTEGER NOT NULL,
    PRIMARY KEY (user_id, repo_id)
);

CREATE INDEX IF NOT EXISTS idx_access_repo ON access(repo_id);

CREATE TABLE IF NOT EXISTS collaborations (
    repo_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    mode INTEGER NOT NULL DEFAULT 2,
    PRIMARY KEY (repo_id, user_id)
);

CREATE TABLE IF NOT EXISTS watches (
    user_id INTEGER NOT NULL,
    repo_id INTEGER NOT NULL,
    PRIMARY KEY (user_id, repo_id)
);

CREATE TABLE IF NOT EXISTS stars (
    user_id INTEGER NOT NULL,
    repo_id INTEGER NOT NULL,
    PRIMARY KEY (user_id, repo_id)
);

CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    op_type INTEGER NOT NULL,
    act_user_id INTEGER NOT NULL,
    act_user_name TEXT NOT NULL,
    repo_id INTEGER NOT NULL,
    repo_user_name TEXT NOT NULL,
    repo_name TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    is_private INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_actions_repo ON actions(repo_id);

CREATE TABLE IF NOT EXISTS mirrors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL UNIQUE,
    interval_hours INTEGER NOT NULL,
    enable_prune INTEGER NOT NULL DEFAULT 1,
    next_sync_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    poster_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    is_pull INTEGER NOT NULL DEFAULT 0,
    is_closed INTEGER NOT NULL DEFAULT 0,
    num_comments INTEGER NOT NULL DEFAULT 0,
    UNIQUE(repo_id, idx)
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id INTEGER NOT NULL,
    poster_id INTEGER NOT NULL,
    content TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    issue_id INTEGER NOT NULL DEFAULT 0,
    comment_id INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issue_users (
    issue_id INTEGER NOT NULL,
    repo_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    PRIMARY KEY (issue_id, user_id)
);

CREATE TABLE IF NOT EXISTS milestones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    is_closed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS labels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS releases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    tag_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pull_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id INTEGER NOT NULL,
    base_repo_id INTEGER NOT NULL,
    head_repo_id INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS protect_branches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS protect_branch_whitelists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    protect_branch_id INTEGER NOT NULL,
    repo_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS webhooks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    url TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hook_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    hook_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS lfs_objects (
    repo_id INTEGER NOT NULL,
    oid TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (repo_id, oid)
);

-- Operator-visible failures of unattended tasks
CREATE TABLE IF NOT EXISTS notices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Journal of lifecycle operations spanning the database and the filesystem
CREATE TABLE IF NOT EXISTS repo_operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    phase TEXT NOT NULL,
    step TEXT,
    error TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_repo_operations_phase ON repo_operations(phase);
"#;
