//! CLI integration tests for the repoforge binary.
//!
//! Each test uses an isolated temp directory as data dir, so tests can run
//! in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let ctx = Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        };
        ctx.cmd().arg("init").assert().success();
        ctx
    }

    fn data_dir_str(&self) -> String {
        self.temp_dir.path().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("repoforge").expect("failed to find binary");
        cmd.env("NO_COLOR", "1")
            .env("RUST_LOG", "warn")
            .args(["--data-dir", &self.data_dir_str()]);
        cmd
    }

    fn run(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.cmd().args(args).assert()
    }

    fn list_json(&self, owner: &str) -> Vec<Value> {
        let output = self
            .cmd()
            .args(["repo", "list", owner, "--json"])
            .output()
            .expect("failed to run command");
        assert!(output.status.success());
        let value: Value = serde_json::from_slice(&output.stdout).expect("failed to parse JSON");
        value.as_array().expect("list not an array").clone()
    }
}

#[test]
fn test_init_writes_database_and_config() {
    let ctx = TestContext::new();
    ctx.temp_dir.child("repoforge.db").assert(predicate::path::exists());
    ctx.temp_dir
        .child("repoforge.toml")
        .assert(predicate::str::contains("default_branch = \"main\""));

    // A second init keeps the existing config.
    ctx.temp_dir.child("repoforge.toml").write_str("# edited\n").unwrap();
    ctx.run(&["init"]).success();
    ctx.temp_dir
        .child("repoforge.toml")
        .assert(predicate::str::starts_with("# edited"));
}

#[test]
fn test_config_file_is_honored() {
    let temp = TempDir::new().unwrap();
    let data = temp.child("data");
    let config = temp.child("custom.toml");
    config
        .write_str(&format!(
            "data_dir = '{}'\n\n[repository]\ndefault_branch = 'trunk'\n",
            data.path().display()
        ))
        .unwrap();

    let mut cmd = Command::cargo_bin("repoforge").unwrap();
    cmd.args(["--config", &config.path().to_string_lossy(), "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
    data.child("repoforge.db").assert(predicate::path::exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let config = temp.child("bad.toml");
    config.write_str("[mirror]\ndefault_interval_hours = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("repoforge").unwrap();
    cmd.args(["--config", &config.path().to_string_lossy(), "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("default_interval_hours"));
}

#[test]
fn test_user_create_and_list() {
    let ctx = TestContext::new();
    ctx.run(&["user", "create", "alice", "--email", "alice@example.com"])
        .success()
        .stdout(predicate::str::contains("Created user 'alice'"));

    ctx.run(&["user", "create", "Alice"])
        .failure()
        .stderr(predicate::str::contains("already exists"));
    ctx.run(&["user", "create", "admin"])
        .failure()
        .stderr(predicate::str::contains("not allowed"));

    ctx.run(&["user", "list"])
        .success()
        .stdout(predicate::str::contains("alice\tuser\t0 repositories"));
}

#[test]
fn test_repo_create_list_and_rename() {
    let ctx = TestContext::new();
    ctx.run(&["user", "create", "alice"]).success();
    ctx.run(&["repo", "create", "alice", "demo", "--description", "first"])
        .success()
        .stdout(predicate::str::contains("Created alice/demo"));
    ctx.temp_dir
        .child("repositories/alice/demo.git/HEAD")
        .assert(predicate::str::contains("refs/heads/main"));

    ctx.run(&["repo", "create", "alice", "demo.git"])
        .failure()
        .stderr(predicate::str::contains("not allowed"));
    ctx.run(&["repo", "create", "alice", "DEMO"])
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let repos = ctx.list_json("alice");
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0]["name"], "demo");
    assert_eq!(repos[0]["description"], "first");

    ctx.run(&["repo", "rename", "alice/demo", "renamed"])
        .success()
        .stdout(predicate::str::contains("alice/renamed"));
    ctx.temp_dir
        .child("repositories/alice/renamed.git")
        .assert(predicate::path::is_dir());
    ctx.temp_dir
        .child("repositories/alice/demo.git")
        .assert(predicate::path::missing());

    ctx.run(&["repo", "list", "alice"])
        .success()
        .stdout(predicate::str::contains("alice/renamed [empty]"));
}

#[test]
fn test_repo_transfer_to_organization() {
    let ctx = TestContext::new();
    ctx.run(&["user", "create", "alice"]).success();
    ctx.run(&["user", "create", "bob"]).success();
    ctx.run(&["org", "create", "acme", "--owner", "bob"]).success();
    ctx.run(&["repo", "create", "alice", "tool", "--private"]).success();

    ctx.run(&["access", "show", "alice/tool", "--user", "bob"])
        .success()
        .stdout(predicate::str::diff("none\n"));

    ctx.run(&["repo", "transfer", "alice/tool", "acme"])
        .success()
        .stdout(predicate::str::contains("acme/tool"));
    ctx.temp_dir
        .child("repositories/acme/tool.git")
        .assert(predicate::path::is_dir());

    ctx.run(&["access", "show", "acme/tool", "--user", "bob"])
        .success()
        .stdout(predicate::str::diff("owner\n"));
    ctx.run(&["access", "show", "acme/tool"])
        .success()
        .stdout(predicate::str::contains("bob: owner"));
    ctx.run(&["access", "show", "acme/tool", "--user", "alice"])
        .success()
        .stdout(predicate::str::diff("none\n"));
}

#[test]
fn test_repo_delete_requires_confirmation() {
    let ctx = TestContext::new();
    ctx.run(&["user", "create", "alice"]).success();
    ctx.run(&["repo", "create", "alice", "gone"]).success();

    ctx.run(&["repo", "delete", "alice/gone"])
        .failure()
        .stderr(predicate::str::contains("--yes"));
    assert_eq!(ctx.list_json("alice").len(), 1);

    ctx.run(&["repo", "delete", "alice/gone", "--yes"])
        .success()
        .stdout(predicate::str::contains("Deleted alice/gone"));
    ctx.temp_dir
        .child("repositories/alice/gone.git")
        .assert(predicate::path::missing());
    assert!(ctx.list_json("alice").is_empty());

    ctx.run(&["repo", "delete", "alice/gone", "--yes"])
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_repo_fork_with_initial_commit() {
    let ctx = TestContext::new();
    ctx.run(&["user", "create", "alice"]).success();
    ctx.run(&["user", "create", "bob"]).success();

    ctx.run(&["repo", "create", "alice", "empty"]).success();
    ctx.run(&["repo", "fork", "alice/empty", "--owner", "bob"])
        .failure()
        .stderr(predicate::str::contains("cannot be forked"));

    ctx.run(&["repo", "create", "alice", "lib", "--init", "--license", "MIT"])
        .success();
    ctx.run(&["repo", "fork", "alice/lib", "--owner", "bob"])
        .success()
        .stdout(predicate::str::contains("Forked alice/lib to bob/lib"));

    let forks = ctx.list_json("bob");
    assert_eq!(forks[0]["is_fork"], true);
    ctx.run(&["repo", "list", "bob"])
        .success()
        .stdout(predicate::str::contains("bob/lib [fork]"));
}

#[test]
fn test_maintenance_tasks() {
    let ctx = TestContext::new();
    ctx.run(&["user", "create", "alice"]).success();
    ctx.run(&["repo", "create", "alice", "demo"]).success();

    ctx.run(&["maintenance", "check-stats"])
        .success()
        .stdout(predicate::str::contains("Task check-stats completed"));
    ctx.run(&["maintenance", "sync-hooks"]).success();
    ctx.run(&["maintenance", "defrag"])
        .failure()
        .stderr(predicate::str::contains("unknown task"));

    std::fs::remove_dir_all(ctx.temp_dir.child("repositories/alice/demo.git").path()).unwrap();
    ctx.run(&["maintenance", "reinit-missing"]).success();
    ctx.temp_dir
        .child("repositories/alice/demo.git/HEAD")
        .assert(predicate::path::exists());
}

#[test]
fn test_hook_accepts_ref_updates() {
    let ctx = TestContext::new();
    ctx.cmd()
        .args(["hook", "post-receive"])
        .write_stdin("0000000 1111111 refs/heads/main\n")
        .assert()
        .success();
}

#[test]
fn test_operations_lists_journal() {
    let ctx = TestContext::new();
    ctx.run(&["user", "create", "alice"]).success();
    ctx.run(&["repo", "create", "alice", "demo"]).success();

    ctx.run(&["operations"])
        .success()
        .stdout(predicate::str::contains("No operations"));
    ctx.run(&["operations", "--all"])
        .success()
        .stdout(predicate::str::contains("create\tapplied"));

    let output = ctx
        .cmd()
        .args(["operations", "--all", "--json"])
        .output()
        .unwrap();
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["operations"][0]["kind"], "create");
    assert!(value["notices"].as_array().unwrap().is_empty());
}
