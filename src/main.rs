use std::fs;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use repoforge::config::Config;
use repoforge::git::InitialFiles;
use repoforge::repo::{CreateRepoOptions, Engine, MaintenanceTask, MigrateRepoOptions, TaskRun};
use repoforge::store::Store;
use repoforge::types::{Repository, User};

#[derive(Parser)]
#[command(name = "repoforge")]
#[command(about = "Repository lifecycle and access-control engine", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, used when no config file is given
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and a default config file
    Init,

    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage organizations
    Org {
        #[command(subcommand)]
        command: OrgCommands,
    },

    /// Manage repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Inspect effective access
    Access {
        #[command(subcommand)]
        command: AccessCommands,
    },

    /// Run a maintenance task
    Maintenance {
        #[arg(value_parser = parse_task)]
        task: MaintenanceTask,
    },

    /// List lifecycle operations that need operator attention, and notices
    Operations {
        /// Include operations whose filesystem side completed
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },

    /// Entry point of installed git hooks
    Hook {
        /// Hook name (pre-receive, update, post-receive)
        name: String,
        /// Arguments passed by git
        args: Vec<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user account
    Create {
        name: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// List user accounts
    List,
}

#[derive(Subcommand)]
enum OrgCommands {
    /// Create an organization owned by an existing user
    Create {
        name: String,
        /// User placed in the Owners team
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Create a repository
    Create {
        /// Owning user or organization
        owner: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        private: bool,
        #[arg(long)]
        unlisted: bool,
        /// Commit an initial README
        #[arg(long)]
        init: bool,
        /// Comma-separated gitignore templates, implies --init
        #[arg(long)]
        gitignores: Option<String>,
        /// License template, implies --init
        #[arg(long)]
        license: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        /// Acting user, defaults to the owner
        #[arg(long)]
        doer: Option<String>,
    },
    /// Fork OWNER/NAME into another namespace
    Fork {
        base: String,
        /// Namespace receiving the fork
        #[arg(long)]
        owner: String,
        /// Name of the fork, defaults to the base name
        #[arg(long)]
        name: Option<String>,
    },
    /// Import a repository from a remote address
    Migrate {
        owner: String,
        name: String,
        remote: String,
        #[arg(long)]
        mirror: bool,
        #[arg(long)]
        private: bool,
    },
    /// Hand OWNER/NAME over to another user or organization
    Transfer { repo: String, new_owner: String },
    /// Rename OWNER/NAME
    Rename { repo: String, new_name: String },
    /// Delete OWNER/NAME and its on-disk tree
    Delete {
        repo: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// List repositories of an owner
    List {
        owner: String,
        #[arg(long)]
        json: bool,
    },
    /// Fetch upstream changes of a mirror
    SyncMirror { repo: String },
}

#[derive(Subcommand)]
enum AccessCommands {
    /// Show the access table of OWNER/NAME, or one user's mode
    Show {
        repo: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn parse_task(s: &str) -> Result<MaintenanceTask, String> {
    MaintenanceTask::parse(s).ok_or_else(|| {
        let names: Vec<&str> = MaintenanceTask::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown task '{s}', expected one of: {}", names.join(", "))
    })
}

fn split_full_name(full: &str) -> anyhow::Result<(&str, &str)> {
    match full.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
        _ => bail!("expected OWNER/NAME, got '{full}'"),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config {
            data_dir: cli.data_dir.clone(),
            ..Config::default()
        },
    };
    config.validate()?;
    Ok(config)
}

fn print_repository(repo: &Repository) {
    let mut flags = Vec::new();
    if repo.is_private {
        flags.push("private");
    }
    if repo.is_mirror {
        flags.push("mirror");
    }
    if repo.is_fork {
        flags.push("fork");
    }
    if repo.is_bare {
        flags.push("empty");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    println!("{}{flags}", repo.full_name());
}

fn run_init(config: &Config) -> anyhow::Result<()> {
    let engine = Engine::open(config.clone())?;
    let config_path = config.config_path_for_hooks();
    if !config_path.exists() {
        let rendered = toml::to_string_pretty(config).context("render default config")?;
        fs::write(&config_path, rendered)
            .with_context(|| format!("write {}", config_path.display()))?;
    }
    println!("Database: {}", engine.config().db_path().display());
    println!("Config:   {}", config_path.display());
    Ok(())
}

fn run_hook(config: &Config, name: &str, args: &[String]) -> anyhow::Result<()> {
    let git_dir = std::env::var("GIT_DIR").unwrap_or_else(|_| ".".to_string());
    let root = config.repository_root();
    info!(hook = name, git_dir = %git_dir, root = %root.display(), "hook invoked");

    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        for line in stdin.lock().lines() {
            let line = line?;
            let mut parts = line.split_whitespace();
            if let (Some(old), Some(new), Some(refname)) = (parts.next(), parts.next(), parts.next()) {
                info!(hook = name, %old, %new, %refname, "ref update");
            }
        }
    }
    if let [refname, old, new] = args {
        info!(hook = name, %old, %new, %refname, "ref update");
    }
    Ok(())
}

fn run_operations(engine: &Engine, all: bool, json: bool) -> anyhow::Result<()> {
    let operations = engine.store().list_operations(!all)?;
    let notices = engine.store().list_notices()?;
    if json {
        let out = serde_json::json!({ "operations": operations, "notices": notices });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("No operations");
    }
    for op in &operations {
        let detail = match (&op.step, &op.error) {
            (Some(step), Some(error)) => format!("\t{step}: {error}"),
            (None, Some(error)) => format!("\t{error}"),
            _ => String::new(),
        };
        println!(
            "#{}\trepo {}\t{}\t{}{detail}",
            op.id,
            op.repo_id,
            op.kind.as_str(),
            op.phase.as_str()
        );
    }
    for notice in &notices {
        println!("notice: {}", notice.description);
    }
    Ok(())
}

fn confirm_delete(full_name: &str) -> anyhow::Result<bool> {
    let answer = inquire::Confirm::new(&format!(
        "Delete {full_name} and everything in it? This cannot be undone."
    ))
    .with_default(false)
    .prompt()?;
    Ok(answer)
}

async fn run_repo(engine: &Engine, command: RepoCommands) -> anyhow::Result<()> {
    match command {
        RepoCommands::Create {
            owner,
            name,
            description,
            private,
            unlisted,
            init,
            gitignores,
            license,
            branch,
            doer,
        } => {
            let owner = engine.get_user_by_name(&owner)?;
            let doer: User = match doer {
                Some(d) => engine.get_user_by_name(&d)?,
                None => owner.clone(),
            };
            let auto_init = (init || gitignores.is_some() || license.is_some()).then(|| InitialFiles {
                gitignores: gitignores.unwrap_or_default(),
                license: license.unwrap_or_default(),
                ..InitialFiles::default()
            });
            let repo = engine
                .create_repository(
                    &doer,
                    &owner,
                    CreateRepoOptions {
                        name,
                        description,
                        is_private: private,
                        is_unlisted: unlisted,
                        is_mirror: false,
                        auto_init,
                        default_branch: branch,
                    },
                )
                .await?;
            println!("Created {}", repo.full_name());
        }
        RepoCommands::Fork { base, owner, name } => {
            let (base_owner, base_name) = split_full_name(&base)?;
            let base = engine.get_repository(base_owner, base_name)?;
            let owner = engine.get_user_by_name(&owner)?;
            let name = name.unwrap_or_else(|| base.name.clone());
            let fork = engine
                .fork_repository(&owner, &owner, &base, &name, &base.description)
                .await?;
            println!("Forked {} to {}", base.full_name(), fork.full_name());
        }
        RepoCommands::Migrate {
            owner,
            name,
            remote,
            mirror,
            private,
        } => {
            let owner = engine.get_user_by_name(&owner)?;
            let repo = engine
                .migrate_repository(
                    &owner,
                    &owner,
                    MigrateRepoOptions {
                        name,
                        is_private: private,
                        is_mirror: mirror,
                        remote_addr: remote,
                        ..Default::default()
                    },
                )
                .await?;
            println!("Migrated {}", repo.full_name());
        }
        RepoCommands::Transfer { repo, new_owner } => {
            let (owner, name) = split_full_name(&repo)?;
            let repo = engine.get_repository(owner, name)?;
            let doer = engine.get_user_by_name(owner)?;
            let moved = engine.transfer_ownership(&doer, &new_owner, &repo).await?;
            println!("Transferred {owner}/{name} to {}", moved.full_name());
        }
        RepoCommands::Rename { repo, new_name } => {
            let (owner, name) = split_full_name(&repo)?;
            let owner = engine.get_user_by_name(owner)?;
            let renamed = engine
                .rename_repository(&owner, &owner, name, &new_name)
                .await?;
            println!("Renamed to {}", renamed.full_name());
        }
        RepoCommands::Delete { repo, yes } => {
            let (owner, name) = split_full_name(&repo)?;
            let target = engine.get_repository(owner, name)?;
            if !yes {
                if !std::io::stdin().is_terminal() {
                    bail!("refusing to delete {} without --yes in a non-interactive session", target.full_name());
                }
                if !confirm_delete(&target.full_name())? {
                    println!("Aborted");
                    return Ok(());
                }
            }
            engine.delete_repository(target.owner_id, target.id).await?;
            println!("Deleted {}", target.full_name());
        }
        RepoCommands::List { owner, json } => {
            let owner = engine.get_user_by_name(&owner)?;
            let mut list = repoforge::repo::RepositoryList::from(
                engine.store().list_owner_repositories(owner.id)?,
            );
            engine.store().read(|c| list.load_attributes(c))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&list.0)?);
            } else if list.is_empty() {
                println!("No repositories");
            } else {
                for repo in &list.0 {
                    print_repository(repo);
                }
            }
        }
        RepoCommands::SyncMirror { repo } => {
            let (owner, name) = split_full_name(&repo)?;
            let repo = engine.get_repository(owner, name)?;
            let mirror = engine.sync_mirror(repo.id).await?;
            println!("Synced {}, next sync at {}", repo.full_name(), mirror.next_sync_at);
        }
    }
    Ok(())
}

fn run_access(engine: &Engine, command: AccessCommands) -> anyhow::Result<()> {
    let AccessCommands::Show { repo, user, json } = command;
    let (owner, name) = split_full_name(&repo)?;
    let repo = engine.get_repository(owner, name)?;

    if let Some(user) = user {
        let user = engine.get_user_by_name(&user)?;
        let mode = engine.access_mode(Some(&user), &repo)?;
        println!("{mode}");
        return Ok(());
    }

    let accesses = engine.store().list_accesses(repo.id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&accesses)?);
        return Ok(());
    }
    println!("{}: owner {owner}", repo.full_name());
    for access in accesses {
        let name = engine
            .store()
            .get_user(access.user_id)?
            .map(|u| u.name)
            .unwrap_or_else(|| format!("#{}", access.user_id));
        println!("  {name}: {}", access.mode);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("repoforge=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init => run_init(&config)?,
        Commands::Hook { name, args } => run_hook(&config, &name, &args)?,
        Commands::User { command } => {
            let engine = Engine::open(config)?;
            match command {
                UserCommands::Create { name, email } => {
                    let user = engine.create_user(&name, &email)?;
                    println!("Created user '{}' (id {})", user.name, user.id);
                }
                UserCommands::List => {
                    for user in engine.store().list_users()? {
                        let kind = if user.is_organization() { "org" } else { "user" };
                        println!("{}\t{kind}\t{} repositories", user.name, user.num_repos);
                    }
                }
            }
        }
        Commands::Org { command } => {
            let engine = Engine::open(config)?;
            let OrgCommands::Create { name, owner } = command;
            let owner = engine.get_user_by_name(&owner)?;
            let org = engine.create_organization(&owner, &name)?;
            println!("Created organization '{}' owned by '{}'", org.name, owner.name);
        }
        Commands::Repo { command } => run_repo(&Engine::open(config)?, command).await?,
        Commands::Access { command } => run_access(&Engine::open(config)?, command)?,
        Commands::Operations { all, json } => run_operations(&Engine::open(config)?, all, json)?,
        Commands::Maintenance { task } => match Engine::open(config)?.run_maintenance(task).await? {
            TaskRun::Completed => println!("Task {task} completed"),
            TaskRun::Skipped => println!("Task {task} is already running"),
        },
    }

    Ok(())
}
