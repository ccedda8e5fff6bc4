//! # repoforge
//!
//! Repository lifecycle and access-control engine for a self-hosted git
//! service, usable both as a standalone binary and as a library.
//!
//! Repository rows and their on-disk bare repositories are kept in step
//! across create, fork, migrate, rename, transfer and delete, and the
//! effective access of every user on every repository is maintained as a
//! materialized table.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use repoforge::config::Config;
//! use repoforge::repo::{CreateRepoOptions, Engine};
//!
//! let engine = Engine::open(Config::load("repoforge.toml")?)?;
//! let alice = engine.create_user("alice", "alice@example.com")?;
//! let repo = engine
//!     .create_repository(&alice, &alice, CreateRepoOptions {
//!         name: "demo".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): builds the `repoforge` binary.

pub mod access;
pub mod config;
pub mod error;
pub mod git;
pub mod repo;
pub mod store;
pub mod sync;
pub mod types;
