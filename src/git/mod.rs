//! Thin wrappers over the `git` command line and the on-disk repository layout.

pub mod hooks;
pub mod init;
pub mod local_copy;
pub mod process;
pub mod templates;

pub use init::{InitialFiles, Signature};
pub use local_copy::sync_local_copy;
pub use process::{CloneOptions, GitCommand};
