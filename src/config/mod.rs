mod app;

pub use app::{Config, CronConfig, GitConfig, MirrorConfig, RepositoryConfig, SshConfig};
