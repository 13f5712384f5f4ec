use std::path::PathBuf;

use clap::{ArgAction, Parser};
use odfs_contents_local::LocalFsConfig;
use odfs_contents_manager::{ManagerConfig, DEFAULT_CHECKPOINT_DIR};

/// Configuration for the odfs-contents-server.
#[derive(Parser, Debug, Clone)]
#[command(name = "odfs-contents-server")]
#[command(about = "Jupyter contents API over a OnedataFS mount")]
pub struct Config {
    /// TCP host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "CONTENTS_HOST")]
    pub host: String,

    /// TCP port to bind to
    #[arg(long, default_value = "8888", env = "CONTENTS_PORT")]
    pub port: u16,

    /// Mount point of the filesystem (defaults to the home directory)
    #[arg(long, env = "CONTENTS_ROOT")]
    pub root: Option<PathBuf>,

    /// Space to serve, relative to the root
    #[arg(long, env = "CONTENTS_SPACE")]
    pub space: Option<String>,

    /// Directory inside the space to use as the API root
    #[arg(long, env = "CONTENTS_PATH")]
    pub path: Option<String>,

    /// Name of the hidden per-directory checkpoint directory
    #[arg(long, default_value = DEFAULT_CHECKPOINT_DIR, env = "CONTENTS_CHECKPOINT_DIR")]
    pub checkpoint_dir: String,

    /// Create the API root if it does not exist
    #[arg(long, env = "CONTENTS_CREATE_ROOT")]
    pub create_root: bool,

    /// Truncate files before writing saved content
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        env = "CONTENTS_TRUNCATE_FILE_WRITES"
    )]
    pub truncate_file_writes: bool,

    /// Secret used to sign trusted notebooks
    #[arg(long, env = "CONTENTS_SIGNING_SECRET", hide_env_values = true)]
    pub signing_secret: Option<String>,
}

impl Config {
    /// Directory served as the API root: `root/space/path`.
    pub fn effective_root(&self) -> PathBuf {
        let mut root = self
            .root
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"));
        for segment in [&self.space, &self.path].into_iter().flatten() {
            let relative = segment.trim_matches('/');
            if !relative.is_empty() {
                root.push(relative);
            }
        }
        root
    }

    pub fn local_fs_config(&self) -> LocalFsConfig {
        LocalFsConfig::new(self.effective_root()).with_create_root(self.create_root)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        let config = ManagerConfig::default()
            .with_checkpoint_dir(self.checkpoint_dir.clone())
            .with_truncate_file_writes(self.truncate_file_writes);
        match &self.signing_secret {
            Some(secret) => config.with_signing_secret(secret.as_bytes()),
            None => config,
        }
    }
}
