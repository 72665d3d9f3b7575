//! Playbook directory and configuration resolution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use playbook_core::PlaybookConfig;
use playbook_core::config::CONFIG_FILE_NAME;

/// Environment variable naming the playbook directory.
pub const DIR_ENV: &str = "PLAYBOOK_DIR";

/// Directory used when neither `--dir` nor `PLAYBOOK_DIR` is set.
pub const DEFAULT_DIR: &str = ".playbook";

/// Resolves the playbook directory.
///
/// Precedence:
/// 1. `--dir`
/// 2. `PLAYBOOK_DIR`
/// 3. `./.playbook`
pub fn resolve_dir(arg: Option<PathBuf>) -> PathBuf {
    arg.or_else(|| std::env::var_os(DIR_ENV).filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR))
}

/// Everything a command needs to open the playbook.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub dir: PathBuf,
    pub config: PlaybookConfig,
    /// Config file that was loaded, if any.
    pub config_path: Option<PathBuf>,
}

impl CliContext {
    /// Loads the configuration for an existing playbook directory.
    ///
    /// Configuration precedence:
    /// 1. `--config`
    /// 2. `<dir>/playbook.toml`
    /// 3. Defaults tuned for the hashing embedder
    pub fn load(dir: PathBuf, config_path: Option<&Path>) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("No playbook found at {}. Run 'pbk init' first.", dir.display());
        }

        let candidate = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(dir.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };

        let config = match &candidate {
            Some(path) => PlaybookConfig::load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => PlaybookConfig::for_hashing_embedder(),
        };

        Ok(Self { dir, config, config_path: candidate })
    }
}
