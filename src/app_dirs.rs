//! Where trackbreak keeps its settings and logs.
//!
//! Everything lives under one `.trackbreak` folder inside the OS config
//! directory. `TRACKBREAK_CONFIG_HOME` replaces the OS directory, which tests
//! and portable installs rely on.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

/// Folder created under the config base directory.
pub const APP_DIR_NAME: &str = ".trackbreak";
/// Environment variable overriding the config base directory.
pub const CONFIG_HOME_ENV: &str = "TRACKBREAK_CONFIG_HOME";

const LOGS_DIR_NAME: &str = "logs";

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No config directory available for trackbreak files")]
    NoBaseDir,
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The `.trackbreak` root, created on first use.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = config_base_dir().ok_or(AppDirError::NoBaseDir)?;
    ensure_dir(base.join(APP_DIR_NAME))
}

/// Log directory inside the root, created on first use.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join(LOGS_DIR_NAME))
}

fn config_base_dir() -> Option<PathBuf> {
    base_dir_from(std::env::var_os(CONFIG_HOME_ENV).map(PathBuf::from))
}

fn base_dir_from(env_override: Option<PathBuf>) -> Option<PathBuf> {
    env_override
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    create(&path)?;
    Ok(path)
}

fn create(path: &Path) -> Result<(), AppDirError> {
    std::fs::create_dir_all(path).map_err(|source| AppDirError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
