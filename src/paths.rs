//! Location of the configuration directory and the files watched in it.

use crate::error::{ReloadError, Result};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the install directory.
pub const INSTALL_DIR_ENV: &str = "HOTSWAP_INSTALL_DIR";

/// Install directory name used under the home directory.
pub const DEFAULT_INSTALL_DIR_NAME: &str = ".hotswap";

/// Name of the configuration directory inside the install directory.
pub const CONFIG_DIR_NAME: &str = "config";

/// File extension of connection configuration files.
pub const CONFIG_EXTENSION: &str = "toml";

/// Resolve the install directory.
///
/// `$HOTSWAP_INSTALL_DIR` wins when set and non-empty; otherwise
/// `<home>/.hotswap` is used.
///
/// # Errors
///
/// Returns an error if neither the variable nor a home directory is available.
pub fn install_dir() -> Result<PathBuf> {
    let from_env = std::env::var_os(INSTALL_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    resolve_install_dir(from_env, dirs::home_dir())
}

fn resolve_install_dir(from_env: Option<PathBuf>, home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = from_env {
        return Ok(dir);
    }
    home.map(|h| h.join(DEFAULT_INSTALL_DIR_NAME)).ok_or_else(|| {
        ReloadError::Other(format!(
            "Unable to resolve install directory: set {} or a home directory",
            INSTALL_DIR_ENV
        ))
    })
}

/// Configuration directory below an install directory.
pub fn config_dir_in(install_dir: &Path) -> PathBuf {
    install_dir.join(CONFIG_DIR_NAME)
}

/// Resolve the configuration directory and create it if it does not exist.
///
/// # Errors
///
/// Returns an error if the directory cannot be resolved or created.
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir_in(&install_dir()?);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_wins_over_home() {
        let dir = resolve_install_dir(
            Some(PathBuf::from("/opt/hotswap")),
            Some(PathBuf::from("/home/me")),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/opt/hotswap"));
    }

    #[test]
    fn test_home_fallback() {
        let dir = resolve_install_dir(None, Some(PathBuf::from("/home/me"))).unwrap();
        assert_eq!(dir, PathBuf::from("/home/me/.hotswap"));
        assert_eq!(config_dir_in(&dir), PathBuf::from("/home/me/.hotswap/config"));
    }

    #[test]
    fn test_unresolvable() {
        assert!(resolve_install_dir(None, None).is_err());
    }
}
