//! Path resolution for rigger
//!
//! # Environment Variables
//!
//! - `RIGGER_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/rigger`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `RIGGER_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/rigger` (if set)
//! 3. `~/.config/rigger`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "RIGGER_CONFIG_DIR";

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Default dsh groups directory
pub const DEFAULT_DSH_GROUPS: &str = "~/.dsh/group";

/// Get the rigger config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir();
    resolve_config_dir(
        std::env::var(ENV_CONFIG_DIR).ok().as_deref(),
        std::env::var("XDG_CONFIG_HOME").ok().as_deref(),
        home.as_deref(),
    )
}

/// Get the config file path
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

fn resolve_config_dir(
    override_dir: Option<&str>,
    xdg_config: Option<&str>,
    home: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        let path = expand(dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Some(xdg) = xdg_config.filter(|d| !d.is_empty()) {
        let path = PathBuf::from(xdg).join("rigger");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = home.context("Could not determine home directory")?;
    Ok(home.join(".config").join("rigger"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unresolvable variables leave the path as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        let dir = resolve_config_dir(Some("/etc/rigger"), Some("/xdg"), Some(Path::new("/home/me")))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/etc/rigger"));
    }

    #[test]
    fn test_xdg_then_home() {
        let dir = resolve_config_dir(None, Some("/xdg"), Some(Path::new("/home/me"))).unwrap();
        assert_eq!(dir, PathBuf::from("/xdg/rigger"));

        let dir = resolve_config_dir(Some(""), None, Some(Path::new("/home/me"))).unwrap();
        assert_eq!(dir, PathBuf::from("/home/me/.config/rigger"));
    }

    #[test]
    fn test_no_home() {
        assert!(resolve_config_dir(None, None, None).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand("~/x"), home.join("x"));
        }
        assert_eq!(expand("/plain/path"), PathBuf::from("/plain/path"));
    }
}
