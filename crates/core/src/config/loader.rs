//! Config path resolution
//!
//! Handles resolving paths for configuration files based on the host's
//! location, or an explicit `UNIRESOLVE_HOME` override.

use std::path::{Path, PathBuf};

use super::{ConfigError, ConfigResult};

/// Environment variable overriding the base directory
pub const HOME_ENV: &str = "UNIRESOLVE_HOME";

/// Returns the uniresolve base directory.
///
/// `$UNIRESOLVE_HOME` if set, otherwise a `uniresolve/` directory next to the
/// host executable:
/// `<game dir>/Game.exe` -> `<game dir>/uniresolve/`
pub fn uniresolve_base_dir() -> ConfigResult<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    let exe = std::env::current_exe().map_err(ConfigError::IoError)?;
    base_dir_for(&exe).ok_or(ConfigError::NoConfigDirectory)
}

fn base_dir_for(exe: &Path) -> Option<PathBuf> {
    exe.parent().map(|dir| dir.join("uniresolve"))
}

/// Returns the configs directory.
///
/// Path: `<base>/configs/`
pub fn configs_dir() -> ConfigResult<PathBuf> {
    Ok(uniresolve_base_dir()?.join("configs"))
}

/// Returns the core config path.
///
/// Path: `<base>/configs/core.toml`
pub fn core_config_path() -> ConfigResult<PathBuf> {
    Ok(configs_dir()?.join("core.toml"))
}

/// Returns the default dump output directory.
///
/// Path: `<base>/dump/`
pub fn default_dump_dir() -> ConfigResult<PathBuf> {
    Ok(uniresolve_base_dir()?.join("dump"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_dir_next_to_executable() {
        let exe = PathBuf::from("/games/Sample/Sample.x86_64");
        assert_eq!(
            base_dir_for(&exe).unwrap(),
            PathBuf::from("/games/Sample/uniresolve")
        );
    }

    #[test]
    fn test_core_config_under_base() {
        // resolution is env-dependent; only the suffix is stable
        let path = core_config_path().unwrap();
        assert!(path.ends_with("configs/core.toml"));
    }
}
