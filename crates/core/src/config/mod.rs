//! Configuration system for uniresolve
//!
//! This module provides the core configuration with:
//! - Type-safe config structs via serde
//! - TOML file format
//! - Auto-generation of default configs
//! - Manual reload capability
//!
//! # Example
//!
//! ```toml
//! version = 1
//! debug = false
//!
//! [runtime]
//! mono_modules = ["mono-2.0-bdwgc.dll", "mono.dll"]
//! il2cpp_modules = ["GameAssembly.dll"]
//! attach_attempts = 5
//! attach_delay_ms = 5000
//!
//! [dump]
//! on_init = true
//! ```

mod loader;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uniresolve_engine::RetryPolicy;
use uniresolve_sdk::exports::{IL2CPP_MODULES, MONO_MODULES};

use crate::context::InitOptions;

pub use loader::{
    configs_dir, core_config_path, default_dump_dir, uniresolve_base_dir, HOME_ENV,
};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Could not determine config directory from host location
    #[error("Config directory not available - could not resolve host base path")]
    NoConfigDirectory,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Mono module names, probed first
    pub mono_modules: Vec<String>,

    /// IL2Cpp module names, probed after Mono
    pub il2cpp_modules: Vec<String>,

    /// Module lookup attempts before giving up
    pub attach_attempts: u32,

    /// Delay between module lookup attempts
    pub attach_delay_ms: u64,

    /// IL2Cpp VM readiness polls before giving up
    pub vm_wait_attempts: u32,

    /// Delay between VM readiness polls
    pub vm_wait_delay_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            mono_modules: MONO_MODULES.iter().map(|s| s.to_string()).collect(),
            il2cpp_modules: IL2CPP_MODULES.iter().map(|s| s.to_string()).collect(),
            attach_attempts: 5,
            attach_delay_ms: 5000,
            vm_wait_attempts: 500,
            vm_wait_delay_ms: 10,
        }
    }
}

/// Metadata dump settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpSection {
    /// Dump metadata once the walk completes
    pub on_init: bool,

    /// Output directory; `<base>/dump` when unset
    pub directory: Option<PathBuf>,
}

/// Core configuration.
///
/// This config controls runtime discovery and is loaded from:
/// `<base>/configs/core.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    pub runtime: RuntimeSection,

    pub dump: DumpSection,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debug: false,
            runtime: RuntimeSection::default(),
            dump: DumpSection::default(),
        }
    }
}

impl CoreConfig {
    /// Load core config from file, creating default if missing.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&core_config_path()?)
    }

    /// Save core config to file.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&core_config_path()?)
    }

    /// Reload core config from file.
    pub fn reload(&mut self) -> ConfigResult<()> {
        let path = core_config_path()?;
        let content = std::fs::read_to_string(&path)?;
        *self = toml::from_str(&content)?;
        tracing::debug!("Reloaded core config from {:?}", path);
        Ok(())
    }

    /// Load from an explicit path, creating a default file if missing.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded core config from {:?}", path);
            Ok(config)
        } else {
            let default = Self::default();
            default.save_to(path)?;
            tracing::info!("Created default core config at {:?}", path);
            Ok(default)
        }
    }

    /// Save to an explicit path.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved core config to {:?}", path);
        Ok(())
    }

    /// Retry schedule for locating the runtime module
    pub fn attach_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.runtime.attach_attempts,
            Duration::from_millis(self.runtime.attach_delay_ms),
        )
    }

    /// Options for [`crate::RuntimeContext::init`]
    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            vm_wait: RetryPolicy::new(
                self.runtime.vm_wait_attempts,
                Duration::from_millis(self.runtime.vm_wait_delay_ms),
            ),
        }
    }

    /// Directory for metadata dumps
    pub fn dump_dir(&self) -> ConfigResult<PathBuf> {
        match &self.dump.directory {
            Some(dir) => Ok(dir.clone()),
            None => default_dump_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_config_default() {
        let config = CoreConfig::default();
        assert_eq!(config.version, 1);
        assert!(!config.debug);
        assert!(!config.runtime.mono_modules.is_empty());
        assert!(!config.runtime.il2cpp_modules.is_empty());
        assert!(!config.dump.on_init);
    }

    #[test]
    fn test_core_config_serialize() {
        let mut config = CoreConfig::default();
        config.version = 2;
        config.debug = true;
        config.runtime.attach_attempts = 9;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("version = 2"));
        assert!(toml_str.contains("debug = true"));
        assert!(toml_str.contains("[runtime]"));
        assert!(toml_str.contains("attach_attempts = 9"));

        let parsed: CoreConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: CoreConfig = toml::from_str(
            r#"
            debug = true

            [runtime]
            il2cpp_modules = ["libil2cpp.so"]
            vm_wait_delay_ms = 50
            "#,
        )
        .unwrap();
        assert!(config.debug);
        assert_eq!(config.runtime.il2cpp_modules, ["libil2cpp.so"]);
        assert_eq!(config.runtime.attach_attempts, 5);
        assert_eq!(
            config.init_options().vm_wait,
            RetryPolicy::new(500, Duration::from_millis(50))
        );
        assert_eq!(
            config.attach_policy(),
            RetryPolicy::new(5, Duration::from_secs(5))
        );
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = std::env::temp_dir().join(format!("uniresolve-config-{}", std::process::id()));
        let path = dir.join("configs").join("core.toml");
        let _ = std::fs::remove_dir_all(&dir);

        let created = CoreConfig::load_from(&path).unwrap();
        assert_eq!(created, CoreConfig::default());
        assert!(path.exists());

        let mut changed = created.clone();
        changed.dump.on_init = true;
        changed.dump.directory = Some(dir.join("out"));
        changed.save_to(&path).unwrap();
        let loaded = CoreConfig::load_from(&path).unwrap();
        assert_eq!(loaded, changed);
        assert_eq!(loaded.dump_dir().unwrap(), dir.join("out"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
