//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - raceharness.toml (default configuration)
//! - raceharness.local.toml (git-ignored local overrides)
//! - Environment variables (RACEHARNESS_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # raceharness.toml
//! [tools]
//! ltsmin = "/opt/ltsmin"
//! pins_stir = "/opt/pins-stir"
//!
//! [codegen]
//! default_encoding = "executable"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RACEHARNESS_TOOLS__LTSMIN=/custom/path
//! RACEHARNESS_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub codegen: CodegenConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Paths to the external model-checker tool chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory containing `bin/pins2lts-seq`.
    pub ltsmin: Option<PathBuf>,
    /// Directory containing `libpins-stir.so` and `stir-bin-export`.
    pub pins_stir: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        ToolsConfig {
            ltsmin: None,
            pins_stir: None,
        }
    }
}

/// Codegen defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenConfig {
    #[serde(default = "default_encoding")]
    pub default_encoding: String,
    #[serde(default)]
    pub embed_header: bool,
}

fn default_encoding() -> String {
    "executable".to_string()
}

impl Default for CodegenConfig {
    fn default() -> Self {
        CodegenConfig {
            default_encoding: default_encoding(),
            embed_header: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. raceharness.toml (base configuration)
    /// 2. raceharness.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (RACEHARNESS_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("raceharness.toml"))
            .merge(Toml::file("raceharness.local.toml"))
            .merge(Env::prefixed("RACEHARNESS_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &std::path::Path) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RACEHARNESS_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tools: ToolsConfig::default(),
            codegen: CodegenConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_executable_encoding() {
        let config = Config::default();
        assert_eq!(config.codegen.default_encoding, "executable");
        assert!(!config.codegen.embed_header);
    }

    #[test]
    fn default_config_serializes_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[codegen]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn load_from_file_applies_env_override() {
        std::env::set_var("RACEHARNESS_LOGGING__LEVEL", "trace");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raceharness.toml");
        std::fs::write(&path, "[tools]\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.logging.level, "trace");
        std::env::remove_var("RACEHARNESS_LOGGING__LEVEL");
    }
}
