//! Locating and loading the configuration file.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use mailwatch_common::config::Config;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MAILWATCH_CONFIG";

const DEFAULT_PATHS: [&str; 2] = [
    "./mailwatch.config.ron",
    "/etc/mailwatch/mailwatch.config.ron",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{} points to non-existent file: {}", .origin, .path.display())]
    Missing { origin: &'static str, path: PathBuf },

    #[error("No configuration file found. Tried:\n  - MAILWATCH_CONFIG environment variable\n{}", list(.tried))]
    NotFound { tried: Vec<PathBuf> },

    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

fn list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the configuration file using the following precedence:
/// 1. `explicit` (the `--config` flag)
/// 2. `MAILWATCH_CONFIG` environment variable
/// 3. ./mailwatch.config.ron (current working directory)
/// 4. /etc/mailwatch/mailwatch.config.ron (system-wide config)
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let defaults = DEFAULT_PATHS.map(PathBuf::from);
    locate(explicit, std::env::var_os(CONFIG_ENV), &defaults)
}

fn locate(
    explicit: Option<&Path>,
    from_env: Option<OsString>,
    defaults: &[PathBuf],
) -> Result<PathBuf, ConfigError> {
    let chosen = explicit
        .map(|path| ("--config", path.to_path_buf()))
        .or_else(|| from_env.map(|path| (CONFIG_ENV, PathBuf::from(path))));

    if let Some((origin, path)) = chosen {
        return if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::Missing { origin, path })
        };
    }

    defaults
        .iter()
        .find(|path| path.exists())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound {
            tried: defaults.to_vec(),
        })
}

/// Reads and parses `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
