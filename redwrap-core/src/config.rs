//! Credential lookup in the `praw.ini` file shared with other Reddit tooling.
//!
//! The file lives in the first of `%APPDATA%`, `$XDG_CONFIG_HOME` or
//! `$HOME/.config` that is set, and holds one section per account:
//!
//! ```ini
//! [my_bot]
//! client_id = ...
//! client_secret = ...
//! refresh_token = ...
//! ```
//!
//! A prefix selects an alternate credential set in the same section, e.g.
//! prefix `beta` reads `beta_client_id`.

use crate::error::ConfigError;
use ini::Ini;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "praw.ini";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Resolves the config file location from the process environment.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    config_path_from(|name| std::env::var(name).ok())
}

/// Resolves the config file location using `lookup` for environment variables.
pub fn config_path_from<F>(lookup: F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let base = if let Some(app_data) = lookup("APPDATA") {
        PathBuf::from(app_data)
    } else if let Some(xdg) = lookup("XDG_CONFIG_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = lookup("HOME") {
        PathBuf::from(home).join(".config")
    } else {
        return Err(ConfigError::NoConfigDirectory);
    };
    Ok(base.join(CONFIG_FILE_NAME))
}

/// Loads the credentials for `account` from the default config location.
pub fn load_credentials(
    account: &str,
    prefix: Option<&str>,
) -> Result<RedditCredentials, ConfigError> {
    let path = config_path()?;
    load_credentials_from(&path, account, prefix)
}

pub fn load_credentials_from(
    path: &Path,
    account: &str,
    prefix: Option<&str>,
) -> Result<RedditCredentials, ConfigError> {
    debug!("Reading credentials for {} from {}", account, path.display());
    let config = read_config(path)?;

    let prefix = match prefix {
        Some(prefix) => format!("{prefix}_"),
        None => String::new(),
    };

    Ok(RedditCredentials {
        client_id: config_var(&config, account, &format!("{prefix}client_id"))?,
        client_secret: config_var(&config, account, &format!("{prefix}client_secret"))?,
        refresh_token: config_var(&config, account, &format!("{prefix}refresh_token"))?,
    })
}

fn read_config(path: &Path) -> Result<Ini, ConfigError> {
    Ini::load_from_file(path).map_err(|e| match e {
        ini::Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
        }
        other => ConfigError::InvalidFormat {
            path: path.display().to_string(),
            details: other.to_string(),
        },
    })
}

fn config_var(config: &Ini, section: &str, variable: &str) -> Result<String, ConfigError> {
    let properties = config
        .section(Some(section))
        .ok_or_else(|| ConfigError::MissingSection {
            section: section.to_string(),
        })?;

    properties
        .get(variable)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingField {
            section: section.to_string(),
            field: variable.to_string(),
        })
}
