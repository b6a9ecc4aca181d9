//! CLI configuration: thin wrapper around `thingsync_config`.
//!
//! Adds the `--config` and `--token` overrides from `GlobalOpts` on top of
//! the shared loading and credential resolution.

use std::path::PathBuf;

use secrecy::SecretString;

use thingsync_api::SmartThingsClient;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use thingsync_config::{
    Config, InstallationEntry, TomlInstallationStore, load_file, remove_installation,
    save_config, store_token, update_config,
};

/// Config file path: `--config` / `THINGSYNC_CONFIG`, else the platform default.
pub fn resolve_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(thingsync_config::config_path)
}

/// Load the effective config (defaults, file, environment).
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(thingsync_config::load_config(&resolve_path(global))?)
}

/// Resolve the personal access token; the `--token` flag wins.
pub fn resolve_token(global: &GlobalOpts, cfg: &Config) -> Result<SecretString, CliError> {
    if let Some(ref token) = global.token {
        return Ok(SecretString::from(token.clone()));
    }
    thingsync_config::resolve_token(&cfg.api).map_err(|e| match e {
        thingsync_config::ConfigError::NoCredentials => CliError::NoCredentials {
            path: resolve_path(global).display().to_string(),
        },
        other => other.into(),
    })
}

/// API client authenticated with the personal access token.
pub fn token_client(global: &GlobalOpts, cfg: &Config) -> Result<SmartThingsClient, CliError> {
    let token = resolve_token(global, cfg)?;
    Ok(cfg.api_settings().client(&token)?)
}

/// API client authenticated with the token recorded for an installation.
pub fn installation_client(
    cfg: &Config,
    entry: &InstallationEntry,
) -> Result<SmartThingsClient, CliError> {
    let token = SecretString::from(entry.access_token.clone());
    Ok(cfg.api_settings().client(&token)?)
}

/// Recorded installations, optionally narrowed to one installed app.
pub fn select_installations<'a>(
    cfg: &'a Config,
    installed_app_id: Option<&str>,
) -> Result<Vec<(&'a str, &'a InstallationEntry)>, CliError> {
    if cfg.installations.is_empty() {
        return Err(CliError::NoInstallations);
    }
    match installed_app_id {
        Some(id) => cfg
            .installation_for(id)
            .map(|found| vec![found])
            .ok_or_else(|| CliError::NotFound {
                resource_type: "installation".into(),
                identifier: id.into(),
                list_command: "installations list".into(),
            }),
        None => Ok(cfg
            .installations
            .iter()
            .map(|(id, entry)| (id.as_str(), entry))
            .collect()),
    }
}
