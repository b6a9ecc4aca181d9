//! Configuration for thingsync.
//!
//! One TOML file holds the API and webhook settings, this deployment's
//! endpoint identity, and every completed installation. Loading merges
//! defaults, the file, and `THINGSYNC_`-prefixed environment variables
//! (nested keys separated by `__`, e.g. `THINGSYNC_WEBHOOK__PUBLIC_URL`).
//! Writes always go through a temp file and a rename, so readers never see
//! a half-written file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use thingsync_api::{DEFAULT_BASE_URL, TlsMode, TransportConfig};
use thingsync_core::{
    ApiSettings, AppProfile, Capability, CoreError, EndpointConfig, InstallationRecord,
    InstallationStore, InstalledAppContext, SyncSettings,
};

/// Keyring service all secrets are stored under.
pub const KEYRING_SERVICE: &str = "thingsync";
const KEYRING_TOKEN_USER: &str = "access-token";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured")]
    NoCredentials,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub webhook: WebhookSection,

    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub sync: SyncSection,

    /// Completed installations keyed by entry id.
    #[serde(default)]
    pub installations: BTreeMap<String, InstallationEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Extra CA certificate to trust (PEM).
    pub ca_cert: Option<PathBuf>,

    /// Personal access token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
            ca_cert: None,
            token: None,
            token_env: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WebhookSection {
    /// Externally reachable base URL, e.g. `https://hub.example.net`.
    pub public_url: Option<String>,

    /// Local address the webhook server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Generated on first use; identifies app registrations we own.
    pub instance_id: Option<String>,

    /// Generated on first use; last segment of the webhook URL.
    pub webhook_id: Option<String>,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            public_url: None,
            bind: default_bind(),
            instance_id: None,
            webhook_id: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AppSection {
    pub display_name: String,
    pub description: String,
    pub oauth_client_name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        let profile = AppProfile::default();
        Self {
            display_name: profile.display_name,
            description: profile.description,
            oauth_client_name: profile.oauth_client_name,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SyncSection {
    /// Seconds between periodic reconciliation passes.
    #[serde(default = "default_interval")]
    pub interval: u64,

    #[serde(default = "default_warning_limit")]
    pub warning_limit: usize,

    /// Capabilities never subscribed, on top of the built-in list.
    #[serde(default)]
    pub ignored_capabilities: Vec<String>,

    /// Consecutive failed passes before a capability is escalated.
    #[serde(default = "default_escalate_after")]
    pub escalate_after: u32,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            warning_limit: default_warning_limit(),
            ignored_capabilities: Vec::new(),
            escalate_after: default_escalate_after(),
        }
    }
}

fn default_interval() -> u64 {
    3600
}
fn default_warning_limit() -> usize {
    thingsync_core::model::SUBSCRIPTION_WARNING_LIMIT
}
fn default_escalate_after() -> u32 {
    3
}

/// A persisted installation record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstallationEntry {
    pub installed_app_id: String,
    pub app_id: String,
    pub location_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InstallationEntry {
    pub fn from_record(record: &InstallationRecord) -> Self {
        Self {
            installed_app_id: record.installed_app_id.clone(),
            app_id: record.app_id.clone(),
            location_id: record.location_id.clone(),
            access_token: record.access_token.expose_secret().to_owned(),
            refresh_token: record.refresh_token.expose_secret().to_owned(),
            oauth_client_id: record.oauth_client_id.clone(),
            oauth_client_secret: record
                .oauth_client_secret
                .as_ref()
                .map(|s| s.expose_secret().to_owned()),
            created_at: Utc::now(),
        }
    }

    pub fn context(&self, entry_id: &str) -> InstalledAppContext {
        InstalledAppContext {
            entry_id: entry_id.to_owned(),
            installed_app_id: self.installed_app_id.clone(),
            location_id: self.location_id.clone(),
            app_id: self.app_id.clone(),
        }
    }
}

// ── Translation to core settings ────────────────────────────────────

impl Config {
    /// Generate any missing endpoint ids. Returns `true` if something changed.
    pub fn ensure_endpoint_ids(&mut self) -> bool {
        let mut changed = false;
        for slot in [&mut self.webhook.instance_id, &mut self.webhook.webhook_id] {
            if slot.is_none() {
                *slot = Some(Uuid::new_v4().simple().to_string());
                changed = true;
            }
        }
        changed
    }

    pub fn api_settings(&self) -> ApiSettings {
        let tls = self
            .api
            .ca_cert
            .clone()
            .map_or(TlsMode::System, TlsMode::CustomCa);
        ApiSettings {
            base_url: self.api.base_url.clone(),
            transport: TransportConfig {
                tls,
                timeout: Duration::from_secs(self.api.timeout),
            },
        }
    }

    /// Endpoint identity; requires a public URL and generated ids.
    pub fn endpoint_config(&self) -> Result<EndpointConfig, ConfigError> {
        let raw = self
            .webhook
            .public_url
            .as_deref()
            .ok_or_else(|| ConfigError::Validation {
                field: "webhook.public_url".into(),
                reason: "not set".into(),
            })?;
        let public_url = Url::parse(raw).map_err(|e| ConfigError::Validation {
            field: "webhook.public_url".into(),
            reason: format!("invalid URL {raw}: {e}"),
        })?;

        let missing_id = |field: &str| ConfigError::Validation {
            field: field.into(),
            reason: "not generated yet".into(),
        };
        Ok(EndpointConfig {
            public_url,
            webhook_id: self
                .webhook
                .webhook_id
                .clone()
                .ok_or_else(|| missing_id("webhook.webhook_id"))?,
            instance_id: self
                .webhook
                .instance_id
                .clone()
                .ok_or_else(|| missing_id("webhook.instance_id"))?,
        })
    }

    pub fn app_profile(&self) -> AppProfile {
        AppProfile {
            display_name: self.app.display_name.clone(),
            description: self.app.description.clone(),
            oauth_client_name: self.app.oauth_client_name.clone(),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            interval: Duration::from_secs(self.sync.interval.max(1)),
            warning_limit: self.sync.warning_limit,
            extra_ignored: self
                .sync
                .ignored_capabilities
                .iter()
                .map(|c| Capability::from(c.as_str()))
                .collect(),
            escalate_after: self.sync.escalate_after,
        }
    }

    /// Entry id and entry for an installed app.
    pub fn installation_for(&self, installed_app_id: &str) -> Option<(&str, &InstallationEntry)> {
        self.installations
            .iter()
            .find(|(_, e)| e.installed_app_id == installed_app_id)
            .map(|(id, e)| (id.as_str(), e))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "thingsync", "thingsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("thingsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from defaults, `path`, and the environment.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("THINGSYNC_").split("__"));

    Ok(figment.extract()?)
}

/// Load only what is stored in `path`, without environment overrides.
///
/// Used before writing back, so environment values never leak into the file.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path));

    Ok(figment.extract()?)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serializes read-modify-write cycles on config files within the process.
static CONFIG_WRITE: Mutex<()> = Mutex::new(());

/// Serialize config to TOML and atomically replace `path`.
///
/// The file holds tokens, so it is created owner-only before any byte is
/// written.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;

    let tmp = path.with_extension("toml.tmp");
    match std::fs::remove_file(&tmp) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    file.write_all(toml_str.as_bytes())?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;

    debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Load the stored config at `path`, apply `change`, and save it back.
///
/// Every cycle holds one process-wide lock, so concurrent updates (a new
/// installation while another is removed) never overwrite each other.
pub fn update_config<T>(
    path: &Path,
    change: impl FnOnce(&mut Config) -> T,
) -> Result<T, ConfigError> {
    let _guard = CONFIG_WRITE
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let mut cfg = load_file(path)?;
    let result = change(&mut cfg);
    save_config(&cfg, path)?;
    Ok(result)
}

/// Remove the installation for `installed_app_id`, returning its entry id.
pub fn remove_installation(path: &Path, installed_app_id: &str) -> Result<Option<String>, ConfigError> {
    update_config(path, |cfg| {
        let entry_id = cfg
            .installation_for(installed_app_id)
            .map(|(id, _)| id.to_owned())?;
        cfg.installations.remove(&entry_id);
        Some(entry_id)
    })
}

// ── Installation store ──────────────────────────────────────────────

/// Persists completed installations into the config file.
pub struct TomlInstallationStore {
    path: PathBuf,
}

impl TomlInstallationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write(&self, record: &InstallationRecord) -> Result<String, ConfigError> {
        let entry_id = Uuid::new_v4().simple().to_string();
        update_config(&self.path, |cfg| {
            cfg.installations
                .insert(entry_id.clone(), InstallationEntry::from_record(record));
        })?;
        Ok(entry_id)
    }
}

impl InstallationStore for TomlInstallationStore {
    fn persist(&self, record: &InstallationRecord) -> Result<String, CoreError> {
        self.write(record).map_err(|e| CoreError::Persistence {
            message: e.to_string(),
        })
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the personal access token (no CLI flag step).
///
/// Order: `api.token_env` variable, system keyring, plaintext `api.token`.
pub fn resolve_token(api: &ApiSection) -> Result<SecretString, ConfigError> {
    // 1. Configured env var
    if let Some(ref env_name) = api.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_USER) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = api.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials)
}

/// Store the personal access token in the system keyring.
pub fn store_token(token: &SecretString) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_USER)?;
    entry.set_password(token.expose_secret())?;
    Ok(())
}
