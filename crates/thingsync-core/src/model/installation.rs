// ── Installation records ──
//
// The durable outcome of a completed installation handshake. A record is
// built in one piece when the handshake finishes and is never patched;
// re-authorizing produces a brand new record.

use secrecy::SecretString;

use crate::error::CoreError;
use crate::smartapp::InstalledAppContext;

/// Everything needed to act on behalf of one installed app.
#[derive(Debug, Clone)]
pub struct InstallationRecord {
    /// Personal access token used to manage the app registration.
    pub access_token: SecretString,
    /// Refresh token issued when the user authorized the installation.
    pub refresh_token: SecretString,
    /// Present only when the handshake created the app registration.
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<SecretString>,
    pub location_id: String,
    pub app_id: String,
    pub installed_app_id: String,
}

impl InstallationRecord {
    /// Correlation context for this record stored under `entry_id`.
    pub fn context(&self, entry_id: &str) -> InstalledAppContext {
        InstalledAppContext {
            entry_id: entry_id.to_owned(),
            installed_app_id: self.installed_app_id.clone(),
            location_id: self.location_id.clone(),
            app_id: self.app_id.clone(),
        }
    }
}

/// Write-once persistence for completed installations.
///
/// Implementations must make the record visible atomically: a reader
/// either sees the whole record or nothing.
pub trait InstallationStore: Send + Sync {
    /// Persist `record` and return the entry id it was stored under.
    fn persist(&self, record: &InstallationRecord) -> Result<String, CoreError>;
}
