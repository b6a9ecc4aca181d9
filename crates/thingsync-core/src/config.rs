// ── Runtime configuration ──
//
// These types describe *how* to talk to the platform and *where* the
// webhook lives. They carry no file format: thingsync-config loads the
// TOML file and hands fully resolved values in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use thingsync_api::{DEFAULT_BASE_URL, SmartThingsClient, TransportConfig};

use crate::error::CoreError;
use crate::model::{Capability, CapabilityFilter, SUBSCRIPTION_WARNING_LIMIT};

/// Path under which webhook deliveries are routed, followed by the webhook id.
pub const WEBHOOK_ROUTE_PREFIX: &str = "/api/webhook/";

/// Prefix of every app registration created by this bridge.
pub const APP_NAME_PREFIX: &str = "thingsync.";

/// App settings key holding the owning deployment's instance id.
pub const SETTINGS_INSTANCE_ID: &str = "instanceId";

// ── API ─────────────────────────────────────────────────────────────

/// Where the REST API lives and how to reach it.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub transport: TransportConfig,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            transport: TransportConfig::default(),
        }
    }
}

impl ApiSettings {
    /// Build a client authenticated with `token`.
    pub fn client(&self, token: &SecretString) -> Result<SmartThingsClient, CoreError> {
        Ok(SmartThingsClient::from_token(
            &self.base_url,
            token,
            &self.transport,
        )?)
    }
}

// ── Webhook endpoint ────────────────────────────────────────────────

/// Identity and public address of this deployment's webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Externally visible base URL, e.g. `https://hub.example.net`.
    pub public_url: Url,
    /// Last path segment of the webhook URL.
    pub webhook_id: String,
    /// Written into app settings to recognise registrations we own.
    pub instance_id: String,
}

impl EndpointConfig {
    /// Full URL the platform delivers lifecycle callbacks to.
    pub fn webhook_url(&self) -> Result<Url, CoreError> {
        let base = self.public_url.as_str().trim_end_matches('/');
        let raw = format!("{base}{WEBHOOK_ROUTE_PREFIX}{}", self.webhook_id);
        Url::parse(&raw).map_err(|e| CoreError::ValidationFailed {
            message: format!("invalid webhook URL {raw}: {e}"),
        })
    }

    /// The platform only delivers to absolute `https` URLs with a host.
    pub fn is_publicly_reachable(&self) -> bool {
        self.webhook_url()
            .is_ok_and(|url| url.scheme() == "https" && url.host_str().is_some_and(|h| !h.is_empty()))
    }
}

// ── App registration ────────────────────────────────────────────────

/// How the app registration presents itself on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppProfile {
    pub display_name: String,
    pub description: String,
    pub oauth_client_name: String,
}

impl Default for AppProfile {
    fn default() -> Self {
        Self {
            display_name: "thingsync".into(),
            description: "Push device events to a local home-automation hub".into(),
            oauth_client_name: "thingsync".into(),
        }
    }
}

// ── Reconciliation ──────────────────────────────────────────────────

/// Tuning for the background subscription sync.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Time between periodic reconciliation passes.
    pub interval: Duration,
    /// Desired-set size above which a quota warning is logged.
    pub warning_limit: usize,
    /// Capabilities ignored in addition to the built-in denylist.
    pub extra_ignored: Vec<Capability>,
    /// Consecutive failed passes before a capability is reported as persistent.
    pub escalate_after: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            warning_limit: SUBSCRIPTION_WARNING_LIMIT,
            extra_ignored: Vec::new(),
            escalate_after: 3,
        }
    }
}

impl SyncSettings {
    /// Default filter extended with the configured extra denylist.
    pub fn capability_filter(&self) -> CapabilityFilter {
        CapabilityFilter::default().with_ignored(self.extra_ignored.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn endpoint(public_url: &str) -> EndpointConfig {
        EndpointConfig {
            public_url: Url::parse(public_url).unwrap(),
            webhook_id: "abc123".into(),
            instance_id: "inst".into(),
        }
    }

    #[test]
    fn webhook_url_appends_route_and_id() {
        let url = endpoint("https://hub.example.net/").webhook_url().unwrap();
        assert_eq!(url.as_str(), "https://hub.example.net/api/webhook/abc123");

        let url = endpoint("https://hub.example.net/base").webhook_url().unwrap();
        assert_eq!(url.as_str(), "https://hub.example.net/base/api/webhook/abc123");
    }

    #[test]
    fn only_https_is_reachable() {
        assert!(endpoint("https://hub.example.net").is_publicly_reachable());
        assert!(!endpoint("http://hub.example.net").is_publicly_reachable());
    }
}
