// Wire types for the SmartThings REST API.
//
// Field names follow the API's camelCase JSON. Response types tolerate
// unknown fields and absent optional members; request types serialize
// only what the API expects.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Paging ───────────────────────────────────────────────────────────

/// Envelope returned by every list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(rename = "_links", default)]
    pub links: Option<PageLinks>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

impl<T> Page<T> {
    /// The `next` link, if the API reported another page.
    pub fn next_href(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.next.as_ref())
            .map(|n| n.href.as_str())
    }
}

// ── Subscriptions ────────────────────────────────────────────────────

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Capability,
    Device,
    DeviceLifecycle,
    DeviceHealth,
    Mode,
    SceneLifecycle,
    #[serde(other)]
    Other,
}

/// Capability subscription body (`sourceType = CAPABILITY`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySubscription {
    pub location_id: String,
    pub capability: String,
    #[serde(default = "wildcard")]
    pub attribute: String,
    #[serde(default = "wildcard")]
    pub value: String,
    #[serde(default = "default_true")]
    pub state_change_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_name: Option<String>,
}

/// Device lifecycle subscription body (`sourceType = DEVICE_LIFECYCLE`).
///
/// Without one the platform never delivers `DEVICE_LIFECYCLE_EVENT`s
/// (devices added to or removed from the location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLifecycleSubscription {
    pub location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_name: Option<String>,
}

fn wildcard() -> String {
    "*".into()
}

fn default_true() -> bool {
    true
}

/// A subscription as listed by `GET installedapps/{id}/subscriptions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub installed_app_id: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub capability: Option<CapabilitySubscription>,
    #[serde(default)]
    pub device_lifecycle: Option<DeviceLifecycleSubscription>,
}

impl SubscriptionResponse {
    /// Capability name for `CAPABILITY` subscriptions.
    pub fn capability_name(&self) -> Option<&str> {
        match (self.source_type, &self.capability) {
            (SourceType::Capability, Some(c)) => Some(c.capability.as_str()),
            _ => None,
        }
    }

    pub fn is_device_lifecycle(&self) -> bool {
        self.source_type == SourceType::DeviceLifecycle
    }
}

/// Body for `POST installedapps/{id}/subscriptions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<CapabilitySubscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_lifecycle: Option<DeviceLifecycleSubscription>,
}

impl SubscriptionRequest {
    /// Subscribe to every attribute change of `capability` at `location_id`.
    pub fn capability(location_id: &str, capability: &str) -> Self {
        Self {
            source_type: SourceType::Capability,
            capability: Some(CapabilitySubscription {
                location_id: location_id.to_owned(),
                capability: capability.to_owned(),
                attribute: wildcard(),
                value: wildcard(),
                state_change_only: true,
                subscription_name: None,
            }),
            device_lifecycle: None,
        }
    }

    /// Subscribe to devices being added to or removed from `location_id`.
    pub fn device_lifecycle(location_id: &str) -> Self {
        Self {
            source_type: SourceType::DeviceLifecycle,
            capability: None,
            device_lifecycle: Some(DeviceLifecycleSubscription {
                location_id: location_id.to_owned(),
                subscription_name: None,
            }),
        }
    }
}

// ── Apps ─────────────────────────────────────────────────────────────

/// Entry of `GET apps`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSummary {
    pub app_id: String,
    pub app_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub app_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSmartApp {
    pub target_url: String,
    #[serde(default, skip_serializing)]
    pub public_key: Option<String>,
}

/// Full app registration as returned by `GET apps/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppResponse {
    pub app_id: String,
    pub app_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub single_instance: bool,
    #[serde(default)]
    pub classifications: Vec<String>,
    #[serde(default)]
    pub app_type: Option<String>,
    #[serde(default)]
    pub webhook_smart_app: Option<WebhookSmartApp>,
}

impl AppResponse {
    /// Webhook target URL, if this is a webhook app.
    pub fn target_url(&self) -> Option<&str> {
        self.webhook_smart_app.as_ref().map(|w| w.target_url.as_str())
    }
}

/// Body for `POST apps` and `PUT apps/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRequest {
    pub app_name: String,
    pub display_name: String,
    pub description: String,
    pub single_instance: bool,
    pub classifications: Vec<String>,
    pub app_type: String,
    pub webhook_smart_app: WebhookSmartApp,
}

/// Response of `POST apps`: the registration plus its OAuth client pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCreatedResponse {
    pub app: AppResponse,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
}

/// Free-form key/value settings attached to an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// OAuth definition of an app (`PUT apps/{id}/oauth`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOAuth {
    pub client_name: String,
    #[serde(default)]
    pub scope: Vec<String>,
}

// ── Locations ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub location_id: String,
    pub name: String,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityReference {
    pub id: String,
    #[serde(default)]
    pub version: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceComponent {
    pub id: String,
    #[serde(default)]
    pub capabilities: Vec<CapabilityReference>,
}

/// Entry of `GET devices`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub components: Vec<DeviceComponent>,
}

impl DeviceResponse {
    /// Capability ids across every component, in listing order.
    pub fn capability_ids(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .flat_map(|c| c.capabilities.iter().map(|cap| cap.id.as_str()))
    }
}
