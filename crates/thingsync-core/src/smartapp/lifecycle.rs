// Wire types for SmartApp lifecycle callbacks.
//
// Every callback is a JSON object with a `lifecycle` discriminator and one
// `<phase>Data` member carrying the phase payload. Only the members the
// bridge acts on are modeled; everything else is ignored on input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    Ping,
    Confirmation,
    Configuration,
    Install,
    Update,
    Event,
    Uninstall,
    OauthCallback,
    #[serde(other)]
    Unknown,
}

/// One inbound lifecycle callback.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRequest {
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub ping_data: Option<PingData>,
    #[serde(default)]
    pub confirmation_data: Option<ConfirmationData>,
    #[serde(default)]
    pub configuration_data: Option<ConfigurationData>,
    #[serde(default)]
    pub install_data: Option<InstallData>,
    #[serde(default)]
    pub update_data: Option<InstallData>,
    #[serde(default)]
    pub event_data: Option<EventData>,
    #[serde(default)]
    pub uninstall_data: Option<UninstallData>,
}

impl LifecycleRequest {
    /// App the callback targets. Confirmation requests carry it inside
    /// their payload rather than at the top level.
    pub fn target_app_id(&self) -> Option<&str> {
        self.app_id.as_deref().or_else(|| {
            self.confirmation_data
                .as_ref()
                .map(|c| c.app_id.as_str())
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingData {
    pub challenge: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationData {
    pub app_id: String,
    pub confirmation_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigurationPhase {
    Initialize,
    Page,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationData {
    #[serde(default)]
    pub installed_app_id: Option<String>,
    pub phase: ConfigurationPhase,
    #[serde(default)]
    pub page_id: Option<String>,
}

/// The installed app a callback is about.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    pub installed_app_id: String,
    pub location_id: String,
}

/// Payload of both `INSTALL` and `UPDATE`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallData {
    pub auth_token: String,
    pub refresh_token: String,
    pub installed_app: InstalledApp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallData {
    pub installed_app: InstalledApp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub installed_app: InstalledApp,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    DeviceEvent,
    DeviceLifecycleEvent,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: EventType,
    #[serde(default)]
    pub device_event: Option<DeviceEvent>,
    #[serde(default)]
    pub device_lifecycle_event: Option<DeviceLifecycleEvent>,
}

/// A capability attribute change pushed by a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    #[serde(default)]
    pub subscription_name: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    pub device_id: String,
    #[serde(default)]
    pub component_id: Option<String>,
    pub capability: String,
    pub attribute: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub state_change: Option<bool>,
}

/// A device was added, removed or changed at the location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLifecycleEvent {
    pub lifecycle: String,
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

// ── Responses ────────────────────────────────────────────────────────

/// Body returned to the platform for a handled callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LifecycleResponse {
    Ping {
        #[serde(rename = "pingData")]
        ping_data: PingResponse,
    },
    Confirmation {
        #[serde(rename = "targetUrl")]
        target_url: String,
    },
    Configuration {
        #[serde(rename = "configurationData")]
        configuration_data: Value,
    },
    Install {
        #[serde(rename = "installData")]
        install_data: Empty,
    },
    Update {
        #[serde(rename = "updateData")]
        update_data: Empty,
    },
    Event {
        #[serde(rename = "eventData")]
        event_data: Empty,
    },
    Uninstall {
        #[serde(rename = "uninstallData")]
        uninstall_data: Empty,
    },
    OauthCallback {
        #[serde(rename = "oauthCallbackData")]
        oauth_callback_data: Empty,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingResponse {
    pub challenge: String,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn parses_event_callback() {
        let req: LifecycleRequest = serde_json::from_value(json!({
            "lifecycle": "EVENT",
            "executionId": "e1",
            "appId": "app-1",
            "locale": "en",
            "eventData": {
                "authToken": "tok",
                "installedApp": { "installedAppId": "ia-1", "locationId": "loc-1", "config": {} },
                "events": [
                    {
                        "eventType": "DEVICE_EVENT",
                        "deviceEvent": {
                            "deviceId": "d1",
                            "componentId": "main",
                            "capability": "switch",
                            "attribute": "switch",
                            "value": "on",
                            "stateChange": true
                        }
                    },
                    { "eventType": "TIMER_EVENT", "timerEvent": {} }
                ]
            }
        }))
        .unwrap();

        assert_eq!(req.lifecycle, Lifecycle::Event);
        let data = req.event_data.unwrap();
        assert_eq!(data.installed_app.installed_app_id, "ia-1");
        assert_eq!(data.events[0].event_type, EventType::DeviceEvent);
        assert_eq!(data.events[0].device_event.as_ref().unwrap().value, json!("on"));
        assert_eq!(data.events[1].event_type, EventType::Other);
    }

    #[test]
    fn confirmation_app_id_comes_from_payload() {
        let req: LifecycleRequest = serde_json::from_value(json!({
            "lifecycle": "CONFIRMATION",
            "confirmationData": { "appId": "app-9", "confirmationUrl": "https://example.test/c" }
        }))
        .unwrap();
        assert_eq!(req.target_app_id(), Some("app-9"));
    }

    #[test]
    fn responses_serialize_to_protocol_shapes() {
        let ping = LifecycleResponse::Ping {
            ping_data: PingResponse {
                challenge: "abc".into(),
            },
        };
        assert_eq!(serde_json::to_value(ping).unwrap(), json!({ "pingData": { "challenge": "abc" } }));

        let install = LifecycleResponse::Install {
            install_data: Empty {},
        };
        assert_eq!(serde_json::to_value(install).unwrap(), json!({ "installData": {} }));
    }
}
