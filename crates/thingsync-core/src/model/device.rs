// ── Device domain types ──

use serde::{Deserialize, Serialize};

use thingsync_api::types::DeviceResponse;

use super::capability::Capability;

/// A device as far as subscription planning is concerned: an identifier,
/// a display label, and the capabilities it reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub label: Option<String>,
    pub capabilities: Vec<Capability>,
}

impl Device {
    pub fn new<C: Into<Capability>>(
        device_id: impl Into<String>,
        capabilities: impl IntoIterator<Item = C>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            label: None,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    /// Label if set, otherwise the device id.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.device_id)
    }
}

impl From<DeviceResponse> for Device {
    fn from(d: DeviceResponse) -> Self {
        let mut capabilities: Vec<Capability> = d.capability_ids().map(Capability::from).collect();
        capabilities.sort();
        capabilities.dedup();

        Self {
            label: d.label.or(d.name),
            device_id: d.device_id,
            capabilities,
        }
    }
}
