// ── Capabilities ──
//
// A capability names one feature a device exposes ("switch",
// "thermostatMode", ...). Subscriptions are keyed by capability, so the
// set of capabilities across all devices decides what gets subscribed.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::device::Device;

/// Capabilities the bridge knows how to consume.
///
/// Anything a device reports outside this list is never subscribed.
pub const SUPPORTED_CAPABILITIES: &[&str] = &[
    "accelerationSensor",
    "activityLightingMode",
    "airConditionerFanMode",
    "airConditionerMode",
    "airFlowDirection",
    "airQualitySensor",
    "alarm",
    "audioMute",
    "audioVolume",
    "battery",
    "bodyMassIndexMeasurement",
    "bodyWeightMeasurement",
    "button",
    "carbonDioxideMeasurement",
    "carbonMonoxideDetector",
    "carbonMonoxideMeasurement",
    "colorControl",
    "colorTemperature",
    "contactSensor",
    "demandResponseLoadControl",
    "dishwasherMode",
    "dishwasherOperatingState",
    "doorControl",
    "dryerMode",
    "dryerOperatingState",
    "dustSensor",
    "energyMeter",
    "equivalentCarbonDioxideMeasurement",
    "execute",
    "fanSpeed",
    "filterStatus",
    "formaldehydeMeasurement",
    "garageDoorControl",
    "gasMeter",
    "healthCheck",
    "illuminanceMeasurement",
    "infraredLevel",
    "lock",
    "mediaInputSource",
    "mediaPlayback",
    "mediaPlaybackRepeat",
    "mediaPlaybackShuffle",
    "motionSensor",
    "ocf",
    "odorSensor",
    "ovenMode",
    "ovenOperatingState",
    "ovenSetpoint",
    "powerConsumptionReport",
    "powerMeter",
    "powerSource",
    "presenceSensor",
    "rapidCooling",
    "refrigerationSetpoint",
    "relativeHumidityMeasurement",
    "robotCleanerCleaningMode",
    "robotCleanerMovement",
    "robotCleanerTurboMode",
    "signalStrength",
    "smokeDetector",
    "soundSensor",
    "switch",
    "switchLevel",
    "tamperAlert",
    "temperatureMeasurement",
    "thermostat",
    "thermostatCoolingSetpoint",
    "thermostatFanMode",
    "thermostatHeatingSetpoint",
    "thermostatMode",
    "thermostatOperatingState",
    "thermostatSetpoint",
    "threeAxis",
    "tvChannel",
    "tvocMeasurement",
    "ultravioletIndex",
    "valve",
    "voltageMeasurement",
    "washerMode",
    "washerOperatingState",
    "waterSensor",
    "windowShade",
    "windowShadeLevel",
];

/// Administrative or low-value capabilities that are never subscribed,
/// even though the platform reports them on almost every device.
pub const IGNORED_CAPABILITIES: &[&str] = &["execute", "healthCheck", "ocf"];

/// Above this many subscriptions an installed app risks hitting the
/// platform's per-app subscription quota.
pub const SUBSCRIPTION_WARNING_LIMIT: usize = 40;

// ── Capability ──────────────────────────────────────────────────────

/// Opaque capability identifier, compared by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Capability {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── CapabilityFilter ────────────────────────────────────────────────

/// Allowlist + denylist applied to the raw capability union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityFilter {
    supported: BTreeSet<Capability>,
    ignored: BTreeSet<Capability>,
}

impl Default for CapabilityFilter {
    fn default() -> Self {
        Self {
            supported: SUPPORTED_CAPABILITIES.iter().map(|&c| c.into()).collect(),
            ignored: IGNORED_CAPABILITIES.iter().map(|&c| c.into()).collect(),
        }
    }
}

impl CapabilityFilter {
    /// Build a filter from explicit lists.
    pub fn new(
        supported: impl IntoIterator<Item = Capability>,
        ignored: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            supported: supported.into_iter().collect(),
            ignored: ignored.into_iter().collect(),
        }
    }

    /// Add capabilities to the denylist on top of the built-in ones.
    pub fn with_ignored(mut self, extra: impl IntoIterator<Item = Capability>) -> Self {
        self.ignored.extend(extra);
        self
    }

    /// Whether a single capability survives the filter.
    pub fn admits(&self, capability: &Capability) -> bool {
        self.supported.contains(capability) && !self.ignored.contains(capability)
    }

    /// Union of every device's capabilities, minus anything the filter rejects.
    ///
    /// The result is a sorted set, so it does not depend on device order.
    pub fn desired<'a>(&self, devices: impl IntoIterator<Item = &'a Device>) -> BTreeSet<Capability> {
        devices
            .into_iter()
            .flat_map(|d| d.capabilities.iter())
            .filter(|c| self.admits(c))
            .cloned()
            .collect()
    }
}
