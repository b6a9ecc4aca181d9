// ── Domain model ──

pub mod capability;
pub mod device;
pub mod installation;

pub use capability::{
    Capability, CapabilityFilter, IGNORED_CAPABILITIES, SUBSCRIPTION_WARNING_LIMIT,
    SUPPORTED_CAPABILITIES,
};
pub use device::Device;
pub use installation::{InstallationRecord, InstallationStore};
