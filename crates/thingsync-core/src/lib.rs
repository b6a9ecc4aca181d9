//! Business logic between `thingsync-api` and the `thingsync` binary.
//!
//! - **[`Reconciler`]**: diffs the capabilities a location's devices need
//!   against the subscriptions an installed app holds, and issues every
//!   create/delete concurrently. Failures are per capability and land in
//!   the [`ReconcileReport`]; [`FailureStreaks`] flags capabilities that
//!   keep failing across passes.
//!
//! - **[`InstallFlow`]**: the installation handshake as an explicit
//!   [`FlowState`] machine. Validates a personal access token, finds or
//!   creates this deployment's app registration, lets the user pick a
//!   location, and persists an [`InstallationRecord`] once the platform
//!   reports the authorization.
//!
//! - **[`SmartAppManager`]** / **[`WebhookRegistry`]**: answer SmartApp
//!   lifecycle callbacks and broadcast [`LifecycleNotice`]s.
//!   [`webhook::handle_inbound`] turns any error or panic into a bare 500;
//!   [`webhook::router`] mounts it under axum.
//!
//! - **[`SyncWorker`]**: per-installation background loop that reconciles
//!   on an interval and on lifecycle notices for its installation.

pub mod config;
pub mod error;
pub mod flow;
pub mod model;
pub mod reconcile;
pub mod smartapp;
pub mod sync;
pub mod webhook;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ApiSettings, AppProfile, EndpointConfig, SyncSettings};
pub use error::CoreError;
pub use flow::{AbortReason, FlowContext, FlowError, FlowEvent, FlowState, InstallFlow, Prompt};
pub use model::{Capability, CapabilityFilter, Device, InstallationRecord, InstallationStore};
pub use reconcile::{FailureStreaks, ReconcileReport, Reconciler, SubscriptionOutcome};
pub use smartapp::{
    AcceptUnsigned, InstalledAppContext, LifecycleError, LifecycleNotice, SignatureVerifier,
    SmartApp, SmartAppManager,
};
pub use sync::SyncWorker;
pub use webhook::{WebhookRegistry, WebhookResponse};
