// ── SmartApp webhook protocol ──

pub mod lifecycle;
pub mod manager;

use axum::http::HeaderMap;
use thiserror::Error;

pub use lifecycle::{DeviceEvent, Lifecycle, LifecycleRequest, LifecycleResponse};
pub use manager::{InstalledAppContext, LifecycleNotice, SmartApp, SmartAppManager};

/// Why a lifecycle callback could not be answered.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("malformed lifecycle request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("lifecycle request carries no app id")]
    MissingAppId,

    #[error("app {0} is not registered with this endpoint")]
    UnknownApp(String),

    #[error("{0:?} request is missing its payload")]
    MissingData(Lifecycle),

    #[error("unsupported lifecycle")]
    Unsupported,

    #[error("request signature rejected: {0}")]
    Signature(String),

    #[error("confirmation request failed: {0}")]
    Confirmation(#[source] reqwest::Error),
}

/// Authenticates inbound callbacks from their HTTP headers.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, request: &LifecycleRequest, headers: &HeaderMap) -> Result<(), LifecycleError>;
}

/// Accepts every request. Suitable only when the webhook is otherwise
/// protected, e.g. by an unguessable webhook id behind a reverse proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptUnsigned;

impl SignatureVerifier for AcceptUnsigned {
    fn verify(&self, _request: &LifecycleRequest, _headers: &HeaderMap) -> Result<(), LifecycleError> {
        Ok(())
    }
}
