// thingsync-api: Async Rust client for the SmartThings REST API

pub mod auth;
pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use auth::{DEFAULT_BASE_URL, install_url};
pub use client::SmartThingsClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
