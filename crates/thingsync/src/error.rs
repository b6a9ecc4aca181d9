//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use thingsync_config::ConfigError;
use thingsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to SmartThings at {url}")]
    #[diagnostic(
        code(thingsync::connection_failed),
        help(
            "Check network access to the API.\n\
             URL: {url}\n\
             A custom base URL can be set with api.base_url in the config file."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Could not bind the webhook server to {addr}")]
    #[diagnostic(
        code(thingsync::bind_failed),
        help("Pick another address with --bind or webhook.bind in the config file.")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(thingsync::auth_failed),
        help(
            "Verify the personal access token and its scopes at\n\
             https://account.smartthings.com/tokens"
        )
    )]
    AuthFailed { message: String },

    #[error("No access token configured")]
    #[diagnostic(
        code(thingsync::no_credentials),
        help(
            "Pass --token, set THINGSYNC_TOKEN, or run: thingsync config init\n\
             Config file: {path}"
        )
    )]
    NoCredentials { path: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(thingsync::not_found),
        help("Run: thingsync {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("No installations recorded")]
    #[diagnostic(
        code(thingsync::no_installations),
        help("Install the SmartApp into a location with: thingsync setup")
    )]
    NoInstallations,

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(thingsync::api_error))]
    ApiError { code: String, message: String },

    #[error("{failures} subscription change(s) failed")]
    #[diagnostic(
        code(thingsync::sync_incomplete),
        help("Failed changes are retried on the next pass. Rerun with -v for details.")
    )]
    SyncIncomplete { failures: usize },

    // ── Setup ────────────────────────────────────────────────────────

    #[error("Setup aborted: {reason}")]
    #[diagnostic(code(thingsync::setup_aborted))]
    SetupAborted { reason: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(thingsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(thingsync::config),
        help("Check the config file, or print its location with: thingsync config path")
    )]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(thingsync::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out")]
    #[diagnostic(
        code(thingsync::timeout),
        help("Increase api.timeout in the config file or check connectivity.")
    )]
    Timeout,

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(thingsync::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::NoInstallations => exit_code::NOT_FOUND,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials => CliError::NoCredentials {
                path: thingsync_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout => CliError::Timeout,

            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                list_command: format!("{entity_type}s list"),
                resource_type: entity_type,
                identifier,
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Api {
                message,
                code,
                status,
            } => CliError::ApiError {
                code: code
                    .or_else(|| status.map(|s| s.to_string()))
                    .unwrap_or_default(),
                message,
            },

            CoreError::Persistence { message } => CliError::ApiError {
                code: "persistence".into(),
                message,
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

impl From<thingsync_api::Error> for CliError {
    fn from(err: thingsync_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
