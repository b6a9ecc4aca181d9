// ── Installation handshake ──
//
// A resumable, strictly sequential flow that takes a personal access token
// to a persisted installation record:
//
//   Init → AwaitUserConfirmation → AwaitCredential → SelectLocation
//        → Authorize → Complete
//
// with `Aborted` reachable from Init, AwaitUserConfirmation and
// SelectLocation. Each state carries only the data valid in it, and
// `InstallFlow::transition` consumes one state to produce the next.

pub mod app;
pub mod credential;
mod transition;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use thingsync_api::types::LocationSummary;

use crate::model::InstallationRecord;
use crate::smartapp::LifecycleNotice;

pub use app::{AppRegistration, OAuthClient};
pub use credential::is_valid_token_format;
pub use transition::{FlowContext, InstallFlow};

/// Terminal failure of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortReason {
    #[error("the webhook URL is not reachable from the internet")]
    UnreachableWebhook,
    #[error("no locations are available to this token")]
    NoLocations,
}

/// Recoverable problem annotated on the state that detected it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("the token must be a 32 character hex string or a UUID")]
    TokenInvalidFormat,
    #[error("could not set up the app registration: {0}")]
    AppSetup(String),
    #[error("could not list locations: {0}")]
    LocationsUnavailable(String),
    #[error("unknown location {0}")]
    UnknownLocation(String),
    #[error("could not build the authorization URL: {0}")]
    AuthorizeUrl(String),
    #[error("could not save the installation: {0}")]
    Persist(String),
}

/// Token and app registration established by a valid credential.
#[derive(Debug, Clone)]
pub struct AppGrant {
    pub access_token: SecretString,
    pub app: AppRegistration,
}

impl AppGrant {
    pub fn app_id(&self) -> &str {
        &self.app.app_id
    }
}

#[derive(Debug, Clone)]
pub enum FlowState {
    Init {
        endpoints_initialized: bool,
    },
    AwaitUserConfirmation {
        webhook_url: Url,
    },
    AwaitCredential {
        error: Option<FlowError>,
    },
    SelectLocation {
        grant: AppGrant,
        locations: Vec<LocationSummary>,
        error: Option<FlowError>,
    },
    Authorize {
        grant: AppGrant,
        location_id: String,
        authorize_url: Url,
        error: Option<FlowError>,
    },
    Complete {
        entry_id: String,
        record: InstallationRecord,
    },
    Aborted(AbortReason),
}

impl Default for FlowState {
    fn default() -> Self {
        Self::Init {
            endpoints_initialized: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// Re-render the current step without input.
    Show,
    /// The user acknowledged the webhook URL.
    Confirm,
    SubmitToken(String),
    SelectLocation(String),
    /// The out-of-band authorization finished.
    Authorized {
        installed_app_id: String,
        refresh_token: SecretString,
    },
}

impl FlowEvent {
    /// Bridge an `Installed` notice into an `Authorized` event when it
    /// belongs to `app_id` at `location_id`.
    pub fn from_notice(notice: &LifecycleNotice, app_id: &str, location_id: &str) -> Option<Self> {
        match notice {
            LifecycleNotice::Installed {
                app_id: notice_app,
                installed_app_id,
                location_id: notice_location,
                refresh_token,
                ..
            } if notice_app == app_id && notice_location == location_id => Some(Self::Authorized {
                installed_app_id: installed_app_id.clone(),
                refresh_token: refresh_token.clone(),
            }),
            _ => None,
        }
    }
}

/// What the front end should show for a state.
#[derive(Debug, Clone, Copy)]
pub enum Prompt<'a> {
    ConfirmWebhook {
        webhook_url: &'a Url,
    },
    EnterCredential {
        error: Option<&'a FlowError>,
    },
    ChooseLocation {
        choices: &'a [LocationSummary],
        error: Option<&'a FlowError>,
    },
    /// `app_id` and `location_id` identify the INSTALL lifecycle to wait for.
    OpenAuthorizeUrl {
        url: &'a Url,
        app_id: &'a str,
        location_id: &'a str,
        error: Option<&'a FlowError>,
    },
    Finished {
        entry_id: &'a str,
    },
    Aborted(AbortReason),
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Aborted(_))
    }

    /// Prompt for this state; `Init` has none until it is entered.
    pub fn prompt(&self) -> Option<Prompt<'_>> {
        Some(match self {
            Self::Init { .. } => return None,
            Self::AwaitUserConfirmation { webhook_url } => Prompt::ConfirmWebhook { webhook_url },
            Self::AwaitCredential { error } => Prompt::EnterCredential {
                error: error.as_ref(),
            },
            Self::SelectLocation {
                locations, error, ..
            } => Prompt::ChooseLocation {
                choices: locations,
                error: error.as_ref(),
            },
            Self::Authorize {
                grant,
                location_id,
                authorize_url,
                error,
            } => Prompt::OpenAuthorizeUrl {
                url: authorize_url,
                app_id: grant.app_id(),
                location_id,
                error: error.as_ref(),
            },
            Self::Complete { entry_id, .. } => Prompt::Finished { entry_id },
            Self::Aborted(reason) => Prompt::Aborted(*reason),
        })
    }
}
