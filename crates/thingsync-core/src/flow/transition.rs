use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, error, info, warn};
use url::Url;

use thingsync_api::install_url;
use thingsync_api::types::LocationSummary;

use super::app::{AppRegistration, ensure_app};
use super::credential::is_valid_token_format;
use super::{AbortReason, AppGrant, FlowError, FlowEvent, FlowState};
use crate::config::{ApiSettings, AppProfile, EndpointConfig};
use crate::error::CoreError;
use crate::model::{InstallationRecord, InstallationStore};
use crate::smartapp::{SmartApp, SmartAppManager};
use crate::webhook::WebhookRegistry;

/// Collaborators a handshake needs.
pub struct FlowContext {
    pub api: ApiSettings,
    pub endpoint: EndpointConfig,
    pub profile: AppProfile,
    pub webhooks: Arc<WebhookRegistry>,
    pub manager: Arc<SmartAppManager>,
    pub store: Arc<dyn InstallationStore>,
}

/// Drives one handshake, one event at a time.
pub struct InstallFlow {
    ctx: FlowContext,
}

impl InstallFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    /// Apply `event` to `state`.
    ///
    /// Events a state does not understand re-render it unchanged; terminal
    /// states ignore everything.
    pub async fn transition(&self, state: FlowState, event: FlowEvent) -> FlowState {
        match (state, event) {
            (FlowState::Init { endpoints_initialized }, _) => self.enter(endpoints_initialized),

            (FlowState::AwaitUserConfirmation { .. }, FlowEvent::Confirm) => {
                match self.reachable_webhook_url() {
                    Some(_) => {
                        debug!("webhook confirmed, awaiting access token");
                        FlowState::AwaitCredential { error: None }
                    }
                    None => FlowState::Aborted(AbortReason::UnreachableWebhook),
                }
            }

            (FlowState::AwaitCredential { .. }, FlowEvent::SubmitToken(token)) => {
                self.submit_token(token).await
            }

            (FlowState::SelectLocation { grant, locations, .. }, FlowEvent::Show) => {
                self.list_locations(grant, locations).await
            }

            (
                FlowState::SelectLocation { grant, locations, .. },
                FlowEvent::SelectLocation(location_id),
            ) => {
                Self::select_location(grant, locations, location_id)
            }

            (
                FlowState::Authorize {
                    grant,
                    location_id,
                    authorize_url,
                    ..
                },
                FlowEvent::Authorized {
                    installed_app_id,
                    refresh_token,
                },
            ) => self.complete(grant, location_id, authorize_url, installed_app_id, refresh_token),

            (state, _) => state,
        }
    }

    // ── Steps ────────────────────────────────────────────────────────

    fn enter(&self, endpoints_initialized: bool) -> FlowState {
        let webhook_id = &self.ctx.endpoint.webhook_id;
        if !endpoints_initialized && !self.ctx.webhooks.contains(webhook_id) {
            self.ctx
                .webhooks
                .register(webhook_id.clone(), Arc::clone(&self.ctx.manager));
        }

        match self.reachable_webhook_url() {
            Some(webhook_url) => FlowState::AwaitUserConfirmation { webhook_url },
            None => FlowState::Aborted(AbortReason::UnreachableWebhook),
        }
    }

    fn reachable_webhook_url(&self) -> Option<Url> {
        let endpoint = &self.ctx.endpoint;
        let url = endpoint.webhook_url().ok().filter(|_| endpoint.is_publicly_reachable());
        if url.is_none() {
            error!(
                public_url = %endpoint.public_url,
                "invalid webhook URL, ensure it is reachable from the internet"
            );
        }
        url
    }

    async fn submit_token(&self, token: String) -> FlowState {
        if !is_valid_token_format(&token) {
            warn!("invalid token format provided");
            return FlowState::AwaitCredential {
                error: Some(FlowError::TokenInvalidFormat),
            };
        }

        let access_token = SecretString::from(token);
        let app = match self.provision_app(&access_token).await {
            Ok(app) => app,
            Err(e) => {
                error!(error = %e, "error validating token or setting up the app");
                return FlowState::AwaitCredential {
                    error: Some(FlowError::AppSetup(e.to_string())),
                };
            }
        };

        self.ctx.manager.register_app(SmartApp::new(
            app.app_id.clone(),
            self.ctx.profile.display_name.clone(),
            self.ctx.profile.description.clone(),
        ));
        debug!(app_id = %app.app_id, "token validated, listing locations");

        let grant = AppGrant { access_token, app };
        self.list_locations(grant, Vec::new()).await
    }

    async fn provision_app(&self, access_token: &SecretString) -> Result<AppRegistration, CoreError> {
        let target_url = self.ctx.endpoint.webhook_url()?;
        let client = self.ctx.api.client(access_token)?;
        ensure_app(
            &client,
            &self.ctx.endpoint.instance_id,
            target_url.as_str(),
            &self.ctx.profile,
        )
        .await
    }

    async fn fetch_locations(&self, access_token: &SecretString) -> Result<Vec<LocationSummary>, CoreError> {
        let client = self.ctx.api.client(access_token)?;
        Ok(client.list_locations().await?)
    }

    async fn list_locations(&self, grant: AppGrant, previous: Vec<LocationSummary>) -> FlowState {
        match self.fetch_locations(&grant.access_token).await {
            Ok(locations) if locations.is_empty() => {
                error!("no available locations found");
                FlowState::Aborted(AbortReason::NoLocations)
            }
            Ok(locations) => FlowState::SelectLocation {
                grant,
                locations,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "failed to list locations");
                FlowState::SelectLocation {
                    grant,
                    locations: previous,
                    error: Some(FlowError::LocationsUnavailable(e.to_string())),
                }
            }
        }
    }

    fn select_location(
        grant: AppGrant,
        locations: Vec<LocationSummary>,
        location_id: String,
    ) -> FlowState {
        if !locations.iter().any(|l| l.location_id == location_id) {
            return FlowState::SelectLocation {
                grant,
                locations,
                error: Some(FlowError::UnknownLocation(location_id)),
            };
        }

        match install_url(grant.app_id(), &location_id) {
            Ok(authorize_url) => {
                debug!(%location_id, "location selected, awaiting authorization");
                FlowState::Authorize {
                    grant,
                    location_id,
                    authorize_url,
                    error: None,
                }
            }
            Err(e) => FlowState::SelectLocation {
                grant,
                locations,
                error: Some(FlowError::AuthorizeUrl(e.to_string())),
            },
        }
    }

    fn complete(
        &self,
        grant: AppGrant,
        location_id: String,
        authorize_url: Url,
        installed_app_id: String,
        refresh_token: SecretString,
    ) -> FlowState {
        let record = InstallationRecord {
            access_token: grant.access_token.clone(),
            refresh_token,
            oauth_client_id: grant.app.oauth_client.as_ref().map(|c| c.client_id.clone()),
            oauth_client_secret: grant
                .app
                .oauth_client
                .as_ref()
                .map(|c| c.client_secret.clone()),
            location_id: location_id.clone(),
            app_id: grant.app.app_id.clone(),
            installed_app_id,
        };

        match self.ctx.store.persist(&record) {
            Ok(entry_id) => {
                self.ctx.manager.attach_installation(record.context(&entry_id));
                info!(
                    %entry_id,
                    installed_app_id = %record.installed_app_id,
                    "installation complete"
                );
                FlowState::Complete { entry_id, record }
            }
            Err(e) => {
                error!(error = %e, "failed to persist installation");
                FlowState::Authorize {
                    grant,
                    location_id,
                    authorize_url,
                    error: Some(FlowError::Persist(e.to_string())),
                }
            }
        }
    }
}
