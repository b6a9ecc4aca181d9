// ── SmartApp lifecycle manager ──
//
// Owns the registered apps and the attached installation contexts for one
// webhook endpoint, answers lifecycle callbacks, and broadcasts typed
// notices for everything that has a side effect outside this module.

use std::sync::Arc;

use axum::http::HeaderMap;
use dashmap::DashMap;
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use thingsync_api::auth::APP_OAUTH_SCOPES;

use super::lifecycle::{
    ConfigurationPhase, DeviceEvent, Empty, EventType, Lifecycle, LifecycleRequest,
    LifecycleResponse, PingResponse,
};
use super::{LifecycleError, SignatureVerifier};

const NOTICE_CAPACITY: usize = 64;

/// An app registration this endpoint answers for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartApp {
    pub app_id: String,
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
}

impl SmartApp {
    pub fn new(
        app_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
            description: description.into(),
            permissions: APP_OAUTH_SCOPES.iter().map(|&s| s.to_owned()).collect(),
        }
    }
}

/// Correlates an installed app with the persisted record it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledAppContext {
    pub entry_id: String,
    pub installed_app_id: String,
    pub location_id: String,
    pub app_id: String,
}

/// Side effects of lifecycle callbacks, for whoever is listening.
#[derive(Debug, Clone)]
pub enum LifecycleNotice {
    /// The user finished authorizing an installation.
    Installed {
        app_id: String,
        installed_app_id: String,
        location_id: String,
        auth_token: SecretString,
        refresh_token: SecretString,
    },
    Updated {
        app_id: String,
        installed_app_id: String,
        location_id: String,
    },
    Uninstalled {
        app_id: String,
        installed_app_id: String,
        /// Entry of the detached context, if one was attached.
        entry_id: Option<String>,
    },
    /// Devices were added to or removed from an attached installation.
    DevicesChanged { context: InstalledAppContext },
    DeviceEvents {
        context: InstalledAppContext,
        events: Vec<DeviceEvent>,
    },
}

impl LifecycleNotice {
    pub fn installed_app_id(&self) -> &str {
        match self {
            Self::Installed {
                installed_app_id, ..
            }
            | Self::Updated {
                installed_app_id, ..
            }
            | Self::Uninstalled {
                installed_app_id, ..
            } => installed_app_id,
            Self::DevicesChanged { context } | Self::DeviceEvents { context, .. } => {
                &context.installed_app_id
            }
        }
    }
}

/// Lifecycle callback handler shared by every delivery to one webhook.
pub struct SmartAppManager {
    target_url: String,
    apps: DashMap<String, SmartApp>,
    installations: DashMap<String, InstalledAppContext>,
    notices: broadcast::Sender<LifecycleNotice>,
    verifier: Arc<dyn SignatureVerifier>,
    http: reqwest::Client,
}

impl SmartAppManager {
    /// `target_url` is the public webhook URL echoed back on confirmation;
    /// `http` fetches confirmation URLs.
    pub fn new(
        target_url: impl Into<String>,
        http: reqwest::Client,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            target_url: target_url.into(),
            apps: DashMap::new(),
            installations: DashMap::new(),
            notices,
            verifier,
            http,
        }
    }

    // ── Registry ─────────────────────────────────────────────────────

    /// Register (or replace) an app this endpoint answers for.
    pub fn register_app(&self, app: SmartApp) {
        debug!(app_id = %app.app_id, "registered smartapp");
        self.apps.insert(app.app_id.clone(), app);
    }

    pub fn is_registered(&self, app_id: &str) -> bool {
        self.apps.contains_key(app_id)
    }

    pub fn attach_installation(&self, context: InstalledAppContext) {
        debug!(
            installed_app_id = %context.installed_app_id,
            entry_id = %context.entry_id,
            "attached installation"
        );
        self.installations
            .insert(context.installed_app_id.clone(), context);
    }

    pub fn detach_installation(&self, installed_app_id: &str) -> Option<InstalledAppContext> {
        self.installations
            .remove(installed_app_id)
            .map(|(_, context)| context)
    }

    pub fn installation(&self, installed_app_id: &str) -> Option<InstalledAppContext> {
        self.installations
            .get(installed_app_id)
            .map(|c| c.value().clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: LifecycleNotice) {
        if self.notices.send(notice).is_err() {
            debug!("no listeners for lifecycle notice");
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Answer one lifecycle callback.
    ///
    /// `PING` is answered without any app lookup or signature check; every
    /// other phase requires a registered app and a verified request.
    pub async fn handle_request(
        &self,
        request: LifecycleRequest,
        headers: &HeaderMap,
    ) -> Result<LifecycleResponse, LifecycleError> {
        if request.lifecycle == Lifecycle::Ping {
            let data = request
                .ping_data
                .ok_or(LifecycleError::MissingData(Lifecycle::Ping))?;
            return Ok(LifecycleResponse::Ping {
                ping_data: PingResponse {
                    challenge: data.challenge,
                },
            });
        }

        let app_id = request
            .target_app_id()
            .ok_or(LifecycleError::MissingAppId)?
            .to_owned();
        let app = self
            .apps
            .get(&app_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| LifecycleError::UnknownApp(app_id.clone()))?;

        self.verifier.verify(&request, headers)?;

        match request.lifecycle {
            Lifecycle::Confirmation => self.confirm(request).await,
            Lifecycle::Configuration => Self::configure(&app, request),
            Lifecycle::Install => self.install(&app, request),
            Lifecycle::Update => self.update(&app, request),
            Lifecycle::Event => Ok(self.event(request)),
            Lifecycle::Uninstall => self.uninstall(&app, request),
            Lifecycle::OauthCallback => Ok(LifecycleResponse::OauthCallback {
                oauth_callback_data: Empty {},
            }),
            Lifecycle::Ping | Lifecycle::Unknown => Err(LifecycleError::Unsupported),
        }
    }

    async fn confirm(&self, request: LifecycleRequest) -> Result<LifecycleResponse, LifecycleError> {
        let data = request
            .confirmation_data
            .ok_or(LifecycleError::MissingData(Lifecycle::Confirmation))?;

        debug!(app_id = %data.app_id, "confirming webhook target");
        self.http
            .get(&data.confirmation_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(LifecycleError::Confirmation)?;
        info!(app_id = %data.app_id, "webhook target confirmed");

        Ok(LifecycleResponse::Confirmation {
            target_url: self.target_url.clone(),
        })
    }

    fn configure(app: &SmartApp, request: LifecycleRequest) -> Result<LifecycleResponse, LifecycleError> {
        let data = request
            .configuration_data
            .ok_or(LifecycleError::MissingData(Lifecycle::Configuration))?;

        let configuration_data = match data.phase {
            ConfigurationPhase::Initialize => json!({
                "initialize": {
                    "name": app.name,
                    "description": app.description,
                    "id": "main",
                    "permissions": app.permissions,
                    "firstPageId": "1"
                }
            }),
            ConfigurationPhase::Page => json!({
                "page": {
                    "pageId": "1",
                    "name": app.name,
                    "nextPageId": null,
                    "previousPageId": null,
                    "complete": true,
                    "sections": [{
                        "settings": [{
                            "id": "info",
                            "name": app.name,
                            "description": app.description,
                            "type": "PARAGRAPH",
                            "defaultValue": "Press done to finish the installation."
                        }]
                    }]
                }
            }),
        };

        Ok(LifecycleResponse::Configuration { configuration_data })
    }

    fn install(&self, app: &SmartApp, request: LifecycleRequest) -> Result<LifecycleResponse, LifecycleError> {
        let data = request
            .install_data
            .ok_or(LifecycleError::MissingData(Lifecycle::Install))?;

        info!(
            app_id = %app.app_id,
            installed_app_id = %data.installed_app.installed_app_id,
            location_id = %data.installed_app.location_id,
            "smartapp installed"
        );
        self.notify(LifecycleNotice::Installed {
            app_id: app.app_id.clone(),
            installed_app_id: data.installed_app.installed_app_id,
            location_id: data.installed_app.location_id,
            auth_token: SecretString::from(data.auth_token),
            refresh_token: SecretString::from(data.refresh_token),
        });

        Ok(LifecycleResponse::Install {
            install_data: Empty {},
        })
    }

    fn update(&self, app: &SmartApp, request: LifecycleRequest) -> Result<LifecycleResponse, LifecycleError> {
        let data = request
            .update_data
            .ok_or(LifecycleError::MissingData(Lifecycle::Update))?;

        debug!(
            installed_app_id = %data.installed_app.installed_app_id,
            "smartapp updated"
        );
        self.notify(LifecycleNotice::Updated {
            app_id: app.app_id.clone(),
            installed_app_id: data.installed_app.installed_app_id,
            location_id: data.installed_app.location_id,
        });

        Ok(LifecycleResponse::Update {
            update_data: Empty {},
        })
    }

    fn event(&self, request: LifecycleRequest) -> LifecycleResponse {
        let response = LifecycleResponse::Event {
            event_data: Empty {},
        };
        let Some(data) = request.event_data else {
            return response;
        };

        let installed_app_id = &data.installed_app.installed_app_id;
        let Some(context) = self.installation(installed_app_id) else {
            debug!(installed_app_id, "ignoring events for unknown installation");
            return response;
        };

        let mut device_events = Vec::new();
        let mut devices_changed = false;
        for event in data.events {
            match event.event_type {
                EventType::DeviceEvent => device_events.extend(event.device_event),
                EventType::DeviceLifecycleEvent => devices_changed = true,
                EventType::Other => {}
            }
        }

        if !device_events.is_empty() {
            debug!(installed_app_id, count = device_events.len(), "device events received");
            self.notify(LifecycleNotice::DeviceEvents {
                context: context.clone(),
                events: device_events,
            });
        }
        if devices_changed {
            info!(installed_app_id, "devices changed at location");
            self.notify(LifecycleNotice::DevicesChanged { context });
        }

        response
    }

    fn uninstall(&self, app: &SmartApp, request: LifecycleRequest) -> Result<LifecycleResponse, LifecycleError> {
        let data = request
            .uninstall_data
            .ok_or(LifecycleError::MissingData(Lifecycle::Uninstall))?;

        let installed_app_id = data.installed_app.installed_app_id;
        let context = self.detach_installation(&installed_app_id);
        if context.is_none() {
            warn!(%installed_app_id, "uninstall for an installation that was never attached");
        }
        info!(%installed_app_id, "smartapp uninstalled");

        self.notify(LifecycleNotice::Uninstalled {
            app_id: app.app_id.clone(),
            installed_app_id,
            entry_id: context.map(|c| c.entry_id),
        });

        Ok(LifecycleResponse::Uninstall {
            uninstall_data: Empty {},
        })
    }
}
