// App registration discovery and provisioning.

use secrecy::SecretString;
use tracing::{debug, info};
use uuid::Uuid;

use thingsync_api::SmartThingsClient;
use thingsync_api::auth::APP_OAUTH_SCOPES;
use thingsync_api::types::{AppOAuth, AppRequest, AppResponse, AppSettings, WebhookSmartApp};

use crate::config::{APP_NAME_PREFIX, AppProfile, SETTINGS_INSTANCE_ID};
use crate::error::CoreError;

const APP_TYPE_WEBHOOK: &str = "WEBHOOK_SMART_APP";
const CLASSIFICATION_AUTOMATION: &str = "AUTOMATION";

/// OAuth client pair issued when an app registration is created.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// The app registration a handshake settled on.
#[derive(Debug, Clone)]
pub struct AppRegistration {
    pub app_id: String,
    /// Only present when the registration was created just now.
    pub oauth_client: Option<OAuthClient>,
}

/// Definition every registration owned by this deployment should carry.
pub fn app_definition(app_name: &str, target_url: &str, profile: &AppProfile) -> AppRequest {
    AppRequest {
        app_name: app_name.to_owned(),
        display_name: profile.display_name.clone(),
        description: profile.description.clone(),
        single_instance: true,
        classifications: vec![CLASSIFICATION_AUTOMATION.to_owned()],
        app_type: APP_TYPE_WEBHOOK.to_owned(),
        webhook_smart_app: WebhookSmartApp {
            target_url: target_url.to_owned(),
            public_key: None,
        },
    }
}

fn differs(current: &AppResponse, desired: &AppRequest) -> bool {
    current.target_url() != Some(desired.webhook_smart_app.target_url.as_str())
        || current.display_name.as_deref() != Some(desired.display_name.as_str())
        || current.description.as_deref() != Some(desired.description.as_str())
        || current.single_instance != desired.single_instance
        || current.classifications != desired.classifications
}

/// Find the registration whose settings carry `instance_id`.
pub async fn find_app(
    client: &SmartThingsClient,
    instance_id: &str,
) -> Result<Option<AppResponse>, CoreError> {
    let apps = client.list_apps().await?;
    for app in apps.iter().filter(|a| a.app_name.starts_with(APP_NAME_PREFIX)) {
        let settings = client.get_app_settings(&app.app_id).await?;
        if settings.settings.get(SETTINGS_INSTANCE_ID).map(String::as_str) == Some(instance_id) {
            debug!(app_id = %app.app_id, "found existing app registration");
            return Ok(Some(client.get_app(&app.app_id).await?));
        }
    }
    Ok(None)
}

/// Reuse this deployment's registration, or create one.
pub async fn ensure_app(
    client: &SmartThingsClient,
    instance_id: &str,
    target_url: &str,
    profile: &AppProfile,
) -> Result<AppRegistration, CoreError> {
    if let Some(app) = find_app(client, instance_id).await? {
        let desired = app_definition(&app.app_name, target_url, profile);
        if differs(&app, &desired) {
            client.update_app(&app.app_id, &desired).await?;
            info!(app_id = %app.app_id, "updated app registration");
        }
        return Ok(AppRegistration {
            app_id: app.app_id,
            oauth_client: None,
        });
    }

    let app_name = format!("{APP_NAME_PREFIX}{}", Uuid::new_v4().simple());
    let created = client
        .create_app(&app_definition(&app_name, target_url, profile))
        .await?;
    let app_id = created.app.app_id;
    info!(%app_id, %app_name, "created app registration");

    let settings = AppSettings {
        settings: [(SETTINGS_INSTANCE_ID.to_owned(), instance_id.to_owned())]
            .into_iter()
            .collect(),
    };
    client.update_app_settings(&app_id, &settings).await?;

    let oauth = AppOAuth {
        client_name: profile.oauth_client_name.clone(),
        scope: APP_OAUTH_SCOPES.iter().map(|&s| s.to_owned()).collect(),
    };
    client.update_app_oauth(&app_id, &oauth).await?;

    Ok(AppRegistration {
        app_id,
        oauth_client: Some(OAuthClient {
            client_id: created.oauth_client_id,
            client_secret: SecretString::from(created.oauth_client_secret),
        }),
    })
}
