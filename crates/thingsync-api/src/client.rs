// Hand-crafted async HTTP client for the SmartThings REST API.
//
// Base path: https://api.smartthings.com/v1/
// Auth: `Authorization: Bearer <token>` header

use std::collections::HashSet;

use reqwest::StatusCode;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::Error;
use crate::auth;
use crate::transport::TransportConfig;
use crate::types;

// ── Error response shape from the API ────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the SmartThings REST API.
///
/// Every request carries the bearer token the client was built with,
/// so one client corresponds to one credential (a personal access token
/// or an installed app's token).
#[derive(Debug, Clone)]
pub struct SmartThingsClient {
    http: reqwest::Client,
    base_url: Url,
}

impl SmartThingsClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a bearer token and transport config.
    pub fn from_token(
        base_url: &str,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client_with_headers(auth::bearer_headers(token)?)?;
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Ensure the base URL ends with `/` so relative joins append.
    ///
    /// `https://api.smartthings.com/v1` and `https://api.smartthings.com/v1/`
    /// both become the latter.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Join a relative path (e.g. `"apps"`) onto the base URL.
    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get_url<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {url}");
        let resp = self.http.get(url).send().await?;
        self.handle_response(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.get_url(self.url(path)?).await
    }

    async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self.http.get(url).query(params).send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        self.handle_response(resp).await
    }

    async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("PUT {url}");

        let resp = self.http.put(url).json(body).send().await?;
        self.handle_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("DELETE {url}");

        let resp = self.http.delete(url).send().await?;
        self.handle_empty(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn handle_empty(&self, resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn parse_error(&self, status: StatusCode, resp: reqwest::Response) -> Error {
        if status == StatusCode::UNAUTHORIZED {
            return Error::InvalidToken;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1);
            return Error::RateLimited { retry_after_secs };
        }

        let raw = resp.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ErrorResponse>(&raw)
            .ok()
            .and_then(|r| r.error);

        let (message, code) = match parsed {
            Some(body) => (
                body.message.unwrap_or_else(|| status.to_string()),
                body.code,
            ),
            None if raw.is_empty() => (status.to_string(), None),
            None => (raw, None),
        };

        if status == StatusCode::FORBIDDEN {
            return Error::Forbidden { message };
        }

        Error::Api {
            status: status.as_u16(),
            message,
            code,
        }
    }

    // ── Pagination helper ────────────────────────────────────────────

    /// Fetch a list endpoint and follow `_links.next` until exhausted.
    ///
    /// A next link that was already fetched ends the walk.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, Error> {
        let mut page: types::Page<T> = self.get_with_params(path, params).await?;
        let mut all = std::mem::take(&mut page.items);
        let mut seen = HashSet::new();

        while let Some(next) = page.next_href() {
            // Links are normally absolute; fall back to resolving against the base.
            let url = Url::parse(next).or_else(|_| self.base_url.join(next))?;
            if !seen.insert(url.clone()) {
                warn!(path, next = %url, "pagination link repeats, stopping");
                break;
            }
            page = self.get_url(url).await?;
            all.append(&mut page.items);
        }

        Ok(all)
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    // ── Subscriptions ────────────────────────────────────────────────

    pub async fn list_subscriptions(
        &self,
        installed_app_id: &str,
    ) -> Result<Vec<types::SubscriptionResponse>, Error> {
        self.get_all(&format!("installedapps/{installed_app_id}/subscriptions"), &[])
            .await
    }

    pub async fn create_subscription(
        &self,
        installed_app_id: &str,
        request: &types::SubscriptionRequest,
    ) -> Result<types::SubscriptionResponse, Error> {
        self.post(
            &format!("installedapps/{installed_app_id}/subscriptions"),
            request,
        )
        .await
    }

    pub async fn delete_subscription(
        &self,
        installed_app_id: &str,
        subscription_id: &str,
    ) -> Result<(), Error> {
        self.delete(&format!(
            "installedapps/{installed_app_id}/subscriptions/{subscription_id}"
        ))
        .await
    }

    // ── Apps ─────────────────────────────────────────────────────────

    pub async fn list_apps(&self) -> Result<Vec<types::AppSummary>, Error> {
        self.get_all("apps", &[]).await
    }

    pub async fn get_app(&self, app_id: &str) -> Result<types::AppResponse, Error> {
        self.get(&format!("apps/{app_id}")).await
    }

    pub async fn create_app(
        &self,
        request: &types::AppRequest,
    ) -> Result<types::AppCreatedResponse, Error> {
        self.post("apps", request).await
    }

    pub async fn update_app(
        &self,
        app_id: &str,
        request: &types::AppRequest,
    ) -> Result<types::AppResponse, Error> {
        self.put(&format!("apps/{app_id}"), request).await
    }

    pub async fn get_app_settings(&self, app_id: &str) -> Result<types::AppSettings, Error> {
        self.get(&format!("apps/{app_id}/settings")).await
    }

    pub async fn update_app_settings(
        &self,
        app_id: &str,
        settings: &types::AppSettings,
    ) -> Result<types::AppSettings, Error> {
        self.put(&format!("apps/{app_id}/settings"), settings).await
    }

    pub async fn update_app_oauth(
        &self,
        app_id: &str,
        oauth: &types::AppOAuth,
    ) -> Result<types::AppOAuth, Error> {
        self.put(&format!("apps/{app_id}/oauth"), oauth).await
    }

    // ── Locations ────────────────────────────────────────────────────

    pub async fn list_locations(&self) -> Result<Vec<types::LocationSummary>, Error> {
        self.get_all("locations", &[]).await
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub async fn list_devices(
        &self,
        location_id: &str,
    ) -> Result<Vec<types::DeviceResponse>, Error> {
        self.get_all("devices", &[("locationId", location_id)]).await
    }
}
