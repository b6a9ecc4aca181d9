use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// Public REST endpoint of the SmartThings platform.
pub const DEFAULT_BASE_URL: &str = "https://api.smartthings.com/v1/";

/// Landing page that walks the user through installing a SmartApp
/// into one of their locations.
pub const INSTALL_BASE_URL: &str = "https://strongman-regional.api.smartthings.com/";

/// OAuth scopes requested for the installed app.
pub const APP_OAUTH_SCOPES: &[&str] = &["r:devices:*"];

/// Default headers carrying the bearer token.
///
/// The header value is marked sensitive so it never shows up in
/// `reqwest`'s debug output.
pub fn bearer_headers(token: &SecretString) -> Result<HeaderMap, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())).map_err(
        |e| Error::Authentication {
            message: format!("invalid token header value: {e}"),
        },
    )?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// URL the user opens to authorize (install) an app into a location.
///
/// The platform calls the app's webhook with an `INSTALL` lifecycle once
/// the user finishes the flow on that page.
pub fn install_url(app_id: &str, location_id: &str) -> Result<Url, Error> {
    let mut url = Url::parse(INSTALL_BASE_URL)?;
    url.query_pairs_mut()
        .append_pair("appId", app_id)
        .append_pair("locationId", location_id);
    Ok(url)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn install_url_carries_app_and_location() {
        let url = install_url("app-1", "loc-9").unwrap();
        assert_eq!(
            url.as_str(),
            "https://strongman-regional.api.smartthings.com/?appId=app-1&locationId=loc-9"
        );
    }

    #[test]
    fn bearer_header_is_sensitive() {
        let token: SecretString = "abc".to_string().into();
        let headers = bearer_headers(&token).unwrap();
        let value = headers.get(AUTHORIZATION).unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().unwrap(), "Bearer abc");
    }
}
