//! REST adapter for the storage API
//!
//! Implements [`StorageApi`] over `reqwest`: attaches the credential headers,
//! checks each response against the status the caller expects and turns
//! vendor error bodies into [`Error::RemoteCall`].

use super::config::ClientConfig;
use crate::domain::ports::StorageApi;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;

/// Detail used when an error response carries no usable vendor message
pub const NO_DETAILS: &str = "No details";

/// HTTP client bound to one storage cluster
pub struct RestClient {
    http: reqwest::Client,
    base_uri: String,
    address: String,
}

impl RestClient {
    /// Build a client from an immutable configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .default_headers(default_headers(config)?)
            .danger_accept_invalid_certs(!config.verify_tls)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_uri: config.endpoint.base_uri(),
            address: config.endpoint.address.clone(),
        })
    }

    /// Full URL of a resource path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_uri, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        expected: StatusCode,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = &body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;

        if status != expected {
            return Err(Error::RemoteCall {
                method: method.to_string(),
                url,
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                detail: error_detail(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

#[async_trait]
impl StorageApi for RestClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let body = self.send(Method::GET, path, StatusCode::OK, None).await?;
        Ok(body.unwrap_or(Value::Null))
    }

    async fn post(
        &self,
        path: &str,
        expected: StatusCode,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        self.send(Method::POST, path, expected, body).await
    }

    async fn patch(
        &self,
        path: &str,
        expected: StatusCode,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        self.send(Method::PATCH, path, expected, body).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, StatusCode::NO_CONTENT, None)
            .await
            .map(|_| ())
    }
}

/// Headers attached to every request
fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in config.credentials.headers() {
        let mut value = HeaderValue::from_str(value).map_err(|_| {
            Error::Configuration(format!("Invalid characters in '{}' credential", name))
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Extract the vendor error message from an error response body.
///
/// The body looks like `{"errorMsg": "...", "errorDetail": {"message": "..."}}`;
/// anything else yields [`NO_DETAILS`].
pub fn error_detail(body: &str) -> String {
    let Ok(message) = serde_json::from_str::<Value>(body) else {
        return NO_DETAILS.to_string();
    };
    let Some(error) = message.get("errorMsg").and_then(Value::as_str) else {
        return NO_DETAILS.to_string();
    };

    match message
        .get("errorDetail")
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
    {
        Some(detail) => format!("{} - {}", error, detail),
        None => error.to_string(),
    }
}
