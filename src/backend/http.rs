//! HTTP backend
//!
//! reqwest-based [`Backend`]. Adds the query and header conventions the api
//! expects and normalizes response keys to camelCase.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::keys::{to_lower_camel_case, to_snake_case, transform_keys, transform_object_keys};
use super::{build_url, Backend, Params, RequestOptions};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::json::{json_type_of, JsonObject};

/// Supplies the `authorization` header for outgoing requests.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authorization(&self) -> Result<Option<String>>;
}

/// Sends requests without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthentication;

#[async_trait]
impl Authenticator for NoAuthentication {
    async fn authorization(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Fixed header value, e.g. `Token abc123`.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl Authenticator for StaticToken {
    async fn authorization(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

pub struct HttpBackend {
    client: Client,
    base_href: String,
    authenticator: Arc<dyn Authenticator>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_href: config.api_base_href.clone(),
            authenticator: Arc::new(NoAuthentication),
        })
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn base_href(&self) -> &str {
        &self.base_href
    }

    /// Full url for `path` with `params` as the query string.
    pub fn api_url(&self, path: &[String], params: &Params) -> Result<String> {
        let url = build_url(&self.base_href, path)?;
        let url = Url::parse_with_params(&url, params.pairs()).map_err(|e| {
            ClientError::InvalidPath {
                path: path.to_vec(),
                reason: e.to_string(),
            }
        })?;
        Ok(url.to_string())
    }

    async fn send(
        &self,
        method: Method,
        path: &[String],
        body: Option<JsonObject>,
        options: RequestOptions,
    ) -> Result<JsonObject> {
        let url = build_url(&self.base_href, path)?;
        let params = options.params.set("format", "json");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .query(&params.pairs())
            .header("x-requested-with", "XMLHttpRequest");

        if !options.headers.contains(AUTHORIZATION.as_str()) {
            if let Some(value) = self.authenticator.authorization().await? {
                request = request.header(AUTHORIZATION, value);
            }
        }
        for (name, value) in options.headers.iter() {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            let body = transform_object_keys(body, &to_snake_case);
            request = request.json(&Value::Object(body));
        }

        debug!(method = %method, url = %url, "Sending api request");
        let started = std::time::Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Api response"
        );

        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                url,
                body: text,
            });
        }
        parse_response(&text)
    }
}

/// Parse a response body and normalize its keys.
///
/// An empty body (e.g. `204 No Content`) is an empty object.
pub(crate) fn parse_response(text: &str) -> Result<JsonObject> {
    if text.trim().is_empty() {
        return Ok(JsonObject::new());
    }
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ClientError::InvalidResponse(format!("response is not json: {e}")))?;
    match transform_keys(value, &to_lower_camel_case) {
        Value::Object(object) => Ok(object),
        other => Err(ClientError::InvalidResponse(format!(
            "expected a json object at the response root, got {}",
            json_type_of(&other).unwrap_or_else(|| "unknown".to_string())
        ))),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get(&self, path: &[String], options: RequestOptions) -> Result<JsonObject> {
        self.send(Method::GET, path, None, options).await
    }

    async fn post(
        &self,
        path: &[String],
        body: JsonObject,
        options: RequestOptions,
    ) -> Result<JsonObject> {
        self.send(Method::POST, path, Some(body), options).await
    }

    async fn put(
        &self,
        path: &[String],
        body: JsonObject,
        options: RequestOptions,
    ) -> Result<JsonObject> {
        self.send(Method::PUT, path, Some(body), options).await
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_href", &self.base_href)
            .finish_non_exhaustive()
    }
}
