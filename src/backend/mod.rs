//! Backend abstraction
//!
//! The core never talks HTTP directly. Everything goes through [`Backend`],
//! which takes a path (as segments), query parameters and headers, and
//! returns a JSON object whose keys are already in the client's camelCase
//! convention.

mod http;
mod keys;

pub use http::{Authenticator, HttpBackend, NoAuthentication, StaticToken};
pub use keys::{to_lower_camel_case, to_snake_case, transform_keys, transform_object_keys};

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{ClientError, Result};
use crate::json::JsonObject;

/// Abstract wire transport.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, path: &[String], options: RequestOptions) -> Result<JsonObject>;

    async fn post(
        &self,
        path: &[String],
        body: JsonObject,
        options: RequestOptions,
    ) -> Result<JsonObject>;

    async fn put(
        &self,
        path: &[String],
        body: JsonObject,
        options: RequestOptions,
    ) -> Result<JsonObject>;
}

// =============================================================================
// Request types
// =============================================================================

/// Query parameters. A key may carry several values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, Vec<String>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of `key` with `value`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), vec![value.into()]);
        self
    }

    /// Replace all values of `key`.
    pub fn set_all<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Add a value to `key`, keeping existing ones.
    pub fn append(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.values.remove(key);
        self
    }

    /// `self` with every key of `other` overriding ours.
    pub fn merged_with(&self, other: &Params) -> Self {
        let mut merged = self.clone();
        for (key, values) in &other.values {
            merged.values.insert(key.clone(), values.clone());
        }
        merged
    }

    /// First value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flattened `(key, value)` pairs, in key order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |v| (key.clone(), v.clone())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Params::new(), |params, (k, v)| params.append(k, v))
    }
}

/// Request headers. Names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    values: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.values
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Query parameters and headers for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub params: Params,
    pub headers: Headers,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params = self.params.set(key, value);
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

// =============================================================================
// Paths
// =============================================================================

/// Join path segments onto the api base href.
///
/// The first segment must begin with `/`. Every segment is given a trailing
/// slash, so `["/schools", "students", "s1"]` becomes `<base>/schools/students/s1/`.
pub fn build_url(base_href: &str, path: &[String]) -> Result<String> {
    let Some(first) = path.first() else {
        return Err(ClientError::InvalidPath {
            path: Vec::new(),
            reason: "path must have at least one component".to_string(),
        });
    };
    if !first.starts_with('/') {
        return Err(ClientError::InvalidPath {
            path: path.to_vec(),
            reason: "first path component must begin with an '/'".to_string(),
        });
    }

    let mut url = base_href.trim_end_matches('/').to_string();
    for segment in path {
        url.push_str(segment);
        if !segment.ends_with('/') {
            url.push('/');
        }
    }
    Ok(url)
}

/// Own a list of string-like segments.
pub fn path<I, S>(segments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    segments.into_iter().map(Into::into).collect()
}
