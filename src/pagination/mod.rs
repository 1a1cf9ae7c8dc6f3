//! Paginated list responses
//!
//! Two protocols share one request description:
//!
//! - [`ResponsePage`]: numbered pages (`page=<n|last>`), with `next`/`previous` links.
//! - [`ResponseCursor`]: an accumulated prefix extended with `cursor=<last id>`.
//!
//! Both are immutable snapshots. Navigation returns a new value.

mod cursor;
mod page;

pub use cursor::{CursorRequest, ResponseCursor};
pub use page::{PageIndex, PageRequest, ResponsePage};

use std::sync::Arc;

use crate::backend::{Backend, Headers, Params, RequestOptions};
use crate::error::Result;
use crate::json::{Decoder, JsonObject, ObjectReader};

/// Where a list is fetched from and how its items are decoded.
pub struct Endpoint<T> {
    backend: Arc<dyn Backend>,
    path: Vec<String>,
    options: RequestOptions,
    item: Decoder<T>,
}

impl<T> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            path: self.path.clone(),
            options: self.options.clone(),
            item: self.item.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Endpoint<T> {
    pub fn new(backend: Arc<dyn Backend>, path: Vec<String>, item: Decoder<T>) -> Self {
        Self {
            backend,
            path,
            options: RequestOptions::default(),
            item,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.options.params = params;
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.options.headers = headers;
        self
    }

    pub fn pages(self) -> PageRequest<T>
    where
        T: Clone + Send + Sync,
    {
        PageRequest::new(self)
    }

    pub fn cursor(self) -> CursorRequest<T>
    where
        T: crate::model::Model,
    {
        CursorRequest::new(self)
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Query parameters the list was originally requested with.
    pub fn original_params(&self) -> &Params {
        &self.options.params
    }

    /// GET with `extra` merged over the original params.
    async fn get(&self, extra: Params) -> Result<JsonObject> {
        let options = RequestOptions {
            params: self.options.params.merged_with(&extra),
            headers: self.options.headers.clone(),
        };
        self.backend.get(&self.path, options).await
    }
}

/// Total count of a list response. Must be a non-negative integer.
fn read_count(obj: &mut ObjectReader<'_>) -> std::result::Result<usize, crate::json::DecodeError> {
    let count = obj.field("count", &crate::json::integer())?;
    usize::try_from(count).map_err(|_| obj.error(format!("Invalid count {count}")))
}
