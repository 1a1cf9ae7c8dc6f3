//! Model api services
//!
//! [`ModelApiService`] binds a [`Backend`] to the base path of one model kind
//! and provides the generic operations every concrete service builds on.
//!
//! Paths are given as segments relative to the base path. A detail path is
//! `<base>/<type>/<id>/<extra...>`.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{Backend, Params, RequestOptions};
use crate::error::{ClientError, Result};
use crate::json::{Decoder, JsonObject};
use crate::model::{Model, Ref};
use crate::pagination::{Endpoint, ResponseCursor, ResponsePage};

/// A list embedded in a materialized model, with its total size.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedded<U> {
    pub items: Vec<U>,
    /// The model's `<property>Count` value, if it carries one.
    pub count: Option<usize>,
}

impl<U> Embedded<U> {
    pub fn new(items: Vec<U>, count: Option<usize>) -> Self {
        Self { items, count }
    }
}

pub struct ModelApiService<T> {
    backend: Arc<dyn Backend>,
    base_path: Vec<String>,
    decoder: Decoder<T>,
}

impl<T> Clone for ModelApiService<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            base_path: self.base_path.clone(),
            decoder: self.decoder.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ModelApiService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelApiService")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl<T: Model> ModelApiService<T> {
    /// `decoder` is the default decoder for `T`, used by `fetch` and `fetch_all`.
    pub fn new<I, S>(backend: Arc<dyn Backend>, base_path: I, decoder: Decoder<T>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend,
            base_path: base_path.into_iter().map(Into::into).collect(),
            decoder,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn base_path(&self) -> &[String] {
        &self.base_path
    }

    pub fn decoder(&self) -> &Decoder<T> {
        &self.decoder
    }

    pub fn abs_path(&self, path: &[&str]) -> Vec<String> {
        self.base_path
            .iter()
            .cloned()
            .chain(path.iter().map(|segment| segment.to_string()))
            .collect()
    }

    pub fn detail_path(&self, model: &Ref<T>, extra: &[&str]) -> Vec<String> {
        let mut path = self.abs_path(&[T::TYPE, model.id()]);
        path.extend(extra.iter().map(|segment| segment.to_string()));
        path
    }

    /// A list endpoint relative to the base path.
    pub fn endpoint<U: 'static>(&self, path: &[&str], item: Decoder<U>) -> Endpoint<U> {
        Endpoint::new(Arc::clone(&self.backend), self.abs_path(path), item)
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// The model itself when already materialized, otherwise a GET of its detail path.
    pub async fn fetch(&self, model: &Ref<T>) -> Result<T> {
        if let Ref::Model(model) = model {
            return Ok(model.clone());
        }
        let body = self
            .backend
            .get(&self.detail_path(model, &[]), RequestOptions::default())
            .await?;
        Ok(self.decoder.decode_object(body)?)
    }

    /// Fetch several models in one request.
    ///
    /// The `resolve` query always fits in a single page, so only the first
    /// page is read.
    pub async fn fetch_all(&self, ids: &[String]) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = ids.len(), model = T::TYPE, "Fetching models by id");
        let page = self
            .query(&[], Params::new().set("resolve", ids.join(",")), self.decoder.clone())
            .await?;
        Ok(page.into_results())
    }

    // =========================================================================
    // Lists
    // =========================================================================

    pub async fn query<U>(
        &self,
        path: &[&str],
        params: Params,
        item: Decoder<U>,
    ) -> Result<ResponsePage<U>>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.endpoint(path, item).params(params).pages().fetch().await
    }

    /// A query known to match at most one object.
    ///
    /// A 404 response is `Ok(None)`. Any other response must contain exactly
    /// one result.
    pub async fn query_unique<U>(
        &self,
        path: &[&str],
        params: Params,
        decoder: Decoder<U>,
    ) -> Result<Option<U>>
    where
        U: Clone + Send + Sync + 'static,
    {
        let page = match self.query(path, params, decoder).await {
            Ok(page) => page,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        if page.count() != 1 {
            return Err(ClientError::NotUnique {
                count: page.count(),
            });
        }
        page.into_results()
            .into_iter()
            .next()
            .map(Some)
            .ok_or_else(|| ClientError::InvalidResponse("count is 1 but results are empty".into()))
    }

    pub async fn select<U: Model>(
        &self,
        path: &[&str],
        params: Params,
        item: Decoder<U>,
    ) -> Result<ResponseCursor<U>> {
        self.endpoint(path, item).params(params).cursor().fetch().await
    }

    /// Pages of a list property of `model`.
    ///
    /// A materialized model supplies the first page from `embedded` without a
    /// request. It must carry a count for the property.
    pub async fn query_property<U, E>(
        &self,
        model: &Ref<T>,
        property: &str,
        embedded: E,
        item: Decoder<U>,
    ) -> Result<ResponsePage<U>>
    where
        U: Clone + Send + Sync + 'static,
        E: FnOnce(&T) -> Embedded<U> + Send,
    {
        let request = self.property_endpoint(model, property, item).pages();
        match model.as_model() {
            Some(materialized) => {
                let Embedded { items, count } = embedded(materialized);
                let count = count.ok_or_else(|| ClientError::MissingCount {
                    property: property.to_string(),
                })?;
                Ok(request.precached(count, items))
            }
            None => request.fetch().await,
        }
    }

    /// Cursor over a list property of `model`. See [`Self::query_property`].
    pub async fn select_property<U, E>(
        &self,
        model: &Ref<T>,
        property: &str,
        embedded: E,
        item: Decoder<U>,
    ) -> Result<ResponseCursor<U>>
    where
        U: Model,
        E: FnOnce(&T) -> Embedded<U> + Send,
    {
        let request = self.property_endpoint(model, property, item).cursor();
        match model.as_model() {
            Some(materialized) => {
                let Embedded { items, count } = embedded(materialized);
                let count = count.ok_or_else(|| ClientError::MissingCount {
                    property: property.to_string(),
                })?;
                Ok(request.precached(count, items))
            }
            None => request.fetch().await,
        }
    }

    fn property_endpoint<U: 'static>(
        &self,
        model: &Ref<T>,
        property: &str,
        item: Decoder<U>,
    ) -> Endpoint<U> {
        Endpoint::new(
            Arc::clone(&self.backend),
            self.detail_path(model, &[property]),
            item,
        )
    }

    // =========================================================================
    // Raw requests
    // =========================================================================

    pub async fn get<R: 'static>(
        &self,
        path: &[&str],
        options: RequestOptions,
        decoder: &Decoder<R>,
    ) -> Result<R> {
        let body = self.backend.get(&self.abs_path(path), options).await?;
        Ok(decoder.decode_object(body)?)
    }

    pub async fn post<R: 'static>(
        &self,
        path: &[&str],
        body: JsonObject,
        options: RequestOptions,
        decoder: &Decoder<R>,
    ) -> Result<R> {
        let response = self
            .backend
            .post(&self.abs_path(path), body, options)
            .await?;
        Ok(decoder.decode_object(response)?)
    }

    pub async fn put<R: 'static>(
        &self,
        path: &[&str],
        body: JsonObject,
        options: RequestOptions,
        decoder: &Decoder<R>,
    ) -> Result<R> {
        let response = self
            .backend
            .put(&self.abs_path(path), body, options)
            .await?;
        Ok(decoder.decode_object(response)?)
    }

    pub async fn post_detail<R: 'static>(
        &self,
        model: &Ref<T>,
        path: &[&str],
        body: JsonObject,
        options: RequestOptions,
        decoder: &Decoder<R>,
    ) -> Result<R> {
        let response = self
            .backend
            .post(&self.detail_path(model, path), body, options)
            .await?;
        Ok(decoder.decode_object(response)?)
    }

    pub async fn put_detail<R: 'static>(
        &self,
        model: &Ref<T>,
        path: &[&str],
        body: JsonObject,
        options: RequestOptions,
        decoder: &Decoder<R>,
    ) -> Result<R> {
        let response = self
            .backend
            .put(&self.detail_path(model, path), body, options)
            .await?;
        Ok(decoder.decode_object(response)?)
    }
}
