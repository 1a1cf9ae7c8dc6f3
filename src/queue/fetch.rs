//! Fetch queue: a resolve queue that loads models through their api service.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use super::{PendingFetch, QueueConfig, QueueOptions, ResolveEvent, ResolveQueue, Resolver};
use crate::error::{ConfigError, Result};
use crate::model::{index_by_id, Model, ModelMap, Ref};
use crate::service::ModelApiService;

#[async_trait]
impl<T: Model> Resolver<T> for ModelApiService<T> {
    async fn resolve(&self, ids: &[String]) -> Result<ModelMap<T>> {
        Ok(index_by_id(self.fetch_all(ids).await?))
    }
}

pub struct FetchQueue<T> {
    queue: ResolveQueue<T>,
}

impl<T: Model> FetchQueue<T> {
    pub fn start(service: ModelApiService<T>, config: QueueConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            queue: ResolveQueue::start(service, config)?,
        })
    }

    /// Queue the referenced model by id.
    pub fn queue_fetch(&self, model: &Ref<T>, force: bool) -> PendingFetch<T> {
        self.queue.queue_with(model.id(), QueueOptions { force })
    }

    pub fn is_pending(&self, model: &Ref<T>) -> bool {
        self.queue.is_pending(model.id())
    }

    pub fn pending_fetch(&self, model: &Ref<T>) -> Option<PendingFetch<T>> {
        self.queue.pending_fetch(model.id())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResolveEvent<T>> {
        self.queue.subscribe()
    }

    pub fn all_resolved(&self) -> watch::Receiver<Arc<ModelMap<T>>> {
        self.queue.all_resolved()
    }

    pub fn resolve_queue(&self) -> &ResolveQueue<T> {
        &self.queue
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
