//! Model loader
//!
//! Loads references through a [`FetchQueue`] and tracks which ids are in
//! flight, so callers can show loading state for a model.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{FetchQueue, PendingFetch, ResolveEvent};
use crate::model::{Model, Ref};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Fetch again even if the model was already loaded.
    pub force: bool,
}

type LoadingIds = Arc<Mutex<HashSet<String>>>;

fn lock(ids: &LoadingIds) -> MutexGuard<'_, HashSet<String>> {
    ids.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ModelLoader<T> {
    queue: Arc<FetchQueue<T>>,
    loading: LoadingIds,
    watcher: JoinHandle<()>,
}

impl<T: Model> ModelLoader<T> {
    /// Must be called from within a tokio runtime.
    pub fn new(queue: FetchQueue<T>) -> Self {
        let queue = Arc::new(queue);
        let loading = LoadingIds::default();
        let events = queue.subscribe();
        let watcher = tokio::spawn(watch_events(
            events,
            Arc::clone(&queue),
            Arc::clone(&loading),
        ));
        Self {
            queue,
            loading,
            watcher,
        }
    }

    /// Load `model`. A materialized reference settles immediately without a request.
    pub fn load(&self, model: &Ref<T>, options: LoadOptions) -> PendingFetch<T> {
        if let Ref::Model(materialized) = model {
            return PendingFetch::ready(materialized.id(), materialized.clone());
        }

        let id = model.id().to_string();
        lock(&self.loading).insert(id.clone());
        let fetch = self.queue.queue_fetch(model, options.force);
        // The event of a replaced fetch may have cleared the id in between.
        let mut loading = lock(&self.loading);
        if fetch.is_settled() {
            loading.remove(&id);
        } else {
            loading.insert(id);
        }
        drop(loading);
        fetch
    }

    pub fn is_loading(&self, model: &Ref<T>) -> bool {
        lock(&self.loading).contains(model.id())
    }

    /// Ids currently loading, sorted
    pub fn loading_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.loading).iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn queue(&self) -> &FetchQueue<T> {
        &self.queue
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
        lock(&self.loading).clear();
    }
}

impl<T> Drop for ModelLoader<T> {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Clear loading ids as their fetches settle.
async fn watch_events<T: Model>(
    mut events: broadcast::Receiver<ResolveEvent<T>>,
    queue: Arc<FetchQueue<T>>,
    loading: LoadingIds,
) {
    let pending = queue.resolve_queue();
    loop {
        match events.recv().await {
            // A forced reload may already have replaced the fetch this event settles.
            Ok(ResolveEvent::Resolved { id, .. }) => {
                if !pending.is_pending(&id) {
                    lock(&loading).remove(&id);
                }
            }
            Ok(ResolveEvent::Failed { ids, .. }) => {
                let mut loading = lock(&loading);
                for id in ids.iter().filter(|id| !pending.is_pending(id)) {
                    loading.remove(id);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Model loader fell behind resolve events");
                lock(&loading).retain(|id| pending.is_pending(id));
            }
            Err(RecvError::Closed) => {
                debug!("Resolve events closed");
                lock(&loading).clear();
                break;
            }
        }
    }
}
