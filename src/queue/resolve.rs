//! Batching resolve queue
//!
//! Callers queue ids and get back a [`PendingFetch`]. A dispatcher task
//! collects queued ids for one sample period, then hands up to `batch_size`
//! of them to a [`Resolver`] in a single call. Batch calls may overlap.
//!
//! Each id has at most one live fetch. Queueing an id again joins the
//! existing fetch whether or not it has settled, unless `force` is given.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::QueueConfig;
use crate::error::{ConfigError, QueueError, Result};
use crate::model::ModelMap;

/// Events buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Final outcome of a queued fetch
pub type Settled<T> = std::result::Result<T, QueueError>;

type Slot<T> = Arc<watch::Sender<Option<Settled<T>>>>;

// =============================================================================
// Resolver
// =============================================================================

/// Fetches a batch of values by id.
///
/// Ids absent from the returned map are left pending.
#[async_trait]
pub trait Resolver<T>: Send + Sync {
    async fn resolve(&self, ids: &[String]) -> Result<ModelMap<T>>;
}

/// [`Resolver`] backed by an async closure
pub struct FnResolver<F>(F);

pub fn resolver_fn<F>(f: F) -> FnResolver<F> {
    FnResolver(f)
}

#[async_trait]
impl<T, F, Fut> Resolver<T> for FnResolver<F>
where
    T: Send + 'static,
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ModelMap<T>>> + Send + 'static,
{
    async fn resolve(&self, ids: &[String]) -> Result<ModelMap<T>> {
        (self.0)(ids.to_vec()).await
    }
}

// =============================================================================
// Public types
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Start a fresh fetch even if the id was already fetched.
    pub force: bool,
}

impl QueueOptions {
    pub fn force() -> Self {
        Self { force: true }
    }
}

/// Emitted once per settled id, or once per failed batch.
#[derive(Debug, Clone)]
pub enum ResolveEvent<T> {
    Resolved { id: String, value: T },
    Failed { ids: Vec<String>, error: QueueError },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub batches_dispatched: usize,
    pub batches_failed: usize,
    pub ids_resolved: usize,
}

/// Handle to the eventual outcome of one queued id.
///
/// Clones observe the same fetch.
#[derive(Debug)]
pub struct PendingFetch<T> {
    id: String,
    rx: watch::Receiver<Option<Settled<T>>>,
}

impl<T> Clone for PendingFetch<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone> PendingFetch<T> {
    /// A fetch that has already succeeded.
    pub fn ready(id: impl Into<String>, value: T) -> Self {
        Self::settled(id.into(), Ok(value))
    }

    /// A fetch that has already failed.
    pub fn failed(id: impl Into<String>, error: QueueError) -> Self {
        Self::settled(id.into(), Err(error))
    }

    fn settled(id: String, outcome: Settled<T>) -> Self {
        let (_, rx) = watch::channel(Some(outcome));
        Self { id, rx }
    }

    fn subscribe(id: String, slot: &Slot<T>) -> Self {
        Self {
            id,
            rx: slot.subscribe(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the fetch to settle.
    pub async fn wait(&self) -> Settled<T> {
        if let Some(outcome) = self.try_get() {
            return outcome;
        }
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(current) => current.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(QueueError::Closed {
                id: self.id.clone(),
            })
        })
    }

    /// The outcome, if the fetch has settled.
    pub fn try_get(&self) -> Option<Settled<T>> {
        self.rx.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Whether both handles observe the same underlying fetch.
    pub fn same_fetch(&self, other: &PendingFetch<T>) -> bool {
        self.rx.same_channel(&other.rx)
    }
}

// =============================================================================
// Queue
// =============================================================================

struct State<T> {
    slots: HashMap<String, Slot<T>>,
    /// In-flight fetches replaced by a forced re-queue.
    superseded: Vec<(String, Slot<T>)>,
    queued: VecDeque<String>,
    events: Option<broadcast::Sender<ResolveEvent<T>>>,
    resolved: Option<watch::Sender<Arc<ModelMap<T>>>>,
    closed: bool,
    stats: QueueStats,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    wake: Notify,
    /// Outlives the sender so late subscribers still see the final snapshot.
    resolved: watch::Receiver<Arc<ModelMap<T>>>,
    resolver: Box<dyn Resolver<T>>,
    config: QueueConfig,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ids claimed for one resolver call, with the slots they settle.
struct Batch<T> {
    ids: Vec<String>,
    slots: Vec<Slot<T>>,
}

pub struct ResolveQueue<T> {
    shared: Arc<Shared<T>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> ResolveQueue<T> {
    /// Validate `config` and spawn the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<R>(resolver: R, config: QueueConfig) -> std::result::Result<Self, ConfigError>
    where
        R: Resolver<T> + 'static,
    {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (resolved_tx, resolved) = watch::channel(Arc::new(ModelMap::new()));
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                slots: HashMap::new(),
                superseded: Vec::new(),
                queued: VecDeque::new(),
                events: Some(events),
                resolved: Some(resolved_tx),
                closed: false,
                stats: QueueStats::default(),
            }),
            wake: Notify::new(),
            resolved,
            resolver: Box::new(resolver),
            config,
        });

        let dispatcher = tokio::spawn(run_dispatcher(Arc::clone(&shared)));
        info!(
            batch_size = shared.config.batch_size,
            sample_period_ms = shared.config.sample_period.as_millis() as u64,
            "Resolve queue started"
        );

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    pub fn queue(&self, id: impl Into<String>) -> PendingFetch<T> {
        self.queue_with(id, QueueOptions::default())
    }

    /// Queue `id`, or join its existing fetch.
    ///
    /// With `force`, a settled or in-flight fetch is replaced by a new one.
    /// Holders of the old handle still receive the old outcome. An id that
    /// is still waiting for dispatch is joined even when forced.
    pub fn queue_with(&self, id: impl Into<String>, options: QueueOptions) -> PendingFetch<T> {
        let id = id.into();
        let mut state = self.shared.lock();

        if state.closed {
            return PendingFetch::failed(id.clone(), QueueError::Closed { id });
        }

        if let Some(slot) = state.slots.get(&id) {
            let waiting = slot.borrow().is_none() && state.queued.contains(&id);
            if !options.force || waiting {
                return PendingFetch::subscribe(id, slot);
            }
            debug!(id = %id, "Replacing fetch");
            if slot.borrow().is_none() {
                let in_flight = Arc::clone(slot);
                state.superseded.push((id.clone(), in_flight));
            }
        }

        let (tx, _) = watch::channel(None);
        let slot: Slot<T> = Arc::new(tx);
        let fetch = PendingFetch::subscribe(id.clone(), &slot);
        state.slots.insert(id.clone(), slot);
        state.queued.push_back(id);
        drop(state);

        self.shared.wake.notify_one();
        fetch
    }

    pub fn queue_all<I, S>(&self, ids: I) -> Vec<PendingFetch<T>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().map(|id| self.queue(id)).collect()
    }

    /// Receive every event emitted after this call.
    ///
    /// After shutdown the receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<ResolveEvent<T>> {
        match &self.shared.lock().events {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Every value resolved since the queue started, updated on each batch.
    ///
    /// The receiver reports the sender closed once the queue shuts down.
    pub fn all_resolved(&self) -> watch::Receiver<Arc<ModelMap<T>>> {
        let mut resolved = self.shared.resolved.clone();
        resolved.borrow_and_update();
        resolved
    }

    /// True when `id` has a fetch that has not settled yet.
    pub fn is_pending(&self, id: &str) -> bool {
        self.shared
            .lock()
            .slots
            .get(id)
            .is_some_and(|slot| slot.borrow().is_none())
    }

    /// The current fetch for `id`, settled or not.
    pub fn pending_fetch(&self, id: &str) -> Option<PendingFetch<T>> {
        self.shared
            .lock()
            .slots
            .get(id)
            .map(|slot| PendingFetch::subscribe(id.to_string(), slot))
    }

    /// Ids waiting for a batch
    pub fn queued_len(&self) -> usize {
        self.shared.lock().queued.len()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Stop dispatching and fail every unsettled fetch.
    ///
    /// Resolver calls already in flight run to completion, but their results
    /// are discarded.
    pub fn shutdown(&self) {
        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }

        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        let force_closed = close_state(&mut state);
        info!(force_closed, "Resolve queue shut down");
    }
}

impl<T> Drop for ResolveQueue<T> {
    fn drop(&mut self) {
        let handle = self
            .dispatcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        close_state(&mut self.shared.lock());
    }
}

/// Settle `slot` if it has not settled yet. Returns whether it changed.
fn settle<T>(slot: &Slot<T>, outcome: Settled<T>) -> bool {
    slot.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(outcome);
        true
    })
}

/// Mark the queue closed and fail every unsettled fetch. Returns how many were failed.
fn close_state<T>(state: &mut State<T>) -> usize {
    if state.closed {
        return 0;
    }
    state.closed = true;
    state.queued.clear();
    state.events = None;
    state.resolved = None;
    let superseded = std::mem::take(&mut state.superseded);
    state
        .slots
        .iter()
        .chain(superseded.iter().map(|(id, slot)| (id, slot)))
        .filter(|&(id, slot)| settle(slot, Err(QueueError::Closed { id: id.clone() })))
        .count()
}

/// Forget replaced fetches once their batch has settled them.
fn prune_superseded<T>(state: &mut State<T>) {
    if !state.superseded.is_empty() {
        state.superseded.retain(|(_, slot)| slot.borrow().is_none());
    }
}

// =============================================================================
// Dispatch
// =============================================================================

async fn run_dispatcher<T: Clone + Send + Sync + 'static>(shared: Arc<Shared<T>>) {
    let period = shared.config.sample_period;
    loop {
        let idle = shared.lock().queued.is_empty();
        if idle {
            shared.wake.notified().await;
            continue;
        }

        // Ids queued during the window join this batch.
        tokio::time::sleep(period).await;

        if let Some(batch) = claim_batch(&shared) {
            tokio::spawn(run_batch(Arc::clone(&shared), batch));
        }
    }
}

fn claim_batch<T>(shared: &Shared<T>) -> Option<Batch<T>> {
    let mut state = shared.lock();
    let mut batch = Batch {
        ids: Vec::new(),
        slots: Vec::new(),
    };

    while batch.ids.len() < shared.config.batch_size {
        let Some(id) = state.queued.pop_front() else {
            break;
        };
        match state.slots.get(&id) {
            Some(slot) if slot.borrow().is_none() => {
                debug_assert!(!batch.ids.contains(&id), "id {id} queued twice");
                batch.slots.push(Arc::clone(slot));
                batch.ids.push(id);
            }
            Some(_) => {}
            None => {
                error!(id = %id, "Queued id has no pending fetch");
                debug_assert!(false, "queued id {id} has no pending fetch");
            }
        }
    }

    if batch.ids.is_empty() {
        return None;
    }
    state.stats.batches_dispatched += 1;
    debug!(
        batch_size = batch.ids.len(),
        remaining = state.queued.len(),
        "Dispatching batch"
    );
    Some(batch)
}

async fn run_batch<T: Clone + Send + Sync + 'static>(shared: Arc<Shared<T>>, batch: Batch<T>) {
    let call = shared.resolver.resolve(&batch.ids);
    let outcome = match shared.config.batch_timeout {
        Some(after) => match tokio::time::timeout(after, call).await {
            Ok(result) => result.map_err(|e| batch_failed(&batch.ids, e)),
            Err(_) => Err(QueueError::Timeout {
                ids: batch.ids.clone(),
                after,
            }),
        },
        None => call.await.map_err(|e| batch_failed(&batch.ids, e)),
    };

    match outcome {
        Ok(resolved) => settle_batch(&shared, batch, resolved),
        Err(error) => fail_batch(&shared, batch, error),
    }
}

fn batch_failed(ids: &[String], source: crate::error::ClientError) -> QueueError {
    QueueError::BatchFailed {
        ids: ids.to_vec(),
        source: Arc::new(source),
    }
}

/// Outcomes that arrive after shutdown close the fetches instead.
fn close_batch<T>(batch: &Batch<T>) {
    for (id, slot) in batch.ids.iter().zip(&batch.slots) {
        settle(slot, Err(QueueError::Closed { id: id.clone() }));
    }
}

fn settle_batch<T: Clone>(shared: &Shared<T>, batch: Batch<T>, mut resolved: ModelMap<T>) {
    let mut state = shared.lock();
    if state.closed {
        close_batch(&batch);
        return;
    }

    let mut settled = Vec::with_capacity(batch.ids.len());
    let mut missing = Vec::new();
    for (id, slot) in batch.ids.into_iter().zip(&batch.slots) {
        match resolved.remove(&id) {
            Some(value) => {
                if settle(slot, Ok(value.clone())) {
                    settled.push((id, value));
                }
            }
            None => missing.push(id),
        }
    }

    if !missing.is_empty() {
        warn!(ids = ?missing, "Resolver returned no value for queued ids; they remain pending");
    }
    if !resolved.is_empty() {
        let extra: Vec<&String> = resolved.keys().collect();
        warn!(ids = ?extra, "Resolver returned ids that were not requested");
    }

    state.stats.ids_resolved += settled.len();
    prune_superseded(&mut state);
    if let Some(events) = &state.events {
        for (id, value) in &settled {
            // No subscribers is fine.
            let _ = events.send(ResolveEvent::Resolved {
                id: id.clone(),
                value: value.clone(),
            });
        }
    }

    if let (Some(snapshot), false) = (&state.resolved, settled.is_empty()) {
        snapshot.send_modify(|all| {
            let all = Arc::make_mut(all);
            all.extend(settled);
        });
    }
}

fn fail_batch<T: Clone>(shared: &Shared<T>, batch: Batch<T>, error: QueueError) {
    let mut state = shared.lock();
    if state.closed {
        close_batch(&batch);
        return;
    }

    warn!(ids = ?batch.ids, error = %error, "Batch failed");
    state.stats.batches_failed += 1;
    for slot in &batch.slots {
        settle(slot, Err(error.clone()));
    }
    prune_superseded(&mut state);
    if let Some(events) = &state.events {
        let _ = events.send(ResolveEvent::Failed {
            ids: batch.ids,
            error,
        });
    }
}
