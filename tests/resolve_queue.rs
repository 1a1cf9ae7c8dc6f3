//! Batching behaviour of the resolve queue, fetch queue and model loader.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;

use assessment_client::domain::{Student, StudentApi};
use assessment_client::error::{ClientError, QueueError};
use assessment_client::model::{ModelMap, Ref};
use assessment_client::queue::{
    resolver_fn, FetchQueue, LoadOptions, ModelLoader, QueueConfig, QueueOptions, ResolveEvent,
    ResolveQueue,
};

use common::{resolving_students, student_ids, MockBackend};

type Batches = Arc<Mutex<Vec<Vec<String>>>>;

/// Queue whose resolver records every batch and answers `value-<id>`,
/// skipping ids in `missing` and failing any batch containing `bad`.
fn recording_queue(config: QueueConfig, missing: &'static [&'static str]) -> (ResolveQueue<String>, Batches) {
    let batches = Batches::default();
    let seen = Arc::clone(&batches);
    let resolver = resolver_fn(move |ids: Vec<String>| {
        seen.lock().unwrap().push(ids.clone());
        async move {
            if ids.iter().any(|id| id == "bad") {
                return Err(ClientError::InvalidResponse("bad batch".into()));
            }
            let values: ModelMap<String> = ids
                .into_iter()
                .filter(|id| !missing.contains(&id.as_str()))
                .map(|id| (id.clone(), format!("value-{id}")))
                .collect();
            Ok::<_, ClientError>(values)
        }
    });
    (ResolveQueue::start(resolver, config).unwrap(), batches)
}

fn batch_sizes(batches: &Batches) -> Vec<usize> {
    batches.lock().unwrap().iter().map(Vec::len).collect()
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_ids_share_one_fetch() {
    let (queue, batches) = recording_queue(QueueConfig::default(), &[]);

    let first = queue.queue("a");
    let second = queue.queue("a");
    assert!(first.same_fetch(&second));
    assert_eq!(queue.queued_len(), 1);

    assert_eq!(first.wait().await.unwrap(), "value-a");
    assert_eq!(second.wait().await.unwrap(), "value-a");
    assert_eq!(batches.lock().unwrap().clone(), vec![vec!["a".to_string()]]);
}

#[tokio::test(start_paused = true)]
async fn test_ids_split_into_batches_in_queue_order() {
    let (queue, batches) = recording_queue(QueueConfig::default(), &[]);

    let ids = student_ids(1..=45);
    let fetches = queue.queue_all(ids.clone());
    let outcomes = join_all(fetches.iter().map(|fetch| fetch.wait())).await;
    assert!(outcomes.iter().all(Result::is_ok));

    assert_eq!(batch_sizes(&batches), vec![20, 20, 5]);
    let dispatched: Vec<String> = batches.lock().unwrap().concat();
    assert_eq!(dispatched, ids);
    assert_eq!(queue.stats().batches_dispatched, 3);
    assert_eq!(queue.stats().ids_resolved, 45);
}

#[tokio::test(start_paused = true)]
async fn test_ids_queued_within_sample_period_share_a_batch() {
    let (queue, batches) = recording_queue(QueueConfig::default(), &[]);

    let a = queue.queue("a");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let b = queue.queue("b");

    a.wait().await.unwrap();
    b.wait().await.unwrap();
    assert_eq!(batch_sizes(&batches), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_only_fails_its_own_ids() {
    let config = QueueConfig::default().batch_size(2);
    let (queue, _batches) = recording_queue(config, &[]);
    let mut events = queue.subscribe();

    let fetches = queue.queue_all(["bad", "x", "y", "z"]);
    let outcomes = join_all(fetches.iter().map(|fetch| fetch.wait())).await;

    for outcome in &outcomes[..2] {
        let err = outcome.as_ref().unwrap_err();
        assert!(matches!(err, QueueError::BatchFailed { .. }));
        assert_eq!(err.batch_ids(), vec!["bad".to_string(), "x".to_string()]);
    }
    assert_eq!(outcomes[2].as_deref().unwrap(), "value-y");
    assert_eq!(outcomes[3].as_deref().unwrap(), "value-z");

    let mut failed = Vec::new();
    let mut resolved = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ResolveEvent::Failed { ids, .. } => failed.push(ids),
            ResolveEvent::Resolved { id, .. } => resolved.push(id),
        }
    }
    assert_eq!(failed, vec![vec!["bad".to_string(), "x".to_string()]]);
    resolved.sort();
    assert_eq!(resolved, vec!["y".to_string(), "z".to_string()]);
    assert_eq!(queue.stats().batches_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_keeps_working_after_failure() {
    let (queue, _batches) = recording_queue(QueueConfig::default(), &[]);

    assert!(queue.queue("bad").wait().await.is_err());
    assert_eq!(queue.queue("after").wait().await.unwrap(), "value-after");
}

#[tokio::test(start_paused = true)]
async fn test_missing_id_stays_pending() {
    let (queue, _batches) = recording_queue(QueueConfig::default(), &["c"]);

    let fetches = queue.queue_all(["a", "b", "c"]);
    fetches[0].wait().await.unwrap();
    fetches[1].wait().await.unwrap();

    let waited = tokio::time::timeout(Duration::from_secs(5), fetches[2].wait()).await;
    assert!(waited.is_err());
    assert!(!fetches[2].is_settled());
    assert!(queue.is_pending("c"));
}

#[tokio::test(start_paused = true)]
async fn test_all_resolved_accumulates() {
    let (queue, _batches) = recording_queue(QueueConfig::default().batch_size(1), &[]);
    let all = queue.all_resolved();
    assert!(all.borrow().is_empty());

    let fetches = queue.queue_all(["a", "b"]);
    join_all(fetches.iter().map(|fetch| fetch.wait())).await;

    let snapshot = all.borrow().clone();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("b").map(String::as_str), Some("value-b"));
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_batch_is_closed_by_shutdown() {
    let resolver = resolver_fn(|ids: Vec<String>| async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, ClientError>(ids.into_iter().map(|id| (id.clone(), id)).collect::<ModelMap<String>>())
    });
    let queue = ResolveQueue::start(resolver, QueueConfig::default()).unwrap();

    let fetch = queue.queue("a");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(queue.stats().batches_dispatched, 1);

    queue.shutdown();
    assert!(matches!(fetch.wait().await, Err(QueueError::Closed { .. })));

    // The late result must not reopen the fetch.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(matches!(fetch.try_get(), Some(Err(QueueError::Closed { .. }))));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_fetch_replaced_while_in_flight() {
    let resolver = resolver_fn(|ids: Vec<String>| async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok::<_, ClientError>(ids.into_iter().map(|id| (id.clone(), id)).collect::<ModelMap<String>>())
    });
    let queue = ResolveQueue::start(resolver, QueueConfig::default()).unwrap();

    let replaced = queue.queue("a");
    tokio::time::sleep(Duration::from_millis(500)).await;
    let forced = queue.queue_with("a", QueueOptions::force());
    assert!(!forced.same_fetch(&replaced));

    queue.shutdown();
    let outcome = tokio::time::timeout(Duration::from_secs(1), replaced.wait()).await;
    assert!(matches!(outcome, Ok(Err(QueueError::Closed { .. }))));
    assert!(matches!(forced.try_get(), Some(Err(QueueError::Closed { .. }))));
}

#[tokio::test(start_paused = true)]
async fn test_all_resolved_ends_on_shutdown() {
    let (queue, _batches) = recording_queue(QueueConfig::default(), &[]);
    queue.queue("a").wait().await.unwrap();
    let mut all = queue.all_resolved();

    queue.shutdown();
    assert!(all.changed().await.is_err());
    assert_eq!(all.borrow().len(), 1);

    let late = queue.all_resolved();
    assert!(late.has_changed().is_err());
    assert!(late.borrow().contains_key("a"));
}

// =============================================================================
// Fetch queue and loader
// =============================================================================

fn student_queue(missing: &'static [&'static str]) -> (FetchQueue<Student>, Arc<MockBackend>) {
    let backend = MockBackend::new(resolving_students(missing));
    let api = StudentApi::new(backend.clone());
    let queue = FetchQueue::start(api.service().clone(), QueueConfig::default()).unwrap();
    (queue, backend)
}

#[tokio::test(start_paused = true)]
async fn test_fetch_queue_resolves_through_service() {
    let (queue, backend) = student_queue(&[]);

    let fetches: Vec<_> = ["s1", "s2"]
        .iter()
        .map(|id| queue.queue_fetch(&Ref::from(*id), false))
        .collect();
    let students = join_all(fetches.iter().map(|fetch| fetch.wait())).await;
    assert_eq!(students[1].as_ref().unwrap().id, "s2");

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].params.get("resolve"), Some("s1,s2"));
    assert_eq!(requests[0].path, vec!["/schools".to_string(), "students".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_loader_tracks_loading_ids() {
    let (queue, backend) = student_queue(&[]);
    let loader = ModelLoader::new(queue);

    let model: Ref<Student> = Ref::from("s1");
    let fetch = loader.load(&model, LoadOptions::default());
    assert!(loader.is_loading(&model));
    assert_eq!(loader.loading_ids(), vec!["s1".to_string()]);

    let student = fetch.wait().await.unwrap();
    // Let the event watcher catch up.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!loader.is_loading(&model));

    let materialized = Ref::Model(student);
    let again = loader.load(&materialized, LoadOptions::default());
    assert!(again.is_settled());
    assert!(!loader.is_loading(&materialized));
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_loader_reuses_settled_fetch_unless_forced() {
    let (queue, backend) = student_queue(&[]);
    let loader = ModelLoader::new(queue);
    let model: Ref<Student> = Ref::from("s1");

    loader.load(&model, LoadOptions::default()).wait().await.unwrap();
    let reused = loader.load(&model, LoadOptions::default());
    assert!(reused.is_settled());
    assert!(!loader.is_loading(&model));
    assert_eq!(backend.request_count(), 1);

    loader
        .load(&model, LoadOptions { force: true })
        .wait()
        .await
        .unwrap();
    assert_eq!(backend.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_loader_clears_failed_ids() {
    let backend = MockBackend::new(|_request| {
        Err(ClientError::InvalidResponse("server unavailable".into()))
    });
    let api = StudentApi::new(backend);
    let queue = FetchQueue::start(api.service().clone(), QueueConfig::default()).unwrap();
    let loader = ModelLoader::new(queue);

    let model: Ref<Student> = Ref::from("s1");
    let err = loader.load(&model, LoadOptions::default()).wait().await.unwrap_err();
    assert!(matches!(err, QueueError::BatchFailed { .. }));

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(loader.loading_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_loader_shutdown_clears_loading() {
    let (queue, _backend) = student_queue(&["s9"]);
    let loader = ModelLoader::new(queue);
    let model: Ref<Student> = Ref::from("s9");

    let fetch = loader.load(&model, LoadOptions::default());
    loader.shutdown();
    assert!(loader.loading_ids().is_empty());
    assert!(matches!(fetch.wait().await, Err(QueueError::Closed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_forced_reload_stays_loading_until_it_settles() {
    let backend = MockBackend::with_delays(
        resolving_students(&[]),
        [Duration::from_secs(10), Duration::from_secs(100)],
    );
    let api = StudentApi::new(backend.clone());
    let queue = FetchQueue::start(api.service().clone(), QueueConfig::default()).unwrap();
    let loader = ModelLoader::new(queue);
    let model: Ref<Student> = Ref::from("s1");

    let first = loader.load(&model, LoadOptions::default());
    tokio::time::sleep(Duration::from_millis(500)).await;
    let forced = loader.load(&model, LoadOptions { force: true });
    assert!(!forced.same_fetch(&first));

    // The first request answers while the forced one is still running.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(first.is_settled());
    assert!(!forced.is_settled());
    assert!(loader.is_loading(&model));

    forced.wait().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!loader.is_loading(&model));
    assert_eq!(backend.request_count(), 2);
}
