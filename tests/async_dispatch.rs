//! Asynchronous actions: deferred commit, failures, and the last-commit-wins race.

use serde_json::{json, Value};
use statekeep::{
    Action, ActionError, Collection, CollectionDefinition, Store, StoreDefinition, StoreError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let cb = hits.clone();
    (hits, move || {
        cb.fetch_add(1, Ordering::SeqCst);
    })
}

/// Store whose `fetch_v` action waits on `gate` before writing `v`.
fn gated_store(gate: Arc<Notify>) -> Store {
    Store::new(
        StoreDefinition::new(json!({"v": 0, "count": 0}))
            .action(
                "fetch_v",
                Action::future(move |mut draft, payload| {
                    let gate = gate.clone();
                    async move {
                        gate.notified().await;
                        draft["v"] = if payload.is_null() { json!(42) } else { payload };
                        Ok::<_, ActionError>((draft, json!("fetched")))
                    }
                }),
            )
            .action(
                "increment",
                Action::sync(|s, _| {
                    let n = s["count"].as_i64().unwrap_or(0);
                    s["count"] = json!(n + 1);
                    Ok(Value::Null)
                }),
            )
            .action(
                "rejects",
                Action::future(|mut draft, _| async move {
                    draft["v"] = json!(-1);
                    tokio::task::yield_now().await;
                    Err::<(Value, Value), ActionError>("backend unavailable".into())
                }),
            ),
    )
    .unwrap()
}

#[tokio::test]
async fn test_commit_waits_for_resolution() {
    let gate = Arc::new(Notify::new());
    let store = gated_store(gate.clone());
    let (hits, callback) = counter();
    store.observe(|s| s["v"].clone(), callback);

    let task_store = store.clone();
    let task = tokio::spawn(async move { task_store.dispatch_async("fetch_v", Value::Null).await });
    tokio::task::yield_now().await;

    // Still pending: old value visible, no notification.
    assert_eq!(store.get()["v"], 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    gate.notify_one();
    let output = task.await.unwrap().unwrap();

    assert_eq!(output, json!("fetched"));
    assert_eq!(store.get()["v"], 42);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dispatch_async_accepts_sync_actions() {
    let store = gated_store(Arc::new(Notify::new()));
    store.dispatch_async("increment", Value::Null).await.unwrap();
    assert_eq!(store.get()["count"], 1);
}

#[tokio::test]
async fn test_silent_async_dispatch() {
    let gate = Arc::new(Notify::new());
    let store = gated_store(gate.clone());
    let (hits, callback) = counter();
    store.observe(|s| s["v"].clone(), callback);

    gate.notify_one();
    store.dispatch_async_silent("fetch_v", json!(7)).await.unwrap();
    assert_eq!(store.get()["v"], 7);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejected_action_commits_nothing() {
    let store = gated_store(Arc::new(Notify::new()));
    let result = store.dispatch_async("rejects", Value::Null).await;

    let err = result.unwrap_err();
    assert!(matches!(err, StoreError::Action(_)));
    assert_eq!(err.to_string(), "backend unavailable");
    assert_eq!(store.get()["v"], 0);
}

#[tokio::test]
async fn test_unknown_async_action() {
    let store = gated_store(Arc::new(Notify::new()));
    let result = store.dispatch_async("nope", Value::Null).await;
    assert!(matches!(result, Err(StoreError::ActionNotFound(_))));
}

#[tokio::test]
async fn test_later_commit_overwrites_intermediate_change() {
    let gate = Arc::new(Notify::new());
    let store = gated_store(gate.clone());

    let task_store = store.clone();
    let task = tokio::spawn(async move { task_store.dispatch_async("fetch_v", Value::Null).await });
    tokio::task::yield_now().await;

    // Lands while the async dispatch holds a stale draft.
    store.dispatch("increment", Value::Null).unwrap();
    assert_eq!(store.get()["count"], 1);

    gate.notify_one();
    task.await.unwrap().unwrap();

    assert_eq!(store.get()["v"], 42);
    assert_eq!(store.get()["count"], 0);
}

#[tokio::test]
async fn test_dropped_dispatch_commits_nothing() {
    let store = gated_store(Arc::new(Notify::new()));
    let result = tokio::time::timeout(
        Duration::from_millis(20),
        store.dispatch_async("fetch_v", Value::Null),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(store.get()["v"], 0);
}

// --- Collection ---

fn gated_collection(gate: Arc<Notify>) -> Collection {
    Collection::new(CollectionDefinition::new().action(
        "load",
        Action::future(move |mut record, _| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                record["loaded"] = json!(true);
                Ok::<_, ActionError>((record, Value::Null))
            }
        }),
    ))
    .unwrap()
}

#[tokio::test]
async fn test_collection_async_dispatch() {
    let gate = Arc::new(Notify::new());
    let collection = gated_collection(gate.clone());
    collection.set("a", json!({"loaded": false}));
    let (hits, callback) = counter();
    collection.observe("a", |r| r["loaded"].clone(), callback);

    let view = collection.key("a");
    let task = tokio::spawn(async move { view.dispatch_async("load", Value::Null).await });
    tokio::task::yield_now().await;
    assert_eq!(collection.get("a").unwrap()["loaded"], false);

    gate.notify_one();
    task.await.unwrap().unwrap();
    assert_eq!(collection.get("a").unwrap()["loaded"], true);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_collection_commit_after_remove_is_key_not_found() {
    let gate = Arc::new(Notify::new());
    let collection = gated_collection(gate.clone());
    collection.set("a", json!({"loaded": false}));

    let task_collection = collection.clone();
    let task = tokio::spawn(async move {
        task_collection
            .dispatch_async("a", "load", Value::Null)
            .await
    });
    tokio::task::yield_now().await;

    collection.remove("a");
    gate.notify_one();
    let result = task.await.unwrap();

    assert!(matches!(result, Err(StoreError::KeyNotFound(ref key)) if key == "a"));
    assert!(!collection.contains_key("a"));
    assert_eq!(collection.size(), 0);
}
