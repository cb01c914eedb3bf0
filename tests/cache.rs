mod common;

use std::sync::Arc;

use metawindow::{
    app::{CacheStore, INDEX_KEY, MemoryCacheStore, WindowMetadataCache, cache_key},
    error::{ApiError, WindowError},
};
use serde_json::json;

use common::{MockApi, Reply, users_config};

fn api() -> Arc<MockApi> {
    MockApi::new(|call| match call.link.as_str() {
        "window/config" => {
            let id = call.data.as_ref().map(|data| data["window_id"].clone());
            if id == Some(json!("users")) || id == Some(json!("__index")) {
                Reply::ok(users_config())
            } else if id == Some(json!("broken")) {
                Reply::ok(json!([{"tabs": "nope"}]))
            } else {
                Reply::err(ApiError::Status {
                    link: call.link.clone(),
                    status: 404,
                    message: "unknown window".into(),
                })
            }
        }
        "cache/clear" => Reply::err(ApiError::Transport("offline".into())),
        _ => Reply::ok(json!(null)),
    })
}

#[tokio::test]
async fn fetches_once_then_serves_from_the_store() {
    let api = api();
    let store = Arc::new(MemoryCacheStore::new());
    let cache = WindowMetadataCache::new(api.clone(), store.clone());

    let first = cache.get("users").await.unwrap();
    let second = cache.get("users").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.tabs.len(), 3);
    assert_eq!(api.calls_to("window/config").len(), 1);
    assert!(store.get(&cache_key("users")).is_some());
    assert_eq!(store.get(INDEX_KEY).as_deref(), Some(r#"["users"]"#));
}

#[tokio::test]
async fn unreadable_entries_are_refetched() {
    let api = api();
    let store = Arc::new(MemoryCacheStore::new());
    store.set(&cache_key("users"), "{not json".to_string());
    let cache = WindowMetadataCache::new(api.clone(), store.clone());

    let config = cache.get("users").await.unwrap();
    assert_eq!(config.id, "users");
    assert_eq!(api.calls_to("window/config").len(), 1);
    assert!(store.get(&cache_key("users")).unwrap().starts_with('{'));
}

#[tokio::test]
async fn failures_name_the_window() {
    let cache = WindowMetadataCache::new(api(), Arc::new(MemoryCacheStore::new()));
    match cache.get("ghost").await {
        Err(WindowError::Config { window_id, source }) => {
            assert_eq!(window_id, "ghost");
            assert!(matches!(source, ApiError::Status { status: 404, .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        cache.get("broken").await,
        Err(WindowError::InvalidConfig { .. })
    ));
}

#[tokio::test]
async fn invalidate_and_clear_all() {
    let api = api();
    let store = Arc::new(MemoryCacheStore::new());
    let cache = WindowMetadataCache::new(api.clone(), store.clone());
    cache.get("users").await.unwrap();

    cache.invalidate("users");
    assert!(store.is_empty());
    cache.get("users").await.unwrap();
    assert_eq!(api.calls_to("window/config").len(), 2);

    // the server call fails; local entries are still dropped
    assert_eq!(cache.clear_all().await, 1);
    assert!(store.is_empty());
    assert_eq!(api.calls_to("cache/clear").len(), 1);
}

#[tokio::test]
async fn window_ids_never_overwrite_the_index() {
    let api = api();
    let store = Arc::new(MemoryCacheStore::new());
    let cache = WindowMetadataCache::new(api.clone(), store.clone());

    cache.get("users").await.unwrap();
    cache.get("__index").await.unwrap();
    assert_ne!(cache_key("__index"), INDEX_KEY);
    assert_eq!(
        store.get(INDEX_KEY).as_deref(),
        Some(r#"["users","__index"]"#)
    );

    // both entries stay readable from the store
    cache.get("__index").await.unwrap();
    cache.get("users").await.unwrap();
    assert_eq!(api.calls_to("window/config").len(), 2);

    cache.invalidate("__index");
    assert_eq!(store.get(INDEX_KEY).as_deref(), Some(r#"["users"]"#));
    assert_eq!(cache.clear_all().await, 1);
    assert!(store.is_empty());
}
