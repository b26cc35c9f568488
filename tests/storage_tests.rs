// tests/storage_tests.rs

use gemini_relay::storage::{
    InMemoryStore, JsonFileStore, RotationState, StateStore, ThrottleState,
};

fn sample_rotation() -> RotationState {
    let mut state = RotationState::new("2026-05-04");
    state.cursor = 2;
    state.failed.insert(0);
    state.failed.insert(1);
    state
}

fn sample_throttle() -> ThrottleState {
    let mut state = ThrottleState::new("2026-05-04");
    state.request_count = 42;
    state.last_dispatch_ms = 1_777_000_000_000;
    state
}

#[tokio::test]
async fn test_memory_store_starts_empty() {
    let store = InMemoryStore::new();
    assert_eq!(store.load_rotation().await.unwrap(), None);
    assert_eq!(store.load_throttle().await.unwrap(), None);
}

#[tokio::test]
async fn test_memory_store_roundtrip() {
    let store = InMemoryStore::new();
    store.save_rotation(&sample_rotation()).await.unwrap();
    store.save_throttle(&sample_throttle()).await.unwrap();

    assert_eq!(store.load_rotation().await.unwrap(), Some(sample_rotation()));
    assert_eq!(store.load_throttle().await.unwrap(), Some(sample_throttle()));
}

#[tokio::test]
async fn test_file_store_roundtrip_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay-state.json");

    {
        let store = JsonFileStore::new(&path);
        store.save_rotation(&sample_rotation()).await.unwrap();
        store.save_throttle(&sample_throttle()).await.unwrap();
    }

    let store = JsonFileStore::new(&path);
    assert_eq!(store.load_rotation().await.unwrap(), Some(sample_rotation()));
    assert_eq!(store.load_throttle().await.unwrap(), Some(sample_throttle()));
}

#[tokio::test]
async fn test_file_store_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("does-not-exist.json"));
    assert_eq!(store.load_rotation().await.unwrap(), None);
    assert_eq!(store.load_throttle().await.unwrap(), None);
}

#[tokio::test]
async fn test_file_store_corrupt_file_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay-state.json");
    std::fs::write(&path, "this is not json {").unwrap();

    let store = JsonFileStore::new(&path);
    assert_eq!(store.load_rotation().await.unwrap(), None);

    // A save must recover the file.
    store.save_rotation(&sample_rotation()).await.unwrap();
    assert_eq!(store.load_rotation().await.unwrap(), Some(sample_rotation()));
}

#[tokio::test]
async fn test_file_store_saves_preserve_other_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay-state.json");
    let store = JsonFileStore::new(&path);

    store.save_rotation(&sample_rotation()).await.unwrap();
    store.save_throttle(&sample_throttle()).await.unwrap();

    // Writing the throttle section must not clobber the rotation section.
    assert_eq!(store.load_rotation().await.unwrap(), Some(sample_rotation()));

    let mut updated = sample_rotation();
    updated.cursor = 0;
    store.save_rotation(&updated).await.unwrap();
    assert_eq!(store.load_rotation().await.unwrap(), Some(updated));
    assert_eq!(store.load_throttle().await.unwrap(), Some(sample_throttle()));
}
