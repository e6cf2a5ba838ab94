//! Trait contract tests for CheckpointStore.
//!
//! Every backend must pass the same behavioural checks; each test runs the
//! contract against the in-memory fake and the filesystem store.

use regcorr_state::fakes::MemoryCheckpointStore;
use regcorr_state::{
    get_json, put_json, CheckpointStore, ContentDigest, FsCheckpointStore, StorageError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Stage {
    name: String,
    pairs: Vec<(String, String)>,
}

fn backends() -> (tempfile::TempDir, Vec<Box<dyn CheckpointStore>>) {
    let dir = tempfile::tempdir().unwrap();
    let fs = FsCheckpointStore::new(dir.path()).unwrap();
    (
        dir,
        vec![Box::new(MemoryCheckpointStore::new()), Box::new(fs)],
    )
}

#[tokio::test]
async fn checkpoint_get_round_trip() {
    let (_dir, stores) = backends();
    for store in stores {
        store.put("index_output", b"round trip").await.unwrap();
        assert_eq!(store.get("index_output").await.unwrap(), b"round trip");
    }
}

#[tokio::test]
async fn checkpoint_get_not_found() {
    let (_dir, stores) = backends();
    for store in stores {
        let err = store.get("matches_working").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}

#[tokio::test]
async fn checkpoint_put_is_overwritable_by_name() {
    let (_dir, stores) = backends();
    for store in stores {
        store.put("correlations_output", b"v1").await.unwrap();
        store.put("correlations_output", b"v2").await.unwrap();
        assert_eq!(store.get("correlations_output").await.unwrap(), b"v2");
    }
}

#[tokio::test]
async fn checkpoint_invalid_key_rejected() {
    let (_dir, stores) = backends();
    for store in stores {
        let err = store.put("a/b", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }
}

#[tokio::test]
async fn json_helpers_round_trip_and_absent_is_none() {
    let (_dir, stores) = backends();
    for store in stores {
        let stage = Stage {
            name: "matches".to_string(),
            pairs: vec![("a.nii.gz".to_string(), "b.nii.gz".to_string())],
        };
        put_json(store.as_ref(), "matches_output", &stage).await.unwrap();
        let back: Option<Stage> = get_json(store.as_ref(), "matches_output").await.unwrap();
        assert_eq!(back, Some(stage));

        let absent: Option<Stage> = get_json(store.as_ref(), "missing").await.unwrap();
        assert!(absent.is_none());
    }
}

#[tokio::test]
async fn json_helper_reports_corrupt_payload() {
    let store = MemoryCheckpointStore::new();
    store.put("index_output", b"not json").await.unwrap();
    let err = get_json::<Stage>(&store, "index_output").await.unwrap_err();
    assert!(matches!(err, StorageError::Serialization { .. }));
}

#[test]
fn digest_of_json_is_stable() {
    let a = ContentDigest::of_json(&vec!["x", "y"]).unwrap();
    let b = ContentDigest::of_json(&vec!["x", "y"]).unwrap();
    let c = ContentDigest::of_json(&vec!["y", "x"]).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[tokio::test]
async fn memory_store_counts_writes() {
    let store = MemoryCheckpointStore::new();
    store.put("a", b"1").await.unwrap();
    store.put("b", b"2").await.unwrap();
    assert_eq!(store.write_count(), 2);
    assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
}
