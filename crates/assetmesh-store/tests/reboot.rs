//! Store behaviour across a simulated power cycle on SQLite-backed storage.

use assetmesh_core::{crc16, master_crc, FilterFlags, FilterId, FilterMetadata, FilterType, InputType, OutputFormat};
use assetmesh_store::{AssetFilterStore, FilterStorage, SqliteStorage, StoreConfig, StoreError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn exact_match_blob(items: &[[u8; 6]]) -> Vec<u8> {
    let mut out = FilterMetadata {
        filter_type: FilterType::ExactMatch,
        flags: FilterFlags::empty(),
        profile_id: 2,
        input: InputType::MacAddress,
        output: OutputFormat::Mac,
    }
    .to_bytes();
    out.push(items.len() as u8);
    out.push(6);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

#[test]
fn committed_set_survives_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.db");

    let blob = exact_match_blob(&[[0x10; 6], [0x20; 6]]);
    let expected_crc = master_crc([(FilterId(6), crc16(&blob))]);
    {
        let storage = SqliteStorage::open(&path).unwrap();
        let mut store = AssetFilterStore::open(storage, StoreConfig::default()).unwrap();
        let total = blob.len() as u16;
        store.upload(FilterId(6), total, 10, 0, &blob[..10]).unwrap();
        store.upload(FilterId(6), total, total - 10, 10, &blob[10..]).unwrap();
        store.commit(1, expected_crc).unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    let store = AssetFilterStore::open(storage, StoreConfig::default()).unwrap();
    assert!(store.is_ready());
    assert_eq!(store.master_version(), 1);
    assert_eq!(store.master_crc(), expected_crc);
    assert_eq!(store.get(FilterId(6)).unwrap().as_bytes().as_ref(), &blob[..]);
}

#[test]
fn failed_commit_writes_nothing() {
    init_tracing();
    let storage = SqliteStorage::open_memory().unwrap();
    let mut store = AssetFilterStore::open(storage.clone(), StoreConfig::default()).unwrap();

    let blob = exact_match_blob(&[[0x10; 6]]);
    let total = blob.len() as u16;
    store.upload(FilterId(1), total, total, 0, &blob).unwrap();
    let err = store.commit(5, 0).unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));

    assert!(storage.load_filters().unwrap().is_empty());
    assert_eq!(storage.load_master().unwrap(), None);
}

#[test]
fn removal_is_persisted() {
    init_tracing();
    let storage = SqliteStorage::open_memory().unwrap();
    let mut store = AssetFilterStore::open(storage.clone(), StoreConfig::default()).unwrap();

    let blob = exact_match_blob(&[[0x10; 6]]);
    let total = blob.len() as u16;
    store.upload(FilterId(1), total, total, 0, &blob).unwrap();
    store
        .commit(1, master_crc([(FilterId(1), crc16(&blob))]))
        .unwrap();

    store.remove(FilterId(1)).unwrap();
    store.commit(2, master_crc(std::iter::empty::<(FilterId, u16)>())).unwrap();

    assert!(storage.load_filters().unwrap().is_empty());
    let reopened = AssetFilterStore::open(storage, StoreConfig::default()).unwrap();
    assert_eq!(reopened.master_version(), 2);
    assert!(reopened.is_empty());
}
