//! End-to-end filter update scenarios through the node's control channel.

use assetmesh::{CollectingForwarder, Node, NodeConfig, NodeError, ScanOutcome};
use assetmesh_core::{crc16, master_crc, CuckooFilter, FilterId, FilterType, MacAddress};
use assetmesh_store::{
    decode_summaries, FilterCommand, FilterStorage, MemoryStorage, SqliteStorage, StoreError,
};
use assetmesh_sync::NodeId;
use assetmesh_testkit::{
    exact_match_blob, expected_commit, mac, mac_keys, upload_in_chunks, AdvertisementBuilder,
    CuckooFilterBuilder, FilterBlobBuilder, StoreFixture,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A 100-byte cuckoo blob: 5 bytes of metadata, 3 of header, 2 buckets of 23
/// nests.
fn hundred_byte_cuckoo(keys: &[Vec<u8>]) -> Vec<u8> {
    let mut builder = CuckooFilterBuilder::new(1, 23).unwrap();
    for key in keys {
        assert!(builder.insert(key));
    }
    let blob = FilterBlobBuilder::new(FilterType::Cuckoo).build(&builder.build());
    assert_eq!(blob.len(), 100);
    blob
}

fn node(storage: MemoryStorage) -> Node<MemoryStorage> {
    let config = NodeConfig::new(NodeId(0x42), MacAddress([2; 6]));
    Node::open(storage, config, 0).unwrap()
}

fn command(node: &mut Node<MemoryStorage>, cmd: FilterCommand<'_>) -> Result<Vec<u8>, NodeError> {
    node.handle_command(cmd.kind(), &cmd.encode(), 0)
}

#[test]
fn two_chunk_upload_commit_then_remove() {
    init_tracing();
    let storage = MemoryStorage::new();
    let mut node = node(storage.clone());
    let blob = hundred_byte_cuckoo(&mac_keys(20));
    let filter_crc = crc16(&blob);

    for (start, chunk) in [(0u16, &blob[..50]), (50, &blob[50..])] {
        command(
            &mut node,
            FilterCommand::Upload {
                filter_id: FilterId(3),
                chunk_start: start,
                total_size: 100,
                chunk_size: 50,
                data: chunk,
            },
        )
        .unwrap();
    }

    let expected_crc = master_crc([(FilterId(3), filter_crc)]);
    command(
        &mut node,
        FilterCommand::Commit {
            master_version: 1,
            master_crc: expected_crc,
        },
    )
    .unwrap();

    let reply = command(&mut node, FilterCommand::GetSummaries).unwrap();
    let summaries = decode_summaries(&reply).unwrap();
    assert_eq!(summaries.master.version, 1);
    assert_eq!(summaries.master.crc, expected_crc);
    assert_eq!(summaries.filters.len(), 1);
    assert_eq!(summaries.filters[0].filter_id, FilterId(3));
    assert_eq!(summaries.filters[0].crc, filter_crc);

    let adv = AdvertisementBuilder::new(mac(7)).build();
    let mut out = CollectingForwarder::new();
    assert_eq!(
        node.on_scan(&adv.as_advertisement(), &mut out),
        ScanOutcome::Matched { count: 1 }
    );

    command(&mut node, FilterCommand::Remove { filter_id: FilterId(3) }).unwrap();
    command(
        &mut node,
        FilterCommand::Commit {
            master_version: 2,
            master_crc: master_crc(std::iter::empty::<(FilterId, u16)>()),
        },
    )
    .unwrap();

    let summaries = node.get_summaries();
    assert_eq!(summaries.master.version, 2);
    assert!(summaries.filters.is_empty());
    assert!(storage.load_filters().unwrap().is_empty());
}

#[test]
fn out_of_order_chunk_leaves_committed_set_unchanged() {
    init_tracing();
    let mut fixture = StoreFixture::new();
    let original = exact_match_blob(FilterBlobBuilder::new(FilterType::ExactMatch), &mac_keys(2));
    fixture.install(1, &original);
    let before = fixture.store.get_summaries();

    let blob = hundred_byte_cuckoo(&mac_keys(5));
    fixture.store.upload(FilterId(1), 100, 40, 0, &blob[..40]).unwrap();
    let err = fixture
        .store
        .upload(FilterId(1), 100, 40, 60, &blob[60..])
        .unwrap_err();
    assert!(matches!(err, StoreError::SequenceError { .. }));

    // A commit now has nothing staged and must still match the expected pair.
    let (version, crc) = expected_commit(&fixture.store, &[], &[]);
    fixture.store.commit(version, crc).unwrap();
    assert_eq!(fixture.store.get_summaries().filters, before.filters);
}

#[test]
fn wrong_crc_commit_is_rejected() {
    init_tracing();
    let mut node = node(MemoryStorage::new());
    let blob = hundred_byte_cuckoo(&mac_keys(3));
    upload_in_chunks_node(&mut node, 3, &blob);

    let right = master_crc([(FilterId(3), crc16(&blob))]);
    let err = command(
        &mut node,
        FilterCommand::Commit {
            master_version: 1,
            master_crc: right.wrapping_add(1),
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        NodeError::Store(StoreError::VersionConflict { .. })
    ));
    assert_eq!(node.master().version, 0);
    assert!(node.get_summaries().filters.is_empty());

    // Staging was cleared, so a retry must upload again.
    let err = command(
        &mut node,
        FilterCommand::Commit {
            master_version: 1,
            master_crc: right,
        },
    )
    .unwrap_err();
    assert!(matches!(err, NodeError::Store(StoreError::VersionConflict { .. })));
}

fn upload_in_chunks_node(node: &mut Node<MemoryStorage>, id: u8, blob: &[u8]) {
    for (i, chunk) in blob.chunks(32).enumerate() {
        node.upload(
            FilterId(id),
            blob.len() as u16,
            chunk.len() as u16,
            (i * 32) as u16,
            chunk,
        )
        .unwrap();
    }
}

#[test]
fn master_crc_is_independent_of_upload_order() {
    let a = exact_match_blob(FilterBlobBuilder::new(FilterType::ExactMatch), &mac_keys(2));
    let b = hundred_byte_cuckoo(&mac_keys(4));

    let mut first = StoreFixture::new();
    first.install(1, &a);
    first.install(5, &b);

    let mut second = StoreFixture::new();
    second.install(5, &b);
    second.install(1, &a);

    assert_eq!(first.store.master(), second.store.master());
    assert_eq!(
        first.store.master_crc(),
        master_crc([(FilterId(1), crc16(&a)), (FilterId(5), crc16(&b))])
    );
}

#[test]
fn reboot_restores_matching() {
    let mut fixture = StoreFixture::new();
    let blob = hundred_byte_cuckoo(&mac_keys(10));
    upload_in_chunks(&mut fixture.store, FilterId(2), &blob, 17).unwrap();
    let (version, crc) = expected_commit(&fixture.store, &[(FilterId(2), &blob)], &[]);
    fixture.store.commit(version, crc).unwrap();

    fixture.reboot();
    assert!(fixture.store.is_ready());
    let filter = fixture.store.get(FilterId(2)).unwrap();
    let structure = &filter.as_bytes()[5..];
    let cuckoo = CuckooFilter::new(structure).unwrap();
    for key in mac_keys(10) {
        assert!(cuckoo.contains(&key));
    }
}

#[test]
fn sqlite_node_restarts_ready_to_match() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.db");
    let config = NodeConfig::new(NodeId(0x42), MacAddress([2; 6]));
    let blob = exact_match_blob(FilterBlobBuilder::new(FilterType::ExactMatch), &mac_keys(3));

    let master = {
        let mut node = Node::open(SqliteStorage::open(&path).unwrap(), config.clone(), 0).unwrap();
        let (version, crc) = expected_commit(node.store(), &[(FilterId(4), &blob)], &[]);
        node.upload(FilterId(4), blob.len() as u16, blob.len() as u16, 0, &blob)
            .unwrap();
        node.commit(version, crc, 0).unwrap().master
    };

    let mut node = Node::open(SqliteStorage::open(&path).unwrap(), config, 0).unwrap();
    assert_eq!(node.master(), master);

    let adv = AdvertisementBuilder::new(mac(2)).build();
    let mut out = CollectingForwarder::new();
    assert_eq!(
        node.on_scan(&adv.as_advertisement(), &mut out),
        ScanOutcome::Matched { count: 1 }
    );
}
