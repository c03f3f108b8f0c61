//! Test fixtures and helpers.
//!
//! Common setup code for store, engine and mesh tests.

use assetmesh_core::{crc16, master_crc, next_version, Advertisement, FilterId, MacAddress};
use assetmesh_store::{
    AssetFilterStore, CommitReport, FilterStorage, MemoryStorage, StoreConfig, StoreError,
    UploadProgress,
};

/// A store over fresh in-memory storage. The storage handle is kept so a
/// test can reopen the store from it.
pub struct StoreFixture {
    pub storage: MemoryStorage,
    pub store: AssetFilterStore<MemoryStorage>,
}

impl StoreFixture {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        let storage = MemoryStorage::new();
        let store = AssetFilterStore::open(storage.clone(), config).expect("open memory store");
        Self { storage, store }
    }

    /// Drop the store and open a new one from the same storage.
    pub fn reboot(&mut self) {
        let config = self.store.config().clone();
        self.store = AssetFilterStore::open(self.storage.clone(), config).expect("reopen store");
    }

    /// Upload and commit one filter with the correct expected pair.
    pub fn install(&mut self, id: u8, blob: &[u8]) -> CommitReport {
        install(&mut self.store, FilterId(id), blob).expect("install filter")
    }
}

impl Default for StoreFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Upload `blob` as consecutive chunks of at most `chunk_len` bytes.
pub fn upload_in_chunks<S: FilterStorage>(
    store: &mut AssetFilterStore<S>,
    id: FilterId,
    blob: &[u8],
    chunk_len: usize,
) -> Result<UploadProgress, StoreError> {
    let total = blob.len() as u16;
    let mut last = UploadProgress::Receiving {
        received: 0,
        total: blob.len(),
    };
    for (i, chunk) in blob.chunks(chunk_len.max(1)).enumerate() {
        let start = (i * chunk_len.max(1)) as u16;
        last = store.upload(id, total, chunk.len() as u16, start, chunk)?;
    }
    Ok(last)
}

/// The `(version, crc)` a commit will produce after adding `added` and
/// dropping `removed`, computed independently of the store.
pub fn expected_commit<S: FilterStorage>(
    store: &AssetFilterStore<S>,
    added: &[(FilterId, &[u8])],
    removed: &[FilterId],
) -> (u16, u16) {
    let mut entries: Vec<(FilterId, u16)> = store
        .filters()
        .map(|f| (f.id(), f.crc()))
        .filter(|(id, _)| !removed.contains(id) && !added.iter().any(|(a, _)| a == id))
        .collect();
    entries.extend(added.iter().map(|(id, blob)| (*id, crc16(blob))));
    entries.sort();
    (next_version(store.master_version()), master_crc(entries))
}

/// Upload `blob` in one chunk and commit it.
pub fn install<S: FilterStorage>(
    store: &mut AssetFilterStore<S>,
    id: FilterId,
    blob: &[u8],
) -> Result<CommitReport, StoreError> {
    let (version, crc) = expected_commit(store, &[(id, blob)], &[]);
    upload_in_chunks(store, id, blob, blob.len())?;
    store.commit(version, crc)
}

/// An owned advertisement for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestAdvertisement {
    pub address: MacAddress,
    pub rssi: i8,
    pub data: Vec<u8>,
}

impl TestAdvertisement {
    pub fn as_advertisement(&self) -> Advertisement<'_> {
        Advertisement::new(self.address, self.rssi, &self.data)
    }
}

/// Builds raw advertisement data AD structure by AD structure.
#[derive(Debug, Clone)]
pub struct AdvertisementBuilder {
    address: MacAddress,
    rssi: i8,
    data: Vec<u8>,
}

impl AdvertisementBuilder {
    pub fn new(address: [u8; 6]) -> Self {
        Self {
            address: MacAddress(address),
            rssi: -60,
            data: Vec::new(),
        }
    }

    pub fn rssi(mut self, rssi: i8) -> Self {
        self.rssi = rssi;
        self
    }

    /// Append an AD structure.
    pub fn ad(mut self, ad_type: u8, payload: &[u8]) -> Self {
        self.data.push(payload.len() as u8 + 1);
        self.data.push(ad_type);
        self.data.extend_from_slice(payload);
        self
    }

    /// Append raw bytes, e.g. trailing padding or a truncated record.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> TestAdvertisement {
        TestAdvertisement {
            address: self.address,
            rssi: self.rssi,
            data: self.data,
        }
    }
}

/// A deterministic MAC address for index `i`.
pub fn mac(i: u32) -> [u8; 6] {
    let b = i.to_be_bytes();
    [0xC0, 0xFF, b[0], b[1], b[2], b[3]]
}

/// `n` deterministic, distinct MAC addresses as keys.
pub fn mac_keys(n: u32) -> Vec<Vec<u8>> {
    (0..n).map(|i| mac(i).to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{exact_match_blob, FilterBlobBuilder};
    use assetmesh_core::{ad_types, FilterType};

    #[test]
    fn test_install_and_reboot() {
        let mut fixture = StoreFixture::new();
        let blob = exact_match_blob(FilterBlobBuilder::new(FilterType::ExactMatch), &mac_keys(3));
        let report = fixture.install(1, &blob);
        assert_eq!(report.master.version, 1);

        fixture.reboot();
        assert_eq!(fixture.store.master(), report.master);
    }

    #[test]
    fn test_expected_commit_for_replace_and_remove() {
        let mut fixture = StoreFixture::new();
        let a = exact_match_blob(FilterBlobBuilder::new(FilterType::ExactMatch), &mac_keys(1));
        let b = exact_match_blob(FilterBlobBuilder::new(FilterType::ExactMatch), &mac_keys(2));
        fixture.install(1, &a);
        fixture.install(2, &a);

        let (version, crc) = expected_commit(&fixture.store, &[(FilterId(1), &b)], &[FilterId(2)]);
        assert_eq!(version, 3);
        assert_eq!(crc, master_crc([(FilterId(1), crc16(&b))]));
    }

    #[test]
    fn test_advertisement_builder() {
        let adv = AdvertisementBuilder::new(mac(7))
            .ad(ad_types::FLAGS, &[0x06])
            .ad(ad_types::MANUFACTURER_SPECIFIC_DATA, &[0x59, 0x00, 0x01])
            .build();
        assert_eq!(adv.data, vec![2, 0x01, 0x06, 4, 0xFF, 0x59, 0x00, 0x01]);
        assert_eq!(
            adv.as_advertisement().find_ad_type(ad_types::MANUFACTURER_SPECIFIC_DATA),
            Some(&[0x59, 0x00, 0x01][..])
        );
    }
}
