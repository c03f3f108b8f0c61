//! Off-device filter construction.
//!
//! Nodes only ever read filters. These builders play the part of the
//! configuration tool: they insert keys (with cuckoo eviction), sort
//! exact-match items and prepend metadata to produce uploadable blobs.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use assetmesh_core::cuckoo::EMPTY_SLOT;
use assetmesh_core::{
    CoreError, CuckooHeader, FilterFlags, FilterMetadata, FilterType, InputType, OutputFormat,
};

/// Relocations attempted before an insert is declared a failure.
pub const DEFAULT_MAX_KICKS: usize = 500;

/// Builds a cuckoo structure by inserting keys.
#[derive(Debug, Clone)]
pub struct CuckooFilterBuilder {
    header: CuckooHeader,
    slots: Vec<u16>,
    rng: StdRng,
    max_kicks: usize,
    len: usize,
}

impl CuckooFilterBuilder {
    pub fn new(bucket_count_log2: u8, nests_per_bucket: u8) -> Result<Self, CoreError> {
        let header = CuckooHeader::new(bucket_count_log2, nests_per_bucket)?;
        Ok(Self {
            slots: vec![EMPTY_SLOT; header.slot_count()],
            header,
            rng: StdRng::seed_from_u64(0x5EED),
            max_kicks: DEFAULT_MAX_KICKS,
            len: 0,
        })
    }

    /// Smallest geometry with `nests_per_bucket` that holds `keys` at or
    /// below 90% load.
    pub fn for_capacity(keys: usize, nests_per_bucket: u8) -> Result<Self, CoreError> {
        let nests = nests_per_bucket.max(1) as usize;
        let mut log2 = 0u8;
        while (1usize << log2) * nests * 9 < keys * 10 {
            log2 += 1;
        }
        Self::new(log2, nests_per_bucket)
    }

    /// Use a specific seed for eviction choices.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn max_kicks(mut self, max_kicks: usize) -> Self {
        self.max_kicks = max_kicks;
        self
    }

    pub fn header(&self) -> CuckooHeader {
        self.header
    }

    /// Number of keys inserted.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a key. Returns false if the table is too full; the table is then
    /// left exactly as it was.
    pub fn insert(&mut self, key: &[u8]) -> bool {
        let ext = self.header.extended_fingerprint(key);
        if self.try_place(ext.bucket_a, ext.fingerprint)
            || self.try_place(ext.bucket_b, ext.fingerprint)
        {
            self.len += 1;
            return true;
        }

        let snapshot = self.slots.clone();
        let nests = self.header.nests_per_bucket as usize;
        let mut bucket = if self.rng.gen() { ext.bucket_a } else { ext.bucket_b };
        let mut fingerprint = ext.fingerprint;

        for _ in 0..self.max_kicks {
            let victim = bucket as usize * nests + self.rng.gen_range(0..nests);
            std::mem::swap(&mut fingerprint, &mut self.slots[victim]);
            bucket = self.header.alternate_bucket(bucket, fingerprint);
            if self.try_place(bucket, fingerprint) {
                self.len += 1;
                return true;
            }
        }

        self.slots = snapshot;
        false
    }

    /// The encoded structure: header followed by little-endian slots.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.structure_len());
        self.header.encode(&mut out);
        for slot in &self.slots {
            out.extend_from_slice(&slot.to_le_bytes());
        }
        out
    }

    fn try_place(&mut self, bucket: u16, fingerprint: u16) -> bool {
        let nests = self.header.nests_per_bucket as usize;
        let start = bucket as usize * nests;
        match self.slots[start..start + nests]
            .iter_mut()
            .find(|slot| **slot == EMPTY_SLOT)
        {
            Some(slot) => {
                *slot = fingerprint;
                true
            }
            None => false,
        }
    }
}

/// Builds an exact-match structure. Items are kept sorted and deduplicated.
#[derive(Debug, Clone)]
pub struct ExactMatchBuilder {
    item_size: u8,
    items: BTreeSet<Vec<u8>>,
}

impl ExactMatchBuilder {
    pub fn new(item_size: u8) -> Self {
        Self {
            item_size,
            items: BTreeSet::new(),
        }
    }

    /// Add an item. Returns false if it has the wrong length or the table
    /// already holds 255 items.
    pub fn insert(&mut self, item: &[u8]) -> bool {
        if item.len() != self.item_size as usize || self.items.len() >= u8::MAX as usize {
            return false;
        }
        self.items.insert(item.to_vec());
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.items.len() * self.item_size as usize);
        out.push(self.items.len() as u8);
        out.push(self.item_size);
        for item in &self.items {
            out.extend_from_slice(item);
        }
        out
    }
}

/// Prepends filter metadata to a structure.
#[derive(Debug, Clone, Copy)]
pub struct FilterBlobBuilder {
    metadata: FilterMetadata,
}

impl FilterBlobBuilder {
    /// A MAC-keyed, MAC-reporting filter of the given type.
    pub fn new(filter_type: FilterType) -> Self {
        Self {
            metadata: FilterMetadata {
                filter_type,
                flags: FilterFlags::empty(),
                profile_id: 0,
                input: InputType::MacAddress,
                output: OutputFormat::Mac,
            },
        }
    }

    pub fn input(mut self, input: InputType) -> Self {
        self.metadata.input = input;
        self
    }

    pub fn output(mut self, output: OutputFormat) -> Self {
        self.metadata.output = output;
        self
    }

    pub fn profile_id(mut self, profile_id: u8) -> Self {
        self.metadata.profile_id = profile_id;
        self
    }

    pub fn exclude(mut self) -> Self {
        self.metadata.flags = self.metadata.flags.with(FilterFlags::EXCLUDE);
        self
    }

    pub fn ignore_self(mut self) -> Self {
        self.metadata.flags = self.metadata.flags.with(FilterFlags::IGNORE_SELF);
        self
    }

    pub fn metadata(&self) -> FilterMetadata {
        self.metadata
    }

    pub fn build(&self, structure: &[u8]) -> Vec<u8> {
        let mut out = self.metadata.to_bytes();
        out.extend_from_slice(structure);
        out
    }
}

/// A cuckoo filter blob over `keys`, sized for them.
///
/// Panics if the keys cannot all be placed, which only happens for geometries
/// far above the builder's target load.
pub fn cuckoo_blob(meta: FilterBlobBuilder, keys: &[Vec<u8>], nests_per_bucket: u8) -> Vec<u8> {
    let mut builder = CuckooFilterBuilder::for_capacity(keys.len(), nests_per_bucket)
        .expect("geometry for capacity");
    for key in keys {
        assert!(builder.insert(key), "cuckoo table full");
    }
    meta.build(&builder.build())
}

/// An exact-match filter blob over `items`, which must all share one length.
pub fn exact_match_blob(meta: FilterBlobBuilder, items: &[Vec<u8>]) -> Vec<u8> {
    let item_size = items.first().map_or(1, |i| i.len() as u8);
    let mut builder = ExactMatchBuilder::new(item_size);
    for item in items {
        assert!(builder.insert(item), "exact-match item rejected");
    }
    meta.build(&builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetmesh_core::{AssetFilter, CuckooFilter, ExactMatchFilter, FilterId};

    fn keys(n: usize) -> Vec<Vec<u8>> {
        (0..n as u32).map(|i| i.to_be_bytes().to_vec()).collect()
    }

    #[test]
    fn test_cuckoo_no_false_negatives() {
        let keys = keys(200);
        let mut builder = CuckooFilterBuilder::for_capacity(keys.len(), 4).unwrap();
        for key in &keys {
            assert!(builder.insert(key));
        }
        let bytes = builder.build();
        let filter = CuckooFilter::new(&bytes).unwrap();
        for key in &keys {
            assert!(filter.contains(key));
        }
        assert_eq!(filter.occupied_slots(), 200);
    }

    #[test]
    fn test_full_table_is_left_unchanged() {
        let mut builder = CuckooFilterBuilder::new(0, 2).unwrap().max_kicks(10);
        let mut inserted = Vec::new();
        for key in keys(10) {
            if builder.insert(&key) {
                inserted.push(key);
            } else {
                break;
            }
        }
        assert_eq!(inserted.len(), 2);
        let bytes = builder.build();
        let filter = CuckooFilter::new(&bytes).unwrap();
        for key in &inserted {
            assert!(filter.contains(key));
        }
    }

    #[test]
    fn test_for_capacity_geometry() {
        let builder = CuckooFilterBuilder::for_capacity(100, 4).unwrap();
        assert_eq!(builder.header().bucket_count(), 32);
        let builder = CuckooFilterBuilder::for_capacity(0, 4).unwrap();
        assert_eq!(builder.header().bucket_count(), 1);
    }

    #[test]
    fn test_exact_match_sorted() {
        let mut builder = ExactMatchBuilder::new(2);
        assert!(builder.insert(&[9, 9]));
        assert!(builder.insert(&[1, 1]));
        assert!(builder.insert(&[1, 1]));
        assert!(!builder.insert(&[1]));
        let bytes = builder.build();
        assert_eq!(bytes, vec![2, 2, 1, 1, 9, 9]);
        let filter = ExactMatchFilter::new(&bytes).unwrap();
        filter.validate().unwrap();
    }

    #[test]
    fn test_blob_parses_as_asset_filter() {
        let blob = cuckoo_blob(
            FilterBlobBuilder::new(FilterType::Cuckoo).profile_id(4).exclude(),
            &keys(10),
            2,
        );
        let filter = AssetFilter::from_bytes(FilterId(1), blob.into()).unwrap();
        assert_eq!(filter.profile_id(), 4);
        assert!(filter.flags().is_exclusion());
        assert!(filter.contains(&keys(1)[0]));
    }
}
