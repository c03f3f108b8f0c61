//! Read-only cuckoo filter view.
//!
//! Layout:
//!
//! ```text
//! [layout_version: u8 = 1]
//! [bucket_count_log2: u8 <= 15]
//! [nests_per_bucket: u8 >= 1]
//! [fingerprint: u16 LE; (1 << bucket_count_log2) * nests_per_bucket]
//! ```
//!
//! Bucket `b` occupies slots `b * nests .. (b + 1) * nests`. A zero slot is
//! empty.
//!
//! A key hashes to a 16-bit fingerprint (CRC-16, with 0 remapped to 1) and a
//! 16-bit bucket hash (DJB2 truncated). Its two candidate buckets are
//! `hash mod n` and `(hash ^ fingerprint) mod n`. Because `n` is a power of
//! two, either bucket can be derived from the other and the fingerprint,
//! which is what lets an off-device builder relocate entries.
//!
//! Insertion never happens on a node. Devices only query.
//!
//! With `k` nests per bucket the false-positive rate is bounded by
//! `2k / 2^16` (two buckets of `k` slots, each slot a 1-in-65535 collision).

use crate::checksum::{crc16, djb2};
use crate::error::{CoreError, Result};

/// The only layout version this build understands.
pub const CUCKOO_LAYOUT_VERSION: u8 = 1;

/// Length of the cuckoo header.
pub const CUCKOO_HEADER_LEN: usize = 3;

/// Largest supported `bucket_count_log2`; bucket indices fit in a `u16`.
pub const MAX_BUCKET_COUNT_LOG2: u8 = 15;

/// Bytes per fingerprint slot.
pub const FINGERPRINT_LEN: usize = 2;

/// Slot value marking an empty nest.
pub const EMPTY_SLOT: u16 = 0;

/// A fingerprint together with its primary bucket.
///
/// This is the compact form in which a key can be handed to another filter of
/// the same geometry without revealing the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressedFingerprint {
    pub fingerprint: u16,
    pub bucket: u16,
}

/// A fingerprint together with both candidate buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtendedFingerprint {
    pub fingerprint: u16,
    pub bucket_a: u16,
    pub bucket_b: u16,
}

/// Fingerprint of a key. Never [`EMPTY_SLOT`].
pub fn fingerprint(key: &[u8]) -> u16 {
    match crc16(key) {
        EMPTY_SLOT => 1,
        fp => fp,
    }
}

/// Bucket hash of a key, before reduction to the bucket count.
pub fn bucket_hash(key: &[u8]) -> u16 {
    djb2(key) as u16
}

/// Geometry of a cuckoo structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuckooHeader {
    pub bucket_count_log2: u8,
    pub nests_per_bucket: u8,
}

impl CuckooHeader {
    /// Create a header, checking geometry limits.
    pub fn new(bucket_count_log2: u8, nests_per_bucket: u8) -> Result<Self> {
        if bucket_count_log2 > MAX_BUCKET_COUNT_LOG2 {
            return Err(CoreError::InvalidGeometry(format!(
                "bucket_count_log2 {} exceeds {}",
                bucket_count_log2, MAX_BUCKET_COUNT_LOG2
            )));
        }
        if nests_per_bucket == 0 {
            return Err(CoreError::InvalidGeometry(
                "nests_per_bucket must be non-zero".into(),
            ));
        }
        Ok(Self {
            bucket_count_log2,
            nests_per_bucket,
        })
    }

    /// Parse the header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CUCKOO_HEADER_LEN {
            return Err(CoreError::Truncated {
                what: "cuckoo header",
                needed: CUCKOO_HEADER_LEN,
                got: bytes.len(),
            });
        }
        if bytes[0] != CUCKOO_LAYOUT_VERSION {
            return Err(CoreError::UnsupportedLayout(bytes[0]));
        }
        Self::new(bytes[1], bytes[2])
    }

    /// Append the encoded header to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(CUCKOO_LAYOUT_VERSION);
        out.push(self.bucket_count_log2);
        out.push(self.nests_per_bucket);
    }

    pub fn bucket_count(&self) -> usize {
        1usize << self.bucket_count_log2
    }

    pub fn slot_count(&self) -> usize {
        self.bucket_count() * self.nests_per_bucket as usize
    }

    /// Total structure length this header describes, header included.
    pub fn structure_len(&self) -> usize {
        CUCKOO_HEADER_LEN + self.slot_count() * FINGERPRINT_LEN
    }

    fn bucket_mask(&self) -> u16 {
        (self.bucket_count() - 1) as u16
    }

    /// The other candidate bucket of a fingerprint stored in `bucket`.
    pub fn alternate_bucket(&self, bucket: u16, fingerprint: u16) -> u16 {
        (bucket ^ fingerprint) & self.bucket_mask()
    }

    pub fn extended_fingerprint(&self, key: &[u8]) -> ExtendedFingerprint {
        let fingerprint = fingerprint(key);
        let hash = bucket_hash(key);
        let bucket_a = hash & self.bucket_mask();
        ExtendedFingerprint {
            fingerprint,
            bucket_a,
            bucket_b: self.alternate_bucket(bucket_a, fingerprint),
        }
    }

    pub fn compressed_fingerprint(&self, key: &[u8]) -> CompressedFingerprint {
        let extended = self.extended_fingerprint(key);
        CompressedFingerprint {
            fingerprint: extended.fingerprint,
            bucket: extended.bucket_a,
        }
    }
}

/// Read-only view over a cuckoo structure.
#[derive(Debug, Clone, Copy)]
pub struct CuckooFilter<'a> {
    header: CuckooHeader,
    slots: &'a [u8],
}

impl<'a> CuckooFilter<'a> {
    /// Interpret `bytes` as a complete cuckoo structure.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let header = CuckooHeader::parse(bytes)?;
        let computed = header.structure_len();
        if bytes.len() != computed {
            return Err(CoreError::SizeMismatch {
                declared: bytes.len(),
                computed,
            });
        }
        Ok(Self::from_parts(header, &bytes[CUCKOO_HEADER_LEN..]))
    }

    /// Build a view from an already validated header and slot bytes.
    pub(crate) fn from_parts(header: CuckooHeader, slots: &'a [u8]) -> Self {
        debug_assert_eq!(slots.len(), header.slot_count() * FINGERPRINT_LEN);
        Self { header, slots }
    }

    pub fn header(&self) -> CuckooHeader {
        self.header
    }

    /// Whether `key` may be in the filter. Never false for an inserted key.
    pub fn contains(&self, key: &[u8]) -> bool {
        let ext = self.header.extended_fingerprint(key);
        self.bucket_contains(ext.bucket_a, ext.fingerprint)
            || self.bucket_contains(ext.bucket_b, ext.fingerprint)
    }

    /// Query with a fingerprint computed elsewhere.
    pub fn contains_fingerprint(&self, compressed: CompressedFingerprint) -> bool {
        let bucket = compressed.bucket & self.header.bucket_mask();
        let alternate = self.header.alternate_bucket(bucket, compressed.fingerprint);
        self.bucket_contains(bucket, compressed.fingerprint)
            || self.bucket_contains(alternate, compressed.fingerprint)
    }

    pub fn compressed_fingerprint(&self, key: &[u8]) -> CompressedFingerprint {
        self.header.compressed_fingerprint(key)
    }

    /// Byte length of the structure, header included.
    pub fn size(&self) -> usize {
        self.header.structure_len()
    }

    pub fn bucket_count(&self) -> usize {
        self.header.bucket_count()
    }

    pub fn nests_per_bucket(&self) -> usize {
        self.header.nests_per_bucket as usize
    }

    /// Number of non-empty slots.
    pub fn occupied_slots(&self) -> usize {
        (0..self.header.slot_count())
            .filter(|&i| self.slot(i) != EMPTY_SLOT)
            .count()
    }

    /// Fraction of slots in use.
    pub fn load_factor(&self) -> f64 {
        self.occupied_slots() as f64 / self.header.slot_count() as f64
    }

    fn bucket_contains(&self, bucket: u16, fingerprint: u16) -> bool {
        let nests = self.nests_per_bucket();
        let start = bucket as usize * nests;
        (start..start + nests).any(|i| self.slot(i) == fingerprint)
    }

    fn slot(&self, index: usize) -> u16 {
        let offset = index * FINGERPRINT_LEN;
        u16::from_le_bytes([self.slots[offset], self.slots[offset + 1]])
    }
}
