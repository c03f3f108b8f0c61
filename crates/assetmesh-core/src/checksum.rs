//! Checksums and short hashes used across assetmesh.
//!
//! - CRC-16/CCITT-FALSE (poly `0x1021`, init `0xFFFF`) for filter CRCs, the
//!   master CRC and cuckoo fingerprints.
//! - DJB2 for cuckoo bucket selection.

use crc::{Crc, Digest, CRC_16_IBM_3740};

use crate::types::FilterId;

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC-16/CCITT-FALSE of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Incremental CRC-16, for data that arrives in chunks.
pub struct Crc16Digest {
    inner: Digest<'static, u16>,
}

impl Crc16Digest {
    pub fn new() -> Self {
        Self {
            inner: CRC16.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> u16 {
        self.inner.finalize()
    }
}

impl Default for Crc16Digest {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc16Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc16Digest").finish_non_exhaustive()
    }
}

/// Master CRC over a filter set.
///
/// Covers `id || crc_le` for every filter, in ascending id order. The caller
/// must supply the entries already sorted (a `BTreeMap` iteration is).
pub fn master_crc<I>(entries: I) -> u16
where
    I: IntoIterator<Item = (FilterId, u16)>,
{
    let mut digest = Crc16Digest::new();
    for (id, crc) in entries {
        digest.update(&[id.get()]);
        digest.update(&crc.to_le_bytes());
    }
    digest.finalize()
}

/// DJB2 string hash (`h = h * 33 + b`, seeded with 5381).
pub fn djb2(data: &[u8]) -> u32 {
    data.iter().fold(5381u32, |hash, &b| {
        hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(b as u32)
    })
}
