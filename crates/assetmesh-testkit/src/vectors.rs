//! Golden vectors for the hash functions filters are built with.
//!
//! A filter-building tool written in any language must reproduce these
//! values, or the blobs it produces will not match on a node.

use assetmesh_core::cuckoo::{bucket_hash, fingerprint};
use assetmesh_core::{crc16, master_crc, FilterId};
use serde::{Deserialize, Serialize};

/// Hash outputs for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashVector {
    pub name: String,
    /// Key, hex.
    pub key: String,
    pub crc16: u16,
    pub fingerprint: u16,
    pub bucket_hash: u16,
}

/// Every key vector.
pub fn hash_vectors() -> Vec<HashVector> {
    let v = |name: &str, key: &str, crc16, fingerprint, bucket_hash| HashVector {
        name: name.into(),
        key: key.into(),
        crc16,
        fingerprint,
        bucket_hash,
    };
    vec![
        v("check-string", "313233343536373839", 0x29B1, 0x29B1, 0xBB82),
        v("empty", "", 0xFFFF, 0xFFFF, 0x1505),
        v("single-zero", "00", 0xE1F0, 0xE1F0, 0xB5A5),
        v("asset-tag", "7461672d30303432", 0x0DBF, 0x0DBF, 0x91D4),
        v("mac", "aabbccddeeff", 0x5DE5, 0x5DE5, 0x8F00),
    ]
}

/// Check a vector against this build. Returns a description of the first
/// mismatch.
pub fn verify_vector(vector: &HashVector) -> Result<(), String> {
    let key = hex::decode(&vector.key).map_err(|e| format!("{}: bad hex: {}", vector.name, e))?;
    let checks = [
        ("crc16", crc16(&key), vector.crc16),
        ("fingerprint", fingerprint(&key), vector.fingerprint),
        ("bucket_hash", bucket_hash(&key), vector.bucket_hash),
    ];
    for (what, got, want) in checks {
        if got != want {
            return Err(format!(
                "{}: {} is {:04x}, expected {:04x}",
                vector.name, what, got, want
            ));
        }
    }
    Ok(())
}

/// Check every vector.
pub fn verify_all_vectors() -> Result<(), String> {
    hash_vectors().iter().try_for_each(verify_vector)?;

    let master = master_crc([(FilterId(1), 0x1234), (FilterId(3), 0xABCD)]);
    if master != 0x054E {
        return Err(format!("master crc is {:04x}, expected 054e", master));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_mismatch_is_reported() {
        let mut vector = hash_vectors().remove(0);
        vector.bucket_hash ^= 1;
        let err = verify_vector(&vector).unwrap_err();
        assert!(err.contains("bucket_hash"));
    }
}
