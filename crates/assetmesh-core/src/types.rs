//! Strong type definitions for assetmesh.
//!
//! Identifiers are newtypes so a filter id cannot be confused with a profile
//! id, a version with a CRC, and so on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a filter within the store. Unique across the committed set.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FilterId(pub u8);

impl FilterId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterId({})", self.0)
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for FilterId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// A 6-byte BLE device address, in the byte order it was received.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl AsRef<[u8]> for MacAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

/// Domain separator for asset id derivation.
const ASSET_ID_DOMAIN: &[u8] = b"assetmesh-asset-id-v0:";

/// A short, deterministic identifier for a matched asset.
///
/// Derived from the matched key alone, so every node in the mesh reports the
/// same id for the same asset, across reboots.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub [u8; 3]);

impl AssetId {
    pub const LEN: usize = 3;

    /// Derive the asset id of a key.
    ///
    /// `AssetId = Blake3("assetmesh-asset-id-v0:" || key)[..3]`
    pub fn derive(key: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ASSET_ID_DOMAIN);
        hasher.update(key);
        let hash = hasher.finalize();

        let mut id = [0u8; Self::LEN];
        id.copy_from_slice(&hash.as_bytes()[..Self::LEN]);
        Self(id)
    }

    pub const fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.to_hex())
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The `(masterVersion, masterCrc)` pair describing a committed filter set.
///
/// Version 0 means the node holds no valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MasterSummary {
    pub version: u16,
    pub crc: u16,
}

impl MasterSummary {
    pub const fn new(version: u16, crc: u16) -> Self {
        Self { version, crc }
    }

    /// Whether this summary describes a usable configuration.
    pub const fn is_valid(&self) -> bool {
        self.version != 0
    }
}

impl fmt::Display for MasterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} crc={:04x}", self.version, self.crc)
    }
}

/// The `(filterId, crc)` pair reported for each committed filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSummary {
    pub filter_id: FilterId,
    pub crc: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_display() {
        let mac = MacAddress::from_bytes([0xaa, 0xbb, 0x0c, 0x01, 0x02, 0xff]);
        assert_eq!(format!("{}", mac), "AA:BB:0C:01:02:FF");
        assert_eq!(mac.to_hex(), "aabb0c0102ff");
    }

    #[test]
    fn test_asset_id_is_deterministic() {
        let a = AssetId::derive(b"tag-0042");
        let b = AssetId::derive(b"tag-0042");
        let c = AssetId::derive(b"tag-0043");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_asset_id_debug() {
        let id = AssetId([0x01, 0x02, 0x03]);
        assert_eq!(format!("{:?}", id), "AssetId(010203)");
    }

    #[test]
    fn test_filter_id_ordering() {
        assert!(FilterId(1) < FilterId(2));
        assert_eq!(FilterId::from(7).get(), 7);
    }

    #[test]
    fn test_master_summary_validity() {
        assert!(!MasterSummary::default().is_valid());
        assert!(MasterSummary::new(1, 0xffff).is_valid());
    }
}
