//! Where matches go.

use assetmesh_core::{FilterId, MacAddress, OutputFormat, OutputKey};

/// One filter hit on one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetMatch {
    pub filter_id: FilterId,
    pub profile_id: u8,
    pub key: OutputKey,
    pub format: OutputFormat,
    /// Advertiser address and signal strength, as scanned.
    pub address: MacAddress,
    pub rssi: i8,
}

/// Receives matches from the dispatch engine.
///
/// Called synchronously from the scan path; implementations must not block.
pub trait AssetForwarder {
    fn forward(&mut self, asset: &AssetMatch);
}

impl<F: FnMut(&AssetMatch)> AssetForwarder for F {
    fn forward(&mut self, asset: &AssetMatch) {
        self(asset)
    }
}

/// A forwarder that keeps every match, for tests and host tools.
#[derive(Debug, Clone, Default)]
pub struct CollectingForwarder {
    pub matches: Vec<AssetMatch>,
}

impl CollectingForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn filter_ids(&self) -> Vec<FilterId> {
        self.matches.iter().map(|m| m.filter_id).collect()
    }

    pub fn clear(&mut self) {
        self.matches.clear();
    }
}

impl AssetForwarder for CollectingForwarder {
    fn forward(&mut self, asset: &AssetMatch) {
        self.matches.push(*asset);
    }
}
