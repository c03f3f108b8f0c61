//! The dispatch engine: runs every scanned advertisement through the
//! committed filters.
//!
//! Two passes over the filters in id order:
//!
//! 1. Exclusion filters. Any hit vetoes the advertisement.
//! 2. Every other filter. Each hit is forwarded on its own; two filters
//!    matching the same advertisement produce two matches.
//!
//! Flag checks come before key extraction. Nothing on this path allocates.

use assetmesh_core::{Advertisement, AssetFilter, FilterId, MacAddress};
use assetmesh_store::{AssetFilterStore, FilterStorage};

use crate::forwarder::{AssetForwarder, AssetMatch};

/// Result of dispatching one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The store has no valid configuration; nothing was evaluated.
    NotReady,
    /// An exclusion filter matched. Nothing was forwarded.
    Rejected { by: FilterId },
    /// Inclusion pass finished with `count` matches forwarded (possibly 0).
    Matched { count: usize },
}

/// Running totals for the scan path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub scanned: u64,
    pub not_ready: u64,
    pub rejected: u64,
    pub matches: u64,
}

/// Matches advertisements against a store's committed filters.
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    own_address: MacAddress,
    stats: ScanStats,
}

impl DispatchEngine {
    /// `own_address` is this node's BLE address, used by `IGNORE_SELF`
    /// filters.
    pub fn new(own_address: MacAddress) -> Self {
        Self {
            own_address,
            stats: ScanStats::default(),
        }
    }

    pub fn own_address(&self) -> MacAddress {
        self.own_address
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn dispatch<S: FilterStorage>(
        &mut self,
        store: &AssetFilterStore<S>,
        adv: &Advertisement<'_>,
        forwarder: &mut impl AssetForwarder,
    ) -> ScanOutcome {
        self.stats.scanned += 1;
        if !store.is_ready() {
            self.stats.not_ready += 1;
            return ScanOutcome::NotReady;
        }

        let from_self = adv.address == self.own_address;
        let applies = |filter: &AssetFilter| !(from_self && filter.flags().ignores_self());

        for filter in store.filters() {
            if filter.flags().is_exclusion() && applies(filter) && filter.matches_input(adv) {
                self.stats.rejected += 1;
                return ScanOutcome::Rejected { by: filter.id() };
            }
        }

        let mut count = 0;
        for filter in store.filters() {
            if filter.flags().is_exclusion() || !applies(filter) {
                continue;
            }
            if let Some(key) = filter.matches(adv) {
                forwarder.forward(&AssetMatch {
                    filter_id: filter.id(),
                    profile_id: filter.profile_id(),
                    key,
                    format: filter.output_format(),
                    address: adv.address,
                    rssi: adv.rssi,
                });
                count += 1;
            }
        }

        self.stats.matches += count as u64;
        ScanOutcome::Matched { count }
    }
}
