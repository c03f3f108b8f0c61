//! # assetmesh core
//!
//! Pure primitives for on-device asset filtering: filter blobs, their
//! matching structures, and the advertisements they are matched against.
//!
//! This crate contains no I/O, no storage, no networking, and performs no
//! allocation on the matching path.
//!
//! ## Key Types
//!
//! - [`AssetFilter`] - A validated, immutable filter blob
//! - [`CuckooFilter`] - Read-only cuckoo filter view (probabilistic)
//! - [`ExactMatchFilter`] - Sorted-array view (exact)
//! - [`FilterMetadata`] - Input type, output format, flags
//! - [`Advertisement`] - A scanned BLE advertisement
//! - [`MasterSummary`] - `(version, crc)` of a committed filter set
//!
//! ## Blob Layout
//!
//! A filter blob is `metadata || structure`. See [`metadata`] for the
//! metadata encoding, [`cuckoo`] and [`exact_match`] for the structures.
//! CRCs are CRC-16/CCITT-FALSE, see [`checksum`].

pub mod advertisement;
pub mod checksum;
pub mod cuckoo;
pub mod error;
pub mod exact_match;
pub mod filter;
pub mod metadata;
pub mod types;
pub mod version;

pub use advertisement::{ad_types, AdStructure, AdStructures, Advertisement, MAX_AD_PAYLOAD_LEN};
pub use checksum::{crc16, master_crc, Crc16Digest};
pub use cuckoo::{CompressedFingerprint, CuckooFilter, CuckooHeader, ExtendedFingerprint};
pub use error::{CoreError, Result};
pub use exact_match::{ExactMatchFilter, ExactMatchHeader};
pub use filter::{AssetFilter, FilterStructure, OutputKey};
pub use metadata::{FilterFlags, FilterMetadata, FilterType, InputType, OutputFormat};
pub use types::{AssetId, FilterId, FilterSummary, MacAddress, MasterSummary};
pub use version::{is_newer, next_version, NO_VERSION};
