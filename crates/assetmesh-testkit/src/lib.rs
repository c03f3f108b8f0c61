//! # Assetmesh Testkit
//!
//! Testing utilities for assetmesh.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Builders**: Off-device filter construction (cuckoo insertion with
//!   eviction, sorted exact-match tables, metadata)
//! - **Fixtures**: Store setup, chunked uploads, expected commit pairs,
//!   advertisement construction
//! - **Generators**: Proptest strategies for property-based testing
//! - **Golden vectors**: Hash outputs every filter-building tool must match
//!
//! ## Building a filter
//!
//! ```rust
//! use assetmesh_core::{FilterType, InputType, OutputFormat};
//! use assetmesh_testkit::builders::{cuckoo_blob, FilterBlobBuilder};
//!
//! let keys = vec![b"tag-0001".to_vec(), b"tag-0002".to_vec()];
//! let blob = cuckoo_blob(
//!     FilterBlobBuilder::new(FilterType::Cuckoo)
//!         .input(InputType::AdDataType { ad_type: 0x09 })
//!         .output(OutputFormat::AssetId { source: InputType::AdDataType { ad_type: 0x09 } }),
//!     &keys,
//!     4,
//! );
//! assert!(!blob.is_empty());
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use assetmesh_testkit::fixtures::{mac_keys, StoreFixture};
//! use assetmesh_testkit::builders::{exact_match_blob, FilterBlobBuilder};
//! use assetmesh_core::FilterType;
//!
//! let mut fixture = StoreFixture::new();
//! let blob = exact_match_blob(FilterBlobBuilder::new(FilterType::ExactMatch), &mac_keys(4));
//! let report = fixture.install(1, &blob);
//! assert_eq!(report.master.version, 1);
//! ```

pub mod builders;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use builders::{
    cuckoo_blob, exact_match_blob, CuckooFilterBuilder, ExactMatchBuilder, FilterBlobBuilder,
};
pub use fixtures::{
    expected_commit, install, mac, mac_keys, upload_in_chunks, AdvertisementBuilder,
    StoreFixture, TestAdvertisement,
};
pub use generators::ExactMatchParams;
pub use vectors::{hash_vectors, verify_all_vectors, HashVector};
