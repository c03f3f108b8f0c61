//! AssetFilter: a committed filter blob with its parsed metadata.
//!
//! An `AssetFilter` owns the raw blob (`metadata || structure`) and is
//! immutable. The matching structure is never copied out of the blob; lookups
//! build a borrowed view over the structure bytes each time.

use std::fmt;

use bytes::Bytes;

use crate::advertisement::Advertisement;
use crate::checksum::crc16;
use crate::cuckoo::{CuckooFilter, CuckooHeader, CUCKOO_HEADER_LEN};
use crate::error::Result;
use crate::exact_match::{ExactMatchFilter, ExactMatchHeader, EXACT_MATCH_HEADER_LEN};
use crate::metadata::{FilterFlags, FilterMetadata, FilterType, InputType, OutputFormat};
use crate::types::{AssetId, FilterId, FilterSummary, MacAddress};

/// What a matching filter reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKey {
    Mac(MacAddress),
    AssetId(AssetId),
    /// Output format `None`: only the fact of the match.
    Detected,
}

/// Borrowed view of a filter's matching structure.
#[derive(Debug, Clone, Copy)]
pub enum FilterStructure<'a> {
    Cuckoo(CuckooFilter<'a>),
    ExactMatch(ExactMatchFilter<'a>),
}

impl FilterStructure<'_> {
    pub fn contains(&self, key: &[u8]) -> bool {
        match self {
            Self::Cuckoo(filter) => filter.contains(key),
            Self::ExactMatch(filter) => filter.contains(key),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Cuckoo(filter) => filter.size(),
            Self::ExactMatch(filter) => filter.size(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Geometry {
    Cuckoo(CuckooHeader),
    ExactMatch(ExactMatchHeader),
}

/// A validated, immutable filter.
#[derive(Clone)]
pub struct AssetFilter {
    id: FilterId,
    crc: u16,
    metadata: FilterMetadata,
    geometry: Geometry,
    structure_offset: usize,
    bytes: Bytes,
}

impl AssetFilter {
    /// Parse and validate a blob, computing its CRC.
    pub fn from_bytes(id: FilterId, bytes: Bytes) -> Result<Self> {
        let crc = crc16(&bytes);
        Self::parse(id, bytes, crc)
    }

    /// Parse and validate a blob whose CRC was computed while receiving it.
    ///
    /// Rejects unknown enum tags, unknown cuckoo layouts, unsorted exact-match
    /// items, and any blob whose length differs from what its metadata and
    /// structure header describe.
    pub fn parse(id: FilterId, bytes: Bytes, crc: u16) -> Result<Self> {
        let (metadata, structure_offset) = FilterMetadata::parse(&bytes)?;
        let body = &bytes[structure_offset..];

        let geometry = match metadata.filter_type {
            FilterType::Cuckoo => Geometry::Cuckoo(CuckooFilter::new(body)?.header()),
            FilterType::ExactMatch => {
                let filter = ExactMatchFilter::new(body)?;
                filter.validate()?;
                Geometry::ExactMatch(filter.header())
            }
        };

        Ok(Self {
            id,
            crc,
            metadata,
            geometry,
            structure_offset,
            bytes,
        })
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }

    pub fn summary(&self) -> FilterSummary {
        FilterSummary {
            filter_id: self.id,
            crc: self.crc,
        }
    }

    pub fn metadata(&self) -> &FilterMetadata {
        &self.metadata
    }

    pub fn filter_type(&self) -> FilterType {
        self.metadata.filter_type
    }

    pub fn input_type(&self) -> InputType {
        self.metadata.input
    }

    pub fn output_format(&self) -> OutputFormat {
        self.metadata.output
    }

    pub fn flags(&self) -> FilterFlags {
        self.metadata.flags
    }

    pub fn profile_id(&self) -> u8 {
        self.metadata.profile_id
    }

    /// Total blob length in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// The raw blob, as uploaded and persisted.
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn structure(&self) -> FilterStructure<'_> {
        let body = &self.bytes[self.structure_offset..];
        match self.geometry {
            Geometry::Cuckoo(header) => {
                FilterStructure::Cuckoo(CuckooFilter::from_parts(header, &body[CUCKOO_HEADER_LEN..]))
            }
            Geometry::ExactMatch(header) => FilterStructure::ExactMatch(
                ExactMatchFilter::from_parts(header, &body[EXACT_MATCH_HEADER_LEN..]),
            ),
        }
    }

    /// Whether `key` is in the filter's structure.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.structure().contains(key)
    }

    /// Whether the key described by the input type is present in `adv` and
    /// in the structure.
    pub fn matches_input(&self, adv: &Advertisement<'_>) -> bool {
        self.metadata
            .input
            .with_key(adv, |key| self.contains(key))
            .unwrap_or(false)
    }

    /// Match an advertisement.
    ///
    /// Extracts the key described by the input type, looks it up, and on a
    /// hit produces the output key. An asset-id output whose own source is
    /// absent from the advertisement yields no match. Flags are not applied
    /// here.
    pub fn matches(&self, adv: &Advertisement<'_>) -> Option<OutputKey> {
        if !self.matches_input(adv) {
            return None;
        }

        match self.metadata.output {
            OutputFormat::Mac => Some(OutputKey::Mac(adv.address)),
            OutputFormat::AssetId { source } => {
                source.with_key(adv, AssetId::derive).map(OutputKey::AssetId)
            }
            OutputFormat::None => Some(OutputKey::Detected),
        }
    }
}

impl fmt::Debug for AssetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetFilter")
            .field("id", &self.id)
            .field("crc", &format_args!("{:04x}", self.crc))
            .field("metadata", &self.metadata)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl PartialEq for AssetFilter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.crc == other.crc && self.bytes == other.bytes
    }
}

impl Eq for AssetFilter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::ad_types;
    use crate::error::CoreError;

    fn exact_blob(input: InputType, output: OutputFormat, flags: u8, items: &[&[u8]]) -> Bytes {
        let metadata = FilterMetadata {
            filter_type: FilterType::ExactMatch,
            flags: FilterFlags::from_bits(flags).unwrap(),
            profile_id: 3,
            input,
            output,
        };
        let mut out = metadata.to_bytes();
        out.push(items.len() as u8);
        out.push(items.first().map_or(1, |i| i.len() as u8));
        for item in items {
            out.extend_from_slice(item);
        }
        Bytes::from(out)
    }

    const MAC: [u8; 6] = [0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01];

    #[test]
    fn test_mac_filter_matches_address() {
        let blob = exact_blob(InputType::MacAddress, OutputFormat::Mac, 0, &[&MAC]);
        let filter = AssetFilter::from_bytes(FilterId(1), blob).unwrap();

        let adv = Advertisement::new(MacAddress(MAC), -50, &[]);
        assert_eq!(filter.matches(&adv), Some(OutputKey::Mac(MacAddress(MAC))));

        let other = Advertisement::new(MacAddress([0; 6]), -50, &[]);
        assert_eq!(filter.matches(&other), None);
    }

    #[test]
    fn test_asset_id_output_uses_its_own_source() {
        let data = [0x03, ad_types::MANUFACTURER_SPECIFIC_DATA, 0x12, 0x34];
        let blob = exact_blob(
            InputType::MacAddress,
            OutputFormat::AssetId {
                source: InputType::AdDataType { ad_type: 0xFF },
            },
            0,
            &[&MAC],
        );
        let filter = AssetFilter::from_bytes(FilterId(2), blob).unwrap();

        let adv = Advertisement::new(MacAddress(MAC), -50, &data);
        assert_eq!(
            filter.matches(&adv),
            Some(OutputKey::AssetId(AssetId::derive(&[0x12, 0x34])))
        );

        // Key matches but the asset id source is missing.
        let bare = Advertisement::new(MacAddress(MAC), -50, &[]);
        assert_eq!(filter.matches(&bare), None);
    }

    #[test]
    fn test_none_output_reports_detection() {
        let blob = exact_blob(InputType::MacAddress, OutputFormat::None, 0, &[&MAC]);
        let filter = AssetFilter::from_bytes(FilterId(3), blob).unwrap();
        let adv = Advertisement::new(MacAddress(MAC), -50, &[]);
        assert_eq!(filter.matches(&adv), Some(OutputKey::Detected));
    }

    #[test]
    fn test_accessors() {
        let blob = exact_blob(InputType::MacAddress, OutputFormat::Mac, 0x01, &[&MAC]);
        let crc = crc16(&blob);
        let filter = AssetFilter::from_bytes(FilterId(4), blob.clone()).unwrap();

        assert_eq!(filter.crc(), crc);
        assert_eq!(filter.size(), blob.len());
        assert_eq!(filter.as_bytes(), &blob);
        assert_eq!(filter.profile_id(), 3);
        assert!(filter.flags().is_exclusion());
        assert_eq!(filter.summary(), FilterSummary { filter_id: FilterId(4), crc });
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut blob = exact_blob(InputType::MacAddress, OutputFormat::Mac, 0, &[&MAC]).to_vec();
        blob.push(0);
        assert!(matches!(
            AssetFilter::from_bytes(FilterId(1), Bytes::from(blob)),
            Err(CoreError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_unsorted_items_rejected() {
        let blob = exact_blob(InputType::MacAddress, OutputFormat::Mac, 0, &[b"bb", b"aa"]);
        assert_eq!(
            AssetFilter::from_bytes(FilterId(1), blob).unwrap_err(),
            CoreError::Unsorted(1)
        );
    }
}
