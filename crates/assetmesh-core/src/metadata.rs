//! Filter metadata: what a filter looks at and what it reports.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! [filter_type: u8] [flags: u8] [profile_id: u8] [input] [output]
//!
//! input  := 0                              MacAddress
//!         | 1 [ad_type: u8]                AdDataType
//!         | 2 [ad_type: u8] [mask: u32]    MaskedAdDataType
//!
//! output := 0                              Mac
//!         | 1 [input]                      AssetId derived from that input
//!         | 2                              None
//! ```

use serde::{Deserialize, Serialize};

use crate::advertisement::{Advertisement, MAX_AD_PAYLOAD_LEN};
use crate::error::{CoreError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Filter type
// ─────────────────────────────────────────────────────────────────────────────

/// Matching structure behind a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FilterType {
    Cuckoo = 0,
    ExactMatch = 1,
}

impl FilterType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Cuckoo),
            1 => Ok(Self::ExactMatch),
            other => Err(CoreError::UnknownFilterType(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flags
// ─────────────────────────────────────────────────────────────────────────────

/// Filter flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FilterFlags(u8);

impl FilterFlags {
    /// A match vetoes the whole advertisement.
    pub const EXCLUDE: u8 = 0x01;
    /// Never match advertisements sent by this node itself.
    pub const IGNORE_SELF: u8 = 0x02;

    const KNOWN: u8 = Self::EXCLUDE | Self::IGNORE_SELF;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Parse flags, rejecting reserved bits.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::KNOWN != 0 {
            return Err(CoreError::ReservedFlags(bits & !Self::KNOWN));
        }
        Ok(Self(bits))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn with(self, bit: u8) -> Self {
        Self(self.0 | bit)
    }

    pub const fn is_exclusion(self) -> bool {
        self.0 & Self::EXCLUDE != 0
    }

    pub const fn ignores_self(self) -> bool {
        self.0 & Self::IGNORE_SELF != 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input
// ─────────────────────────────────────────────────────────────────────────────

/// Which part of an advertisement a filter (or an asset id) is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputType {
    /// The 6-byte advertiser address.
    MacAddress,
    /// The payload of the first AD structure of this type.
    AdDataType { ad_type: u8 },
    /// That payload, keeping only the bytes whose bit is set in `mask`.
    MaskedAdDataType { ad_type: u8, mask: u32 },
}

impl InputType {
    const TAG_MAC: u8 = 0;
    const TAG_AD_DATA: u8 = 1;
    const TAG_MASKED_AD_DATA: u8 = 2;

    /// Parse an input description, returning it and the bytes consumed.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let tag = *bytes.first().ok_or(CoreError::Truncated {
            what: "input type",
            needed: 1,
            got: 0,
        })?;

        match tag {
            Self::TAG_MAC => Ok((Self::MacAddress, 1)),
            Self::TAG_AD_DATA => {
                require(bytes, 2, "ad data selector")?;
                Ok((Self::AdDataType { ad_type: bytes[1] }, 2))
            }
            Self::TAG_MASKED_AD_DATA => {
                require(bytes, 6, "masked ad data selector")?;
                let mask = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
                Ok((
                    Self::MaskedAdDataType {
                        ad_type: bytes[1],
                        mask,
                    },
                    6,
                ))
            }
            other => Err(CoreError::UnknownInputType(other)),
        }
    }

    /// Append the encoded input description to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Self::MacAddress => out.push(Self::TAG_MAC),
            Self::AdDataType { ad_type } => {
                out.push(Self::TAG_AD_DATA);
                out.push(ad_type);
            }
            Self::MaskedAdDataType { ad_type, mask } => {
                out.push(Self::TAG_MASKED_AD_DATA);
                out.push(ad_type);
                out.extend_from_slice(&mask.to_le_bytes());
            }
        }
    }

    /// Extract this input's key from `adv` and hand it to `f`.
    ///
    /// Returns `None` when the advertisement has no such key: the AD type is
    /// absent, or a masked payload is longer than [`MAX_AD_PAYLOAD_LEN`].
    /// The key is only borrowed for the duration of `f`; masked keys live in
    /// a stack buffer.
    pub fn with_key<R>(&self, adv: &Advertisement<'_>, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        match *self {
            Self::MacAddress => Some(f(adv.address.as_bytes())),
            Self::AdDataType { ad_type } => adv.find_ad_type(ad_type).map(f),
            Self::MaskedAdDataType { ad_type, mask } => {
                let payload = adv.find_ad_type(ad_type)?;
                let mut buf = [0u8; MAX_AD_PAYLOAD_LEN];
                let len = mask_payload(payload, mask, &mut buf)?;
                Some(f(&buf[..len]))
            }
        }
    }
}

/// Keep byte `i` of `payload` iff bit `i` of `mask` is set, packing kept bytes
/// into `out`. Returns the packed length, or `None` if `payload` is longer
/// than [`MAX_AD_PAYLOAD_LEN`].
pub fn mask_payload(payload: &[u8], mask: u32, out: &mut [u8; MAX_AD_PAYLOAD_LEN]) -> Option<usize> {
    if payload.len() > MAX_AD_PAYLOAD_LEN {
        return None;
    }

    let mut len = 0;
    for (i, &byte) in payload.iter().enumerate() {
        if mask & (1 << i) != 0 {
            out[len] = byte;
            len += 1;
        }
    }
    Some(len)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

/// What a filter reports when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    /// The advertiser's MAC address.
    Mac,
    /// A short asset id derived from the given input.
    AssetId { source: InputType },
    /// Only the fact that something matched.
    None,
}

impl OutputFormat {
    const TAG_MAC: u8 = 0;
    const TAG_ASSET_ID: u8 = 1;
    const TAG_NONE: u8 = 2;

    /// Parse an output description, returning it and the bytes consumed.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let tag = *bytes.first().ok_or(CoreError::Truncated {
            what: "output format",
            needed: 1,
            got: 0,
        })?;

        match tag {
            Self::TAG_MAC => Ok((Self::Mac, 1)),
            Self::TAG_ASSET_ID => {
                let (source, used) = InputType::parse(&bytes[1..])?;
                Ok((Self::AssetId { source }, 1 + used))
            }
            Self::TAG_NONE => Ok((Self::None, 1)),
            other => Err(CoreError::UnknownOutputFormat(other)),
        }
    }

    /// Append the encoded output description to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Mac => out.push(Self::TAG_MAC),
            Self::AssetId { source } => {
                out.push(Self::TAG_ASSET_ID);
                source.encode(out);
            }
            Self::None => out.push(Self::TAG_NONE),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Everything in a filter blob that precedes the matching structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterMetadata {
    pub filter_type: FilterType,
    pub flags: FilterFlags,
    pub profile_id: u8,
    pub input: InputType,
    pub output: OutputFormat,
}

impl FilterMetadata {
    /// Parse metadata from the start of a blob, returning it and its length.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        require(bytes, 3, "filter metadata")?;
        let filter_type = FilterType::from_u8(bytes[0])?;
        let flags = FilterFlags::from_bits(bytes[1])?;
        let profile_id = bytes[2];

        let mut offset = 3;
        let (input, used) = InputType::parse(&bytes[offset..])?;
        offset += used;
        let (output, used) = OutputFormat::parse(&bytes[offset..])?;
        offset += used;

        Ok((
            Self {
                filter_type,
                flags,
                profile_id,
                input,
                output,
            },
            offset,
        ))
    }

    /// Append the encoded metadata to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.filter_type.as_u8());
        out.push(self.flags.bits());
        out.push(self.profile_id);
        self.input.encode(out);
        self.output.encode(out);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

fn require(bytes: &[u8], needed: usize, what: &'static str) -> Result<()> {
    if bytes.len() < needed {
        return Err(CoreError::Truncated {
            what,
            needed,
            got: bytes.len(),
        });
    }
    Ok(())
}
