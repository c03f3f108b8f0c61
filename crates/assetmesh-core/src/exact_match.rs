//! Exact-match filter: a sorted array of fixed-length keys.
//!
//! Layout: `[item_count: u8][item_size: u8][items; item_count * item_size]`
//! with items strictly ascending in lexicographic byte order. Lookup is a
//! binary search with no false positives.

use std::cmp::Ordering;

use crate::error::{CoreError, Result};

/// Length of the exact-match header.
pub const EXACT_MATCH_HEADER_LEN: usize = 2;

/// Fixed-size header of an exact-match structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactMatchHeader {
    pub item_count: u8,
    pub item_size: u8,
}

impl ExactMatchHeader {
    /// Parse the header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < EXACT_MATCH_HEADER_LEN {
            return Err(CoreError::Truncated {
                what: "exact-match header",
                needed: EXACT_MATCH_HEADER_LEN,
                got: bytes.len(),
            });
        }
        let header = Self {
            item_count: bytes[0],
            item_size: bytes[1],
        };
        if header.item_size == 0 {
            return Err(CoreError::InvalidGeometry("item_size must be non-zero".into()));
        }
        Ok(header)
    }

    /// Total structure length this header describes, header included.
    pub fn structure_len(&self) -> usize {
        EXACT_MATCH_HEADER_LEN + self.item_count as usize * self.item_size as usize
    }
}

/// Read-only view over an exact-match structure.
#[derive(Debug, Clone, Copy)]
pub struct ExactMatchFilter<'a> {
    header: ExactMatchHeader,
    items: &'a [u8],
}

impl<'a> ExactMatchFilter<'a> {
    /// Interpret `bytes` as a complete exact-match structure.
    ///
    /// Checks the header and total length. Sort order is checked separately
    /// by [`validate`](Self::validate) since it costs a pass over the items.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let header = ExactMatchHeader::parse(bytes)?;
        let computed = header.structure_len();
        if bytes.len() != computed {
            return Err(CoreError::SizeMismatch {
                declared: bytes.len(),
                computed,
            });
        }
        Ok(Self::from_parts(header, &bytes[EXACT_MATCH_HEADER_LEN..]))
    }

    /// Build a view from an already validated header and item bytes.
    pub(crate) fn from_parts(header: ExactMatchHeader, items: &'a [u8]) -> Self {
        debug_assert_eq!(
            items.len(),
            header.item_count as usize * header.item_size as usize
        );
        Self { header, items }
    }

    pub fn header(&self) -> ExactMatchHeader {
        self.header
    }

    /// Check that items are strictly ascending.
    pub fn validate(&self) -> Result<()> {
        for i in 1..self.item_count() {
            if self.item(i - 1) >= self.item(i) {
                return Err(CoreError::Unsorted(i));
            }
        }
        Ok(())
    }

    /// Whether `key` is one of the items.
    pub fn contains(&self, key: &[u8]) -> bool {
        if key.len() != self.item_size() {
            return false;
        }

        let mut lo = 0;
        let mut hi = self.item_count();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.item(mid).cmp(key) {
                Ordering::Equal => return true,
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        false
    }

    pub fn item_count(&self) -> usize {
        self.header.item_count as usize
    }

    pub fn item_size(&self) -> usize {
        self.header.item_size as usize
    }

    /// Byte length of the structure, header included.
    pub fn size(&self) -> usize {
        self.header.structure_len()
    }

    /// Iterate the items in order.
    pub fn items(&self) -> impl Iterator<Item = &'a [u8]> {
        self.items.chunks_exact(self.item_size())
    }

    fn item(&self, index: usize) -> &'a [u8] {
        let size = self.item_size();
        &self.items[index * size..(index + 1) * size]
    }
}
