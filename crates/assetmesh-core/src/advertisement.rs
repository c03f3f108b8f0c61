//! Scanned BLE advertisements and their AD structures.
//!
//! Advertisement data is a sequence of `[len][ad_type][payload; len - 1]`
//! records. Iteration borrows from the scan buffer and never allocates.

use crate::types::MacAddress;

/// Well-known AD types.
pub mod ad_types {
    pub const FLAGS: u8 = 0x01;
    pub const COMPLETE_16_BIT_SERVICE_UUIDS: u8 = 0x03;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    pub const SERVICE_DATA_16_BIT_UUID: u8 = 0x16;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

/// Maximum payload length of a single AD structure in a legacy advertisement.
pub const MAX_AD_PAYLOAD_LEN: usize = 31;

/// A scanned advertisement, as delivered by the scanning driver.
#[derive(Debug, Clone, Copy)]
pub struct Advertisement<'a> {
    pub address: MacAddress,
    pub rssi: i8,
    pub data: &'a [u8],
}

impl<'a> Advertisement<'a> {
    pub fn new(address: MacAddress, rssi: i8, data: &'a [u8]) -> Self {
        Self {
            address,
            rssi,
            data,
        }
    }

    /// Iterate the AD structures of this advertisement.
    pub fn ad_structures(&self) -> AdStructures<'a> {
        AdStructures::new(self.data)
    }

    /// Payload of the first AD structure with the given type.
    pub fn find_ad_type(&self, ad_type: u8) -> Option<&'a [u8]> {
        self.ad_structures()
            .find(|ad| ad.ad_type == ad_type)
            .map(|ad| ad.payload)
    }
}

/// One AD structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    pub ad_type: u8,
    pub payload: &'a [u8],
}

/// Iterator over AD structures.
///
/// Stops at a zero length byte (padding) or at a record that would run past
/// the end of the buffer.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    remaining: &'a [u8],
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { remaining: data }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = AdStructure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.remaining.split_first()?;
        let len = len as usize;
        if len == 0 || rest.len() < len {
            self.remaining = &[];
            return None;
        }

        let (record, tail) = rest.split_at(len);
        self.remaining = tail;
        Some(AdStructure {
            ad_type: record[0],
            payload: &record[1..],
        })
    }
}
