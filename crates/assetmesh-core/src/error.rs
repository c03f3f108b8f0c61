//! Error types for assetmesh core.

use thiserror::Error;

/// Structural errors raised while parsing a filter blob.
///
/// Every variant means the bytes cannot be interpreted as a filter; none of
/// them are recoverable by retrying with the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("truncated {what}: need {needed} bytes, got {got}")]
    Truncated {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("unknown filter type: {0}")]
    UnknownFilterType(u8),

    #[error("unknown input type: {0}")]
    UnknownInputType(u8),

    #[error("unknown output format: {0}")]
    UnknownOutputFormat(u8),

    #[error("reserved flag bits set: {0:#04x}")]
    ReservedFlags(u8),

    #[error("unsupported cuckoo layout version: {0}")]
    UnsupportedLayout(u8),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("exact-match items not strictly ascending at index {0}")]
    Unsorted(usize),

    #[error("size mismatch: declared {declared} bytes, layout describes {computed}")]
    SizeMismatch { declared: usize, computed: usize },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
