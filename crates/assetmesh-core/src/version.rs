//! Master version arithmetic.
//!
//! Versions live in `1..=0xFFFF`; 0 is reserved for "no valid configuration".
//! Incrementing wraps from `0xFFFF` back to 1, and ordering uses serial number
//! arithmetic so a wrapped version still compares as newer.

/// The version of a node that holds no valid configuration.
pub const NO_VERSION: u16 = 0;

/// Number of distinct non-zero versions.
const VERSION_SPACE: u32 = 0xFFFF;

/// The version a successful commit produces after `current`.
pub const fn next_version(current: u16) -> u16 {
    match current.wrapping_add(1) {
        0 => 1,
        v => v,
    }
}

/// Whether `candidate` is strictly newer than `current`.
///
/// A non-zero version is newer than [`NO_VERSION`]; [`NO_VERSION`] is never
/// newer than anything.
pub fn is_newer(candidate: u16, current: u16) -> bool {
    if candidate == NO_VERSION {
        return false;
    }
    if current == NO_VERSION {
        return true;
    }

    let distance = (candidate as u32 + VERSION_SPACE - current as u32) % VERSION_SPACE;
    distance != 0 && distance <= VERSION_SPACE / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_skips_zero() {
        assert_eq!(next_version(0), 1);
        assert_eq!(next_version(1), 2);
        assert_eq!(next_version(0xFFFE), 0xFFFF);
        assert_eq!(next_version(0xFFFF), 1);
    }

    #[test]
    fn test_is_newer_basic() {
        assert!(is_newer(2, 1));
        assert!(!is_newer(1, 2));
        assert!(!is_newer(5, 5));
    }

    #[test]
    fn test_is_newer_zero() {
        assert!(is_newer(1, NO_VERSION));
        assert!(!is_newer(NO_VERSION, 1));
        assert!(!is_newer(NO_VERSION, NO_VERSION));
    }

    #[test]
    fn test_is_newer_across_wrap() {
        assert!(is_newer(1, 0xFFFF));
        assert!(is_newer(3, 0xFFF0));
        assert!(!is_newer(0xFFFF, 1));
    }

    #[test]
    fn test_next_is_always_newer() {
        for v in [1u16, 100, 0x7FFF, 0x8000, 0xFFFE, 0xFFFF] {
            assert!(is_newer(next_version(v), v), "next of {v}");
        }
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn newer_is_antisymmetric(a in 1u16.., b in 1u16..) {
                prop_assert!(!(is_newer(a, b) && is_newer(b, a)));
            }

            #[test]
            fn distinct_versions_are_ordered(a in 1u16.., b in 1u16..) {
                prop_assume!(a != b);
                prop_assert!(is_newer(a, b) || is_newer(b, a));
            }
        }
    }
}
