//! Allocation estimates charged to the memory budget by host operations.
//!
//! The figures approximate heap usage on a 64-bit target. They only need to
//! grow with the real footprint; exact byte counts are not a goal.

/// Bytes charged for a string header.
pub const STRING_HEADER: u64 = 16;
/// Bytes charged for an array header.
pub const ARRAY_HEADER: u64 = 40;
/// Bytes charged per stored value slot.
pub const VALUE_SLOT: u64 = 16;

const WORD: u64 = 8;

/// Converts a length to a byte count, saturating on exotic targets.
#[must_use]
pub fn bytes(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Estimated footprint of a string with `len` bytes of content.
#[must_use]
pub fn string(len: usize) -> u64 {
    let rounded = bytes(len).div_ceil(WORD).saturating_mul(WORD);
    STRING_HEADER.saturating_add(rounded)
}

/// Estimated footprint of an array with `len` elements.
#[must_use]
pub fn array(len: usize) -> u64 {
    ARRAY_HEADER.saturating_add(VALUE_SLOT.saturating_mul(bytes(len)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_up_to_whole_words() {
        assert_eq!(string(0), STRING_HEADER);
        assert_eq!(string(1), STRING_HEADER + 8);
        assert_eq!(string(9), STRING_HEADER + 16);
    }
}
