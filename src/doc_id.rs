//! Document identifier codec.
//!
//! Source identifiers are unsigned 64-bit values, but the index stores them in
//! a signed 64-bit sortable field. The ingest side shifts each identifier down
//! by 2^63 so that `[0, 2^64)` maps onto `[i64::MIN, i64::MAX]` with ordering
//! preserved; the read path shifts it back.

/// Map an original identifier into the index's signed sortable space.
pub fn encode(id: u64) -> i64 {
    // id + i64::MIN, computed without overflow
    (id as i64).wrapping_add(i64::MIN)
}

/// Recover the original identifier from its stored form.
pub fn decode(stored: i64) -> u64 {
    stored.wrapping_sub(i64::MIN) as u64
}

/// Decimal form of the original identifier; it may not fit a signed 64-bit display type.
pub fn decode_to_string(stored: i64) -> String {
    decode(stored).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(encode(0), i64::MIN);
        assert_eq!(encode(u64::MAX), i64::MAX);
        assert_eq!(encode(1 << 63), 0);

        assert_eq!(decode(i64::MIN), 0);
        assert_eq!(decode(i64::MAX), u64::MAX);
        assert_eq!(decode_to_string(i64::MAX), "18446744073709551615");
        assert_eq!(decode_to_string(i64::MIN), "0");
    }

    #[test]
    fn test_round_trip() {
        for id in [
            0,
            1,
            1_427_889_600_000,
            (1 << 63) - 1,
            1 << 63,
            (1 << 63) + 1,
            u64::MAX - 1,
            u64::MAX,
        ] {
            assert_eq!(decode(encode(id)), id, "{id}");
        }
    }

    #[test]
    fn test_matches_unbounded_arithmetic() {
        for stored in [i64::MIN, -1, 0, 1, 42, i64::MAX] {
            let expected = i128::from(stored) - i128::from(i64::MIN);
            assert_eq!(i128::from(decode(stored)), expected);
        }
    }

    #[test]
    fn test_preserves_order() {
        let ids = [0u64, 5, 1 << 62, 1 << 63, (1 << 63) + 7, u64::MAX];
        for pair in ids.windows(2) {
            assert!(encode(pair[0]) < encode(pair[1]));
        }
    }
}
