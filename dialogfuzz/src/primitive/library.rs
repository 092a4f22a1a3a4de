//! Default fuzz-library generators: finite, ordered sequences of
//! candidate values for the three fuzzable primitive kinds.
//!
//! `crate::request::ElementSpec::fuzzable_int`/`fuzzable_string`/
//! `fuzzable_bytes` build these in automatically; nothing stops a caller
//! from supplying their own `Vec` to `Primitive::FuzzableInt` etc.
//! directly instead.

/// Boundary-value library for a signed/unsigned integer of the given
/// byte width, in ascending order: zero, one, the width's signed/unsigned
/// extremes and their neighbors, and a handful of powers of two.
pub fn int_library(width: u8, signed: bool) -> Vec<i64> {
    let bits = width as u32 * 8;
    let (min, max): (i64, i64) = if signed {
        if bits >= 64 {
            (i64::MIN, i64::MAX)
        } else {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        }
    } else if bits >= 64 {
        (0, i64::MAX)
    } else {
        (0, (1i64 << bits) - 1)
    };

    let mut values = vec![0, 1, -1, min, min.saturating_add(1), max, max.saturating_sub(1)];
    let mut power: i64 = 1;
    while power > 0 && power < max {
        values.push(power);
        values.push(power.saturating_sub(1));
        values.push(power.saturating_add(1));
        power = power.saturating_mul(2);
    }

    values.retain(|v| *v >= min && *v <= max);
    values.sort_unstable();
    values.dedup();
    values
}

/// Common string fuzz values: empty, very long, format-string markers,
/// path traversal, null bytes, and injected quote/script fragments.
pub fn string_library() -> Vec<String> {
    vec![
        String::new(),
        "A".repeat(256),
        "A".repeat(5000),
        "%s%s%s%s%s%s%s%s".to_string(),
        "%n%n%n%n".to_string(),
        "../../../../../../etc/passwd".to_string(),
        "\0".repeat(16),
        "' OR '1'='1".to_string(),
        "<script>alert(1)</script>".to_string(),
        "\u{202e}evil".to_string(),
    ]
}

/// Common byte-string fuzz values: empty, all-zero, all-`0xFF`, and a
/// single oversized block, each at the given nominal length.
pub fn bytes_library(nominal_len: usize) -> Vec<Vec<u8>> {
    vec![
        Vec::new(),
        vec![0x00; nominal_len],
        vec![0xFF; nominal_len],
        vec![0x41; nominal_len.max(1) * 64],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_library_u8_stays_in_range() {
        let lib = int_library(1, false);
        assert!(lib.iter().all(|v| *v >= 0 && *v <= 255));
        assert!(lib.contains(&0));
        assert!(lib.contains(&255));
    }

    #[test]
    fn int_library_i8_includes_negative_extreme() {
        let lib = int_library(1, true);
        assert!(lib.contains(&-128));
        assert!(lib.contains(&127));
    }

    #[test]
    fn string_library_nonempty_and_has_empty_case() {
        let lib = string_library();
        assert!(lib.contains(&String::new()));
        assert!(lib.len() > 3);
    }
}
