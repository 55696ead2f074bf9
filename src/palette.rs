/// Fixed ordered palette of style tokens for notice cards. Order matters:
/// the selector indexes into this array, so reordering entries changes the
/// color of every existing notice.
pub const PALETTE: [&str; 12] = [
    "blue", "purple", "pink", "green", "yellow", "orange", "teal", "indigo", "cyan", "rose",
    "emerald", "violet",
];

/// Classic `h = h*31 + codepoint` string hash in 32-bit signed wraparound
/// arithmetic. Matches color assignments produced by runtimes that truncate
/// to a signed 32-bit integer on every step, so stored/cached assignments
/// stay stable across implementations.
pub fn identifier_hash(id: &str) -> i32 {
    let mut hash: i32 = 0;
    for ch in id.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as i32);
    }
    hash
}

/// Map a raw hash to a palette index. `i32::MIN` has no positive counterpart
/// in two's complement; clamp it to `i32::MAX` so `abs()` cannot overflow.
pub fn index_for_hash(hash: i32) -> usize {
    let magnitude = if hash == i32::MIN { i32::MAX } else { hash.abs() };
    (magnitude as usize) % PALETTE.len()
}

/// Deterministic style token for an opaque identifier. Pure: same input,
/// same token, in this process or any other. The empty string hashes to 0
/// and always selects the first palette entry.
pub fn token_for(id: &str) -> &'static str {
    PALETTE[index_for_hash(identifier_hash(id))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifier_selects_first_entry() {
        assert_eq!(identifier_hash(""), 0);
        assert_eq!(token_for(""), "blue");
    }

    #[test]
    fn single_char_golden_value() {
        // 'a' = 97, 97 % 12 = 1.
        assert_eq!(identifier_hash("a"), 97);
        assert_eq!(token_for("a"), "purple");
    }

    #[test]
    fn abc_golden_value() {
        // ((0*31+97)*31+98)*31+99 = 96354; 96354 % 12 = 6.
        assert_eq!(identifier_hash("abc"), 96354);
        assert_eq!(index_for_hash(96354), 6);
        assert_eq!(token_for("abc"), "teal");
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        for id in ["", "a", "abc", "c7f9d2e0-1b4a-4f4e-9d7e-0a1b2c3d4e5f"] {
            assert_eq!(token_for(id), token_for(id));
        }
    }

    #[test]
    fn mod_twelve_collisions_share_a_token() {
        // 'a' = 97 and 'm' = 109 are congruent mod 12.
        assert_eq!(identifier_hash("a") % 12, identifier_hash("m") % 12);
        assert_eq!(token_for("a"), token_for("m"));
        assert_eq!(token_for("m"), "purple");
    }

    #[test]
    fn min_hash_clamps_instead_of_overflowing() {
        // i32::MAX % 12 == 7 -> "indigo".
        assert_eq!(index_for_hash(i32::MIN), (i32::MAX as usize) % PALETTE.len());
        assert_eq!(PALETTE[index_for_hash(i32::MIN)], "indigo");
    }

    #[test]
    fn known_min_hash_string_hits_the_clamp_path() {
        // Well-known string whose h*31+c hash is exactly i32::MIN.
        assert_eq!(identifier_hash("polygenelubricants"), i32::MIN);
        assert_eq!(token_for("polygenelubricants"), "indigo");
    }

    #[test]
    fn very_long_identifier_stays_in_range() {
        let id = "x".repeat(50_000);
        let idx = index_for_hash(identifier_hash(&id));
        assert!(idx < PALETTE.len());
        assert!(PALETTE.contains(&token_for(&id)));
    }

    #[test]
    fn realistic_ids_spread_across_the_palette() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            seen.insert(token_for(&format!("notice-{}", i)));
        }
        assert!(seen.len() >= 8, "only hit {} palette entries", seen.len());
    }
}
