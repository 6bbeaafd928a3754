use rand::rngs::OsRng;
use rand::RngCore;

pub const TOKEN_PREFIX: &str = "xp1_";

/// 192 bits from the OS CSPRNG.
const TOKEN_BYTES: usize = 24;

pub const MAX_TOKEN_LEN: usize = 256;

/// Generate a fresh opaque badge value: `xp1_<48 hex chars>`.
pub fn generate() -> String {
    let mut random_bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut random_bytes);
    format!("{}{}", TOKEN_PREFIX, hex::encode(random_bytes))
}

/// Cheap shape check before touching the store. Scanners hand us whatever the
/// camera decoded, so this rejects obvious garbage rather than enforcing the
/// current prefix (older badges may carry a different one).
pub fn is_well_formed(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_TOKEN_LEN
        && value.chars().all(|c| c.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_token_shape() {
        let t = generate();
        assert!(t.starts_with(TOKEN_PREFIX));
        let hex_part = &t[TOKEN_PREFIX.len()..];
        assert_eq!(hex_part.len(), TOKEN_BYTES * 2);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(is_well_formed(&t));
    }

    #[test]
    fn test_generated_tokens_are_distinct() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_malformed_values() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("has space"));
        assert!(!is_well_formed("tab\there"));
        assert!(!is_well_formed("ünïcode"));
        assert!(!is_well_formed(&"x".repeat(MAX_TOKEN_LEN + 1)));
        assert!(is_well_formed("legacy-badge-123"));
    }
}
