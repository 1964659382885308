//! Account naming and password derivation for gateway-managed accounts.
//!
//! Each chat identity maps to exactly one game account. The account name
//! is a configured prefix plus the identity; the password is derived
//! from a process-wide secret so it survives restarts without storing
//! anything reversible.

use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Password prefix, present on both derived and random passwords.
const PASSWORD_PREFIX: &str = "pw_";

/// Hex digits kept from the derivation digest.
const DERIVED_HEX_LEN: usize = 20;

/// Longest in-game name the rename command template accepts.
const MAX_IC_NAME_LEN: usize = 30;

/// Game account name for a chat identity.
pub fn account_name(prefix: &str, identity: &str) -> String {
    format!("{prefix}{identity}")
}

/// Deterministic password for an identity under the shared secret.
///
/// Stable across restarts: same `(secret, identity)` pair, same
/// password. SHA-256 over `secret:identity`, truncated to 20 hex chars.
pub fn derive_password(secret: &str, identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(identity.as_bytes());
    let digest = hasher.finalize();

    format!("{PASSWORD_PREFIX}{}", hex_lower(&digest[..DERIVED_HEX_LEN / 2]))
}

/// Throwaway password for manually provisioned accounts.
pub fn random_password() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("{PASSWORD_PREFIX}{token}")
}

/// Reduce a chat display name to something the game accepts as a
/// character name: collapse whitespace, keep letters, digits, spaces,
/// apostrophes and hyphens, cap the length. Falls back to a neutral
/// name when nothing survives.
pub fn sanitize_in_game_name(display_name: &str) -> String {
    let collapsed = display_name.split_whitespace().collect::<Vec<_>>().join(" ");
    let filtered: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '\'' | '-'))
        .collect();
    let capped: String = filtered.trim().chars().take(MAX_IC_NAME_LEN).collect();
    let name = capped.trim();

    if name.is_empty() {
        "Adventurer".to_string()
    } else {
        name.to_string()
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_name_prefixed() {
        assert_eq!(account_name("chat_", "12345"), "chat_12345");
        assert_eq!(account_name("", "abc"), "abc");
    }

    #[test]
    fn test_derived_password_is_stable() {
        let a = derive_password("s3cret", "user-1");
        let b = derive_password("s3cret", "user-1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_derived_password_shape() {
        let pw = derive_password("s3cret", "user-1");
        assert!(pw.starts_with("pw_"));
        assert_eq!(pw.len(), PASSWORD_PREFIX.len() + DERIVED_HEX_LEN);
        assert!(pw[PASSWORD_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_derived_password_varies_by_inputs() {
        let base = derive_password("s3cret", "user-1");
        assert_ne!(base, derive_password("s3cret", "user-2"));
        assert_ne!(base, derive_password("other", "user-1"));
    }

    #[test]
    fn test_random_passwords_differ() {
        let a = random_password();
        let b = random_password();
        assert!(a.starts_with("pw_"));
        assert_eq!(a.len(), PASSWORD_PREFIX.len() + 24);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sanitize_collapses_and_filters() {
        assert_eq!(sanitize_in_game_name("  Ada   Lovelace  "), "Ada Lovelace");
        assert_eq!(sanitize_in_game_name("D'Arcy-Smith"), "D'Arcy-Smith");
        assert_eq!(sanitize_in_game_name("n4me! with* stars"), "n4me with stars");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(60);
        assert_eq!(sanitize_in_game_name(&long).len(), 30);
    }

    #[test]
    fn test_sanitize_fallback() {
        assert_eq!(sanitize_in_game_name(""), "Adventurer");
        assert_eq!(sanitize_in_game_name("!!!###"), "Adventurer");
    }
}
