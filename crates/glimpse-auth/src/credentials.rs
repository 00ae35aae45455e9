//! Room passwords and access codes.
//!
//! New passwords are hashed with bcrypt (cost 12). Verification also
//! accepts the legacy `base64(SHA-256(salt || password))` scheme so
//! rooms created by older deployments keep working; legacy comparison
//! is constant-time.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// bcrypt work factor for new hashes.
pub const BCRYPT_COST: u32 = 12;

/// Access-code alphabet. 32 characters; `0`, `O`, `1`, `I`, `L` are
/// excluded because codes are read aloud and retyped.
pub const ACCESS_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generated access-code length.
pub const ACCESS_CODE_LEN: usize = 8;

/// Default access-code lifetime.
pub const ACCESS_CODE_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 3600);

/// Hashing failure.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// bcrypt rejected the input.
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Hash a new room password with bcrypt.
///
/// # Errors
///
/// [`CredentialError::Hash`] if bcrypt fails (input longer than its
/// 72-byte limit, for instance).
pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Verify `password` against a stored hash.
///
/// `$2a`/`$2b`/`$2y` hashes go through bcrypt's own verify (bcrypt is
/// self-salted). Anything else is treated as the legacy scheme and
/// requires the room's stored salt; the comparison is constant-time.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str, legacy_salt: Option<&str>) -> bool {
    if is_bcrypt_hash(stored_hash) {
        return bcrypt::verify(password, stored_hash).unwrap_or(false);
    }
    let Some(salt) = legacy_salt else {
        return false;
    };
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let computed = BASE64.encode(hasher.finalize());
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

fn is_bcrypt_hash(hash: &str) -> bool {
    hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$")
}

/// Generate an access code from the restricted alphabet using the
/// OS CSPRNG.
#[must_use]
pub fn generate_access_code() -> String {
    let mut rng = rand::rngs::OsRng;
    (0..ACCESS_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ACCESS_CODE_ALPHABET.len());
            char::from(ACCESS_CODE_ALPHABET[idx])
        })
        .collect()
}

/// Four random lowercase hex characters, used to fork a room id when
/// the requested one is held by a live presenter.
#[must_use]
pub fn random_hex_suffix() -> String {
    let mut rng = rand::rngs::OsRng;
    (0..4)
        .map(|_| {
            let digit = rng.gen_range(0..16u32);
            char::from_digit(digit, 16).unwrap_or('0')
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcrypt_roundtrip() {
        let hash = hash_password("s3cret!!").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("s3cret!!", &hash, None));
        assert!(!verify_password("wrong", &hash, None));
    }

    #[test]
    fn legacy_scheme_verifies_with_salt() {
        let mut hasher = Sha256::new();
        hasher.update(b"pepper");
        hasher.update(b"s3cret!!");
        let stored = BASE64.encode(hasher.finalize());

        assert!(verify_password("s3cret!!", &stored, Some("pepper")));
        assert!(!verify_password("wrong", &stored, Some("pepper")));
        assert!(!verify_password("s3cret!!", &stored, Some("salt")));
        // Without the salt the legacy hash cannot match.
        assert!(!verify_password("s3cret!!", &stored, None));
    }

    #[test]
    fn access_codes_use_restricted_alphabet() {
        for _ in 0..50 {
            let code = generate_access_code();
            assert_eq!(code.len(), ACCESS_CODE_LEN);
            assert!(code.bytes().all(|b| ACCESS_CODE_ALPHABET.contains(&b)));
            for ambiguous in ['0', 'O', '1', 'I', 'L'] {
                assert!(!code.contains(ambiguous));
            }
        }
    }

    #[test]
    fn hex_suffix_shape() {
        for _ in 0..20 {
            let suffix = random_hex_suffix();
            assert_eq!(suffix.len(), 4);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
