//! Input validation predicates.
//!
//! Centralized so every caller applies the same rules before any state
//! change. Regexes are compiled once per process.

use std::sync::LazyLock;

use regex::Regex;

static ROOM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("invalid regex"));
static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,32}$").expect("invalid regex"));
static ACCESS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{6,12}$").expect("invalid regex"));

/// Room password length bounds (set at room creation).
pub const ROOM_PASSWORD_MIN: usize = 4;
/// Upper bound for room passwords.
pub const ROOM_PASSWORD_MAX: usize = 128;

/// `^[A-Za-z0-9_-]{1,64}$`
#[must_use]
pub fn is_valid_room_id(raw: &str) -> bool {
    ROOM_ID.is_match(raw)
}

/// `^[A-Za-z0-9_-]{3,32}$`
#[must_use]
pub fn is_valid_username(raw: &str) -> bool {
    USERNAME.is_match(raw)
}

/// Usernames compare case-insensitively; this is the canonical form.
#[must_use]
pub fn normalize_username(raw: &str) -> String {
    raw.to_lowercase()
}

/// `^[A-Z0-9]{6,12}$`
#[must_use]
pub fn is_valid_access_code(raw: &str) -> bool {
    ACCESS_CODE.is_match(raw)
}

/// Room passwords are length-checked only; the account-password
/// complexity rules below do not apply to them.
#[must_use]
pub fn is_valid_room_password(raw: &str) -> bool {
    (ROOM_PASSWORD_MIN..=ROOM_PASSWORD_MAX).contains(&raw.chars().count())
}

/// Account-password policy: which character classes are required.
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    /// Require an uppercase letter.
    pub require_upper: bool,
    /// Require a lowercase letter.
    pub require_lower: bool,
    /// Require a digit.
    pub require_digit: bool,
    /// Require a non-alphanumeric character.
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            require_upper: true,
            require_lower: true,
            require_digit: true,
            require_special: true,
        }
    }
}

/// Account passwords: 8-128 chars plus the configured complexity.
#[must_use]
pub fn is_valid_account_password(raw: &str, policy: PasswordPolicy) -> bool {
    let len = raw.chars().count();
    if !(8..=128).contains(&len) {
        return false;
    }
    if policy.require_upper && !raw.chars().any(|c| c.is_ascii_uppercase()) {
        return false;
    }
    if policy.require_lower && !raw.chars().any(|c| c.is_ascii_lowercase()) {
        return false;
    }
    if policy.require_digit && !raw.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if policy.require_special && raw.chars().all(char::is_alphanumeric) {
        return false;
    }
    true
}

/// Binary payloads must not exceed the configured maximum.
#[must_use]
pub fn is_valid_payload_size(size: usize, max: usize) -> bool {
    size <= max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_ids() {
        assert!(is_valid_room_id("a"));
        assert!(is_valid_room_id("team_standup-42"));
        assert!(is_valid_room_id(&"r".repeat(64)));
        assert!(!is_valid_room_id(""));
        assert!(!is_valid_room_id(&"r".repeat(65)));
        assert!(!is_valid_room_id("no spaces"));
        assert!(!is_valid_room_id("läuft"));
    }

    #[test]
    fn usernames() {
        assert!(is_valid_username("bob"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username(&"u".repeat(33)));
        assert_eq!(normalize_username("Alice"), "alice");
    }

    #[test]
    fn access_codes() {
        assert!(is_valid_access_code("ABCD2345"));
        assert!(is_valid_access_code("ABC123"));
        assert!(!is_valid_access_code("abc123"));
        assert!(!is_valid_access_code("ABC12"));
        assert!(!is_valid_access_code(&"A".repeat(13)));
    }

    #[test]
    fn room_passwords() {
        assert!(is_valid_room_password("abcd"));
        assert!(is_valid_room_password(&"p".repeat(128)));
        assert!(!is_valid_room_password("abc"));
        assert!(!is_valid_room_password(&"p".repeat(129)));
    }

    #[test]
    fn account_passwords() {
        let policy = PasswordPolicy::default();
        assert!(is_valid_account_password("Str0ng!pass", policy));
        assert!(!is_valid_account_password("weakpass", policy));
        assert!(!is_valid_account_password("Sh0rt!", policy));
        assert!(!is_valid_account_password("NoDigits!here", policy));

        let lax = PasswordPolicy {
            require_upper: false,
            require_lower: false,
            require_digit: false,
            require_special: false,
        };
        assert!(is_valid_account_password("justlongenough", lax));
    }

    #[test]
    fn payload_boundary() {
        assert!(is_valid_payload_size(10, 10));
        assert!(!is_valid_payload_size(11, 10));
    }
}
