//! Privacy masking applied before values enter audit records.

/// Mask a username to `first2 + "***" + last2`.
///
/// Names shorter than five characters are masked entirely; revealing
/// four of four characters would defeat the mask.
#[must_use]
pub fn mask_username(username: &str) -> String {
    let chars: Vec<char> = username.chars().collect();
    if chars.len() < 5 {
        return "***".to_owned();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

/// Truncate a session id to its first eight characters.
#[must_use]
pub fn truncate_session_id(session_id: &str) -> String {
    session_id.chars().take(8).collect()
}
