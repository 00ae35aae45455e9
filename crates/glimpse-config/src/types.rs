//! Configuration types.
//!
//! Every field has a serde default so a partial file (or no file at
//! all) yields a complete config.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limiting and lockout.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Room caps and lifetimes.
    #[serde(default)]
    pub rooms: RoomsConfig,
    /// Authentication surface.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "defaults::bind")]
    pub bind: String,
    /// Listener port.
    #[serde(default = "defaults::port")]
    pub port: u16,
    /// Honor `X-Forwarded-For` from a fronting proxy. Off by default;
    /// the socket peer address is used.
    #[serde(default)]
    pub trust_proxy_headers: bool,
    /// Allowed CORS origins; `*` means any.
    #[serde(default = "defaults::cors_origins")]
    pub cors_origins: Vec<String>,
    /// Maximum accepted binary payload, bytes.
    #[serde(default = "defaults::max_binary_payload")]
    pub max_binary_payload: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::bind(),
            port: defaults::port(),
            trust_proxy_headers: false,
            cors_origins: defaults::cors_origins(),
            max_binary_payload: defaults::max_binary_payload(),
        }
    }
}

/// Rate limiting and lockout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Per-session inbound messages per second.
    #[serde(default = "defaults::messages_per_second")]
    pub messages_per_second: u32,
    /// Per-IP room creations per hour.
    #[serde(default = "defaults::room_creations_per_hour")]
    pub room_creations_per_hour: u32,
    /// Failed authentications before an IP block.
    #[serde(default = "defaults::failed_auth_before_block")]
    pub failed_auth_before_block: u32,
    /// Duration of the resulting block, minutes.
    #[serde(default = "defaults::ip_block_duration_minutes")]
    pub ip_block_duration_minutes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            messages_per_second: defaults::messages_per_second(),
            room_creations_per_hour: defaults::room_creations_per_hour(),
            failed_auth_before_block: defaults::failed_auth_before_block(),
            ip_block_duration_minutes: defaults::ip_block_duration_minutes(),
        }
    }
}

/// Room caps and lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomsConfig {
    /// Cap on concurrently existing rooms.
    #[serde(default = "defaults::max_rooms")]
    pub max_rooms: usize,
    /// Per-room viewer cap; the hard ceiling is 100.
    #[serde(default = "defaults::max_viewers_per_room")]
    pub max_viewers_per_room: u32,
    /// Rooms a single user may present concurrently.
    #[serde(default = "defaults::max_rooms_per_user")]
    pub max_rooms_per_user: usize,
    /// Access-code lifetime, hours.
    #[serde(default = "defaults::access_code_expiry_hours")]
    pub access_code_expiry_hours: u64,
    /// Idle-session reap cutoff, minutes.
    #[serde(default = "defaults::idle_timeout_minutes")]
    pub idle_timeout_minutes: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            max_rooms: defaults::max_rooms(),
            max_viewers_per_room: defaults::max_viewers_per_room(),
            max_rooms_per_user: defaults::max_rooms_per_user(),
            access_code_expiry_hours: defaults::access_code_expiry_hours(),
            idle_timeout_minutes: defaults::idle_timeout_minutes(),
        }
    }
}

/// Authentication surface.
///
/// The JWT fields are carried for the external token-minting service;
/// the relay itself only consumes validated identities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// JWT issuer, for the external auth endpoints.
    #[serde(default)]
    pub jwt_issuer: Option<String>,
    /// JWT signing secret, for the external auth endpoints. Prefer the
    /// `GLIMPSE_JWT_SECRET` environment variable over the file.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// JWT lifetime, minutes.
    #[serde(default)]
    pub jwt_expiration_minutes: Option<u64>,
    /// Static tokens accepted by the standalone deployment.
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// One statically configured bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenEntry {
    /// The opaque token value.
    pub token: String,
    /// Username the token authenticates as.
    pub username: String,
    /// Account role, `user` or `admin`.
    #[serde(default = "defaults::role")]
    pub role: String,
}

pub(crate) mod defaults {
    pub(crate) fn bind() -> String {
        "0.0.0.0".to_owned()
    }
    pub(crate) fn port() -> u16 {
        8443
    }
    pub(crate) fn cors_origins() -> Vec<String> {
        vec!["*".to_owned()]
    }
    pub(crate) fn max_binary_payload() -> usize {
        10 * 1024 * 1024
    }
    pub(crate) fn messages_per_second() -> u32 {
        100
    }
    pub(crate) fn room_creations_per_hour() -> u32 {
        10
    }
    pub(crate) fn failed_auth_before_block() -> u32 {
        5
    }
    pub(crate) fn ip_block_duration_minutes() -> u64 {
        15
    }
    pub(crate) fn max_rooms() -> usize {
        500
    }
    pub(crate) fn max_viewers_per_room() -> u32 {
        100
    }
    pub(crate) fn max_rooms_per_user() -> usize {
        5
    }
    pub(crate) fn access_code_expiry_hours() -> u64 {
        24
    }
    pub(crate) fn idle_timeout_minutes() -> u64 {
        60
    }
    pub(crate) fn role() -> String {
        "user".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.limits.messages_per_second, 100);
        assert_eq!(config.rooms.max_viewers_per_room, 100);
        assert_eq!(config.rooms.idle_timeout_minutes, 60);
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [[auth.tokens]]
            token = "tok-1"
            username = "alice"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.auth.tokens[0].role, "user");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("[server]\nprot = 1\n").is_err());
    }
}
