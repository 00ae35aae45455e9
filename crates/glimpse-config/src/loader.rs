//! File discovery, env overrides, and validation.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Hard ceiling on per-room viewers, independent of configuration.
const VIEWER_HARD_CAP: u32 = 100;

/// Load configuration: defaults, then the optional file, then
/// `GLIMPSE_*` env overrides, then validation.
///
/// # Errors
///
/// Returns a [`ConfigError`] for an unreadable or malformed file, or
/// when the merged result fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<Config> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let parsed = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            info!(path = %path.display(), "loaded config file");
            parsed
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config);
    validate(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(bind) = env_string("GLIMPSE_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = env_parse::<u16>("GLIMPSE_PORT") {
        config.server.port = port;
    }
    if let Some(trust) = env_parse::<bool>("GLIMPSE_TRUST_PROXY_HEADERS") {
        config.server.trust_proxy_headers = trust;
    }
    if let Some(origins) = env_string("GLIMPSE_CORS_ORIGINS") {
        config.server.cors_origins = origins
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(max) = env_parse::<usize>("GLIMPSE_MAX_BINARY_PAYLOAD") {
        config.server.max_binary_payload = max;
    }
    if let Some(v) = env_parse::<u32>("GLIMPSE_MESSAGES_PER_SECOND") {
        config.limits.messages_per_second = v;
    }
    if let Some(v) = env_parse::<u32>("GLIMPSE_ROOM_CREATIONS_PER_HOUR") {
        config.limits.room_creations_per_hour = v;
    }
    if let Some(v) = env_parse::<u32>("GLIMPSE_FAILED_AUTH_BEFORE_BLOCK") {
        config.limits.failed_auth_before_block = v;
    }
    if let Some(v) = env_parse::<u64>("GLIMPSE_IP_BLOCK_DURATION_MINUTES") {
        config.limits.ip_block_duration_minutes = v;
    }
    if let Some(v) = env_parse::<usize>("GLIMPSE_MAX_ROOMS") {
        config.rooms.max_rooms = v;
    }
    if let Some(v) = env_parse::<u32>("GLIMPSE_MAX_VIEWERS_PER_ROOM") {
        config.rooms.max_viewers_per_room = v;
    }
    if let Some(v) = env_parse::<usize>("GLIMPSE_MAX_ROOMS_PER_USER") {
        config.rooms.max_rooms_per_user = v;
    }
    if let Some(v) = env_parse::<u64>("GLIMPSE_ACCESS_CODE_EXPIRY_HOURS") {
        config.rooms.access_code_expiry_hours = v;
    }
    if let Some(v) = env_parse::<u64>("GLIMPSE_IDLE_TIMEOUT_MINUTES") {
        config.rooms.idle_timeout_minutes = v;
    }
    if let Some(v) = env_string("GLIMPSE_JWT_ISSUER") {
        config.auth.jwt_issuer = Some(v);
    }
    if let Some(v) = env_string("GLIMPSE_JWT_SECRET") {
        config.auth.jwt_secret = Some(v);
    }
    if let Some(v) = env_parse::<u64>("GLIMPSE_JWT_EXPIRATION_MINUTES") {
        config.auth.jwt_expiration_minutes = Some(v);
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = raw, "ignoring unparseable env override");
            None
        }
    }
}

fn validate(config: &mut Config) -> ConfigResult<()> {
    if config.server.max_binary_payload == 0 {
        return Err(ConfigError::Invalid(
            "server.max_binary_payload must be positive".to_owned(),
        ));
    }
    if config.limits.messages_per_second == 0 {
        return Err(ConfigError::Invalid(
            "limits.messages_per_second must be positive".to_owned(),
        ));
    }
    if config.limits.room_creations_per_hour == 0 {
        return Err(ConfigError::Invalid(
            "limits.room_creations_per_hour must be positive".to_owned(),
        ));
    }
    if config.rooms.max_rooms == 0 {
        return Err(ConfigError::Invalid(
            "rooms.max_rooms must be positive".to_owned(),
        ));
    }
    if config.rooms.max_viewers_per_room == 0 {
        return Err(ConfigError::Invalid(
            "rooms.max_viewers_per_room must be positive".to_owned(),
        ));
    }
    if config.rooms.max_viewers_per_room > VIEWER_HARD_CAP {
        warn!(
            configured = config.rooms.max_viewers_per_room,
            cap = VIEWER_HARD_CAP,
            "clamping rooms.max_viewers_per_room"
        );
        config.rooms.max_viewers_per_room = VIEWER_HARD_CAP;
    }
    for entry in &config.auth.tokens {
        if !role_is_known(&entry.role) {
            return Err(ConfigError::Invalid(format!(
                "auth.tokens: unknown role `{}` for `{}`",
                entry.role, entry.username
            )));
        }
    }
    Ok(())
}

fn role_is_known(role: &str) -> bool {
    matches!(role, "user" | "admin")
}
