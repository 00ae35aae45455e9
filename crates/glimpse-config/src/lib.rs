//! Glimpse Config - Server configuration.
//!
//! Layering, lowest precedence first:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `GLIMPSE_*` environment variables
//!
//! The merged result is validated before use.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::load;
pub use types::{
    AuthConfig, Config, LimitsConfig, RoomsConfig, ServerConfig, TokenEntry,
};
