//! Glimpse Auth - Session admission and room credentials.
//!
//! Two concerns live here:
//!
//! - [`TokenValidator`]: the injected capability that turns an opaque
//!   bearer token into an [`Identity`](glimpse_core::Identity) at
//!   session admission. The relay never mints or refreshes tokens.
//! - [`credentials`]: password hashing/verification and access-code
//!   generation for password-protected rooms.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod credentials;
mod store;
mod token;

pub use store::{MemoryUserStore, StoreTokenValidator, UserAccount, UserStore};
pub use token::{AuthError, StaticTokenValidator, TokenValidator};
