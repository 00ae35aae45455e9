//! Glimpse Core - Shared types for the Glimpse media relay.
//!
//! This crate provides:
//! - Session and room identifiers
//! - The client/server wire protocol (JSON text frames)
//! - The stable error-code taxonomy
//! - Input validation predicates applied before any state change
//!
//! The relay never inspects media payloads beyond the shallow
//! init-segment check in `glimpse-relay`; everything here concerns the
//! control plane.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod id;
mod identity;
mod protocol;
pub mod validate;

pub use error::{ErrorCode, RelayError, RelayResult};
pub use id::{RoomId, SessionId};
pub use identity::{Identity, RoomRole, UserRole};
pub use protocol::{ClientCommand, ServerMessage};
