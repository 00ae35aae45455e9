//! Glimpse Relay - The room-and-session relay engine.
//!
//! A single [`RelayEngine`] owns the session table and the room
//! registry. Connection tasks feed it decoded commands and binary
//! frames; it mutates room state under per-room mutexes and talks back
//! to sessions exclusively through their bounded outbound queues.
//!
//! # Locking discipline
//!
//! - The room mutex serializes every command against one room and is
//!   never held across an `.await`.
//! - A session's membership mutex may be taken while holding its
//!   room's mutex, never the other way around.
//! - Enqueueing onto an outbound queue is non-blocking (`try_send`);
//!   a full queue drops the frame for that session only.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod engine;
pub mod media;
mod registry;
mod room;
mod session;

pub use engine::{EngineConfig, RelayEngine};
pub use session::{OutboundFrame, SessionHandle, SessionTable, OUTBOUND_QUEUE_CAPACITY};
