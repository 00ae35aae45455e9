//! Glimpse Limits - Rate limiting and IP throttling.
//!
//! Two enforcement layers sit in front of the relay:
//!
//! - [`RateLimiter`]: exact sliding windows for per-session message
//!   caps and per-IP room-creation caps, with a background sweep that
//!   bounds bucket memory.
//! - [`IpThrottle`]: a synchronous in-memory block cache over an async
//!   durable [`BlockedIpStore`], plus the failed-authentication counter
//!   that escalates to a timed block.
//!
//! The admission path calls [`IpThrottle::is_blocked_sync`] before any
//! await point; durable storage is only touched off the hot path.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod block;
mod rate;

pub use block::{BlockedIpStore, IpBlock, IpThrottle, LockoutConfig, MemoryBlockedIpStore, StoreError};
pub use rate::{RateLimitConfig, RateLimiter};
