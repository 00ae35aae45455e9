//! Glimpse Server - The WebSocket surface of the media relay.
//!
//! An axum HTTP server upgrades `/screenshare` connections to
//! WebSocket and runs each one through the connection supervisor:
//! blocked-IP check, bearer-token validation, session registration,
//! then the paired inbound/outbound loops against the relay engine.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod app;
mod connection;

pub use app::{AppState, router};
