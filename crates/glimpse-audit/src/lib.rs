//! Glimpse Audit - Structured security events for the relay.
//!
//! Every security-relevant action (connections, admissions, denials,
//! bans, rate-limit hits, IP blocks) produces an [`AuditRecord`]
//! delivered to an injected [`AuditSink`].
//!
//! # Privacy
//!
//! Records mask usernames (`ab***ce`) and truncate session ids to
//! their first eight characters before they leave the process. Masking
//! happens at record construction, so no sink ever sees raw values.
//!
//! # Example
//!
//! ```
//! use glimpse_audit::{AuditEvent, AuditRecord, AuditSink, MemoryAuditSink};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sink = MemoryAuditSink::default();
//! let record = AuditRecord::new(AuditEvent::RoomCreated)
//!     .with_username("presenter_1")
//!     .with_room_id("demo")
//!     .with_detail("room created");
//! sink.record(record).await;
//! assert_eq!(sink.snapshot().len(), 1);
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod mask;
mod record;
mod sink;

pub use mask::{mask_username, truncate_session_id};
pub use record::{AuditEvent, AuditRecord, Severity};
pub use sink::{AuditSink, MemoryAuditSink, TracingAuditSink};
