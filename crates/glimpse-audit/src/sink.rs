//! Sink adapters.
//!
//! The relay core holds an `Arc<dyn AuditSink>`; the deployment picks
//! the implementation. The tracing sink is the standalone default; a
//! durable store lives behind the same trait on the admin side.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::record::{AuditRecord, Severity};

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Deliver one record. Must not fail the calling operation; sinks
    /// swallow their own errors.
    async fn record(&self, record: AuditRecord);
}

/// Emits records as structured `tracing` events under the `audit`
/// target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        let event = format!("{:?}", record.event_type);
        match record.severity {
            Severity::Debug | Severity::Info => info!(
                target: "audit",
                event = %event,
                username = record.username.as_deref().unwrap_or("-"),
                session_id = record.session_id.as_deref().unwrap_or("-"),
                room_id = record.room_id.as_deref().unwrap_or("-"),
                ip = record.ip_address.as_deref().unwrap_or("-"),
                details = %record.details,
            ),
            Severity::Warn => warn!(
                target: "audit",
                event = %event,
                username = record.username.as_deref().unwrap_or("-"),
                session_id = record.session_id.as_deref().unwrap_or("-"),
                room_id = record.room_id.as_deref().unwrap_or("-"),
                ip = record.ip_address.as_deref().unwrap_or("-"),
                details = %record.details,
            ),
            Severity::Error | Severity::Critical => error!(
                target: "audit",
                event = %event,
                username = record.username.as_deref().unwrap_or("-"),
                session_id = record.session_id.as_deref().unwrap_or("-"),
                room_id = record.room_id.as_deref().unwrap_or("-"),
                ip = record.ip_address.as_deref().unwrap_or("-"),
                details = %record.details,
            ),
        }
    }
}

/// Collects records in memory. Used by tests and as the seam for the
/// external durable store.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Copy out everything recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records matching an event type.
    #[must_use]
    pub fn count_of(&self, event_type: crate::AuditEvent) -> usize {
        self.snapshot()
            .iter()
            .filter(|r| r.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuditEvent;

    #[tokio::test]
    async fn memory_sink_collects_in_order() {
        let sink = MemoryAuditSink::default();
        sink.record(AuditRecord::new(AuditEvent::SessionConnected))
            .await;
        sink.record(AuditRecord::new(AuditEvent::SessionDisconnected))
            .await;

        let records = sink.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, AuditEvent::SessionConnected);
        assert_eq!(records[1].event_type, AuditEvent::SessionDisconnected);
        assert_eq!(sink.count_of(AuditEvent::SessionConnected), 1);
    }

    #[tokio::test]
    async fn tracing_sink_does_not_panic() {
        TracingAuditSink
            .record(
                AuditRecord::new(AuditEvent::IpBlocked)
                    .with_ip("203.0.113.9")
                    .with_detail("5 failed authentications"),
            )
            .await;
    }
}
