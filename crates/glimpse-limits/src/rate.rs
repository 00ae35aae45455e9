//! Sliding-window rate limiting.
//!
//! Buckets hold pruned timestamp deques so the window is exact: with a
//! cap of N, the N-th hit inside the window succeeds and the (N+1)-th
//! fails, regardless of where the window boundary falls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use glimpse_core::{RelayError, SessionId};
use tracing::debug;

/// Window sizes and caps.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Per-session inbound message cap per one-second window.
    pub messages_per_second: u32,
    /// Per-IP room-creation cap per one-hour window.
    pub room_creations_per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: 100,
            room_creations_per_hour: 10,
        }
    }
}

const MESSAGE_WINDOW: Duration = Duration::from_secs(1);
const CREATION_WINDOW: Duration = Duration::from_secs(3600);

/// Session buckets idle longer than this are swept.
const SESSION_IDLE: Duration = Duration::from_secs(5 * 60);
/// IP buckets idle longer than this are swept.
const IP_IDLE: Duration = Duration::from_secs(2 * 3600);

/// Interval of the background sweep.
pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Bucket {
    hits: Mutex<VecDeque<Instant>>,
    last_seen: Mutex<Instant>,
}

impl Bucket {
    fn new(now: Instant) -> Self {
        Self {
            hits: Mutex::new(VecDeque::new()),
            last_seen: Mutex::new(now),
        }
    }

    /// Prune expired hits, then admit or reject the new one.
    fn try_hit(&self, now: Instant, window: Duration, cap: u32) -> bool {
        if let Ok(mut last) = self.last_seen.lock() {
            *last = now;
        }
        let Ok(mut hits) = self.hits.lock() else {
            return true;
        };
        while let Some(front) = hits.front() {
            if now.duration_since(*front) >= window {
                hits.pop_front();
            } else {
                break;
            }
        }
        if hits.len() >= cap as usize {
            return false;
        }
        hits.push_back(now);
        true
    }

    fn idle_since(&self, now: Instant) -> Duration {
        self.last_seen
            .lock()
            .map_or(Duration::ZERO, |last| now.duration_since(*last))
    }
}

/// Sliding-window limiter for messages and room creations.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    sessions: DashMap<SessionId, Bucket>,
    ips: DashMap<String, Bucket>,
}

impl RateLimiter {
    /// Construct with the given caps.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            ips: DashMap::new(),
        }
    }

    /// Count one inbound message against the session's window.
    ///
    /// # Errors
    ///
    /// [`RelayError::RateLimited`] when the window is exhausted. The
    /// rejected message is not counted.
    pub fn check_message(&self, session_id: SessionId) -> Result<(), RelayError> {
        self.check_message_at(session_id, Instant::now())
    }

    pub(crate) fn check_message_at(
        &self,
        session_id: SessionId,
        now: Instant,
    ) -> Result<(), RelayError> {
        let bucket = self
            .sessions
            .entry(session_id)
            .or_insert_with(|| Bucket::new(now));
        if bucket.try_hit(now, MESSAGE_WINDOW, self.config.messages_per_second) {
            Ok(())
        } else {
            Err(RelayError::RateLimited)
        }
    }

    /// Count one room creation against the IP's window.
    ///
    /// # Errors
    ///
    /// [`RelayError::RoomCreationLimit`] when the window is exhausted.
    pub fn check_room_creation(&self, ip: &str) -> Result<(), RelayError> {
        self.check_room_creation_at(ip, Instant::now())
    }

    pub(crate) fn check_room_creation_at(&self, ip: &str, now: Instant) -> Result<(), RelayError> {
        let bucket = self
            .ips
            .entry(ip.to_owned())
            .or_insert_with(|| Bucket::new(now));
        if bucket.try_hit(now, CREATION_WINDOW, self.config.room_creations_per_hour) {
            Ok(())
        } else {
            Err(RelayError::RoomCreationLimit)
        }
    }

    /// Drop a session's bucket when the session ends.
    pub fn release_session(&self, session_id: SessionId) {
        self.sessions.remove(&session_id);
    }

    /// Remove idle buckets. Called by the background sweeper.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    pub(crate) fn sweep_at(&self, now: Instant) {
        let before = self.sessions.len() + self.ips.len();
        self.sessions
            .retain(|_, bucket| bucket.idle_since(now) < SESSION_IDLE);
        self.ips.retain(|_, bucket| bucket.idle_since(now) < IP_IDLE);
        let after = self.sessions.len() + self.ips.len();
        if after < before {
            debug!(swept = before - after, remaining = after, "rate-limit buckets swept");
        }
    }

    /// Spawn the periodic sweeper. The task runs until aborted.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.sweep();
            }
        })
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.sessions.len() + self.ips.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_is_exact_at_the_boundary() {
        let limiter = RateLimiter::new(RateLimitConfig {
            messages_per_second: 100,
            room_creations_per_hour: 10,
        });
        let session = SessionId::new();
        let now = Instant::now();

        for _ in 0..100 {
            assert!(limiter.check_message_at(session, now).is_ok());
        }
        assert_eq!(
            limiter.check_message_at(session, now),
            Err(RelayError::RateLimited)
        );
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(RateLimitConfig {
            messages_per_second: 2,
            room_creations_per_hour: 10,
        });
        let session = SessionId::new();
        let start = Instant::now();

        assert!(limiter.check_message_at(session, start).is_ok());
        assert!(limiter.check_message_at(session, start).is_ok());
        assert!(limiter.check_message_at(session, start).is_err());

        // One second later the window has fully passed.
        let later = start + Duration::from_millis(1001);
        assert!(limiter.check_message_at(session, later).is_ok());
    }

    #[test]
    fn rejected_hits_are_not_counted() {
        let limiter = RateLimiter::new(RateLimitConfig {
            messages_per_second: 1,
            room_creations_per_hour: 10,
        });
        let session = SessionId::new();
        let start = Instant::now();

        assert!(limiter.check_message_at(session, start).is_ok());
        // A burst of rejects must not extend the window.
        for _ in 0..50 {
            assert!(limiter.check_message_at(session, start).is_err());
        }
        let later = start + Duration::from_millis(1001);
        assert!(limiter.check_message_at(session, later).is_ok());
    }

    #[test]
    fn sessions_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            messages_per_second: 100,
            room_creations_per_hour: 10,
        });
        let a = SessionId::new();
        let b = SessionId::new();
        let now = Instant::now();

        for _ in 0..100 {
            assert!(limiter.check_message_at(a, now).is_ok());
            assert!(limiter.check_message_at(b, now).is_ok());
        }
        assert!(limiter.check_message_at(a, now).is_err());
        assert!(limiter.check_message_at(b, now).is_err());
    }

    #[test]
    fn room_creation_caps_per_ip() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let now = Instant::now();

        for _ in 0..10 {
            assert!(limiter.check_room_creation_at("198.51.100.7", now).is_ok());
        }
        assert_eq!(
            limiter.check_room_creation_at("198.51.100.7", now),
            Err(RelayError::RoomCreationLimit)
        );
        // A different IP is unaffected.
        assert!(limiter.check_room_creation_at("198.51.100.8", now).is_ok());
    }

    #[test]
    fn sweep_drops_idle_buckets() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let session = SessionId::new();
        let start = Instant::now();

        limiter.check_message_at(session, start).unwrap();
        limiter.check_room_creation_at("198.51.100.7", start).unwrap();
        assert_eq!(limiter.bucket_count(), 2);

        // After six minutes the session bucket is idle, the IP bucket is not.
        limiter.sweep_at(start + Duration::from_secs(6 * 60));
        assert_eq!(limiter.bucket_count(), 1);

        // After two hours the IP bucket goes too.
        limiter.sweep_at(start + Duration::from_secs(3 * 3600));
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn release_drops_session_state() {
        let limiter = RateLimiter::new(RateLimitConfig {
            messages_per_second: 1,
            room_creations_per_hour: 10,
        });
        let session = SessionId::new();
        let now = Instant::now();

        assert!(limiter.check_message_at(session, now).is_ok());
        assert!(limiter.check_message_at(session, now).is_err());
        limiter.release_session(session);
        assert!(limiter.check_message_at(session, now).is_ok());
    }
}
