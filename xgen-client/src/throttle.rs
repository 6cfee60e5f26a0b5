//! Refresh-request throttling.
//!
//! The host ticks faster than the interval (half of it, usually). A request
//! goes out only when the previous one was answered with full telemetry or
//! has been outstanding for longer than the interval.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Nothing was ever requested.
    FirstRequest,
    /// The previous request got its full-telemetry reply.
    ResponseReceived,
    /// The previous request is unanswered but older than the interval.
    TimedOut,
    /// Still waiting on the previous request.
    Pending,
}

impl ThrottleDecision {
    pub fn should_request(self) -> bool {
        !matches!(self, ThrottleDecision::Pending)
    }
}

/// Request/response timestamps. `last_response` is `None` while a request
/// is pending.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timing {
    last_request: Option<Instant>,
    last_response: Option<Instant>,
}

impl Timing {
    pub fn decide(&self, now: Instant, interval: Duration) -> ThrottleDecision {
        match self.last_request {
            None => ThrottleDecision::FirstRequest,
            Some(_) if self.last_response.is_some() => ThrottleDecision::ResponseReceived,
            Some(sent) if now.saturating_duration_since(sent) > interval => ThrottleDecision::TimedOut,
            Some(_) => ThrottleDecision::Pending,
        }
    }

    pub fn mark_requested(&mut self, now: Instant) {
        self.last_request = Some(now);
        self.last_response = None;
    }

    pub fn mark_responded(&mut self, now: Instant) {
        self.last_response = Some(now);
    }

    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }

    pub fn last_response(&self) -> Option<Instant> {
        self.last_response
    }
}

/// Timing state behind the timestamp lock.
///
/// The lock is async so the whole decide-and-publish sequence can hold it
/// across the publish call.
pub struct RequestThrottler {
    interval: Duration,
    timing: Mutex<Timing>,
}

impl RequestThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timing: Mutex::new(Timing::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn lock(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().await
    }

    pub async fn record_response(&self) {
        self.timing.lock().await.mark_responded(Instant::now());
    }

    pub async fn snapshot(&self) -> Timing {
        *self.timing.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(300);

    #[test]
    fn test_first_tick_always_requests() {
        let timing = Timing::default();
        assert_eq!(timing.decide(Instant::now(), INTERVAL), ThrottleDecision::FirstRequest);
    }

    #[test]
    fn test_pending_request_suppresses() {
        let start = Instant::now();
        let mut timing = Timing::default();
        timing.mark_requested(start);

        let decision = timing.decide(start + Duration::from_secs(5), INTERVAL);
        assert_eq!(decision, ThrottleDecision::Pending);
        assert!(!decision.should_request());

        // Exactly the interval is not enough.
        assert_eq!(timing.decide(start + INTERVAL, INTERVAL), ThrottleDecision::Pending);
    }

    #[test]
    fn test_elapsed_interval_overrides_pending() {
        let start = Instant::now();
        let mut timing = Timing::default();
        timing.mark_requested(start);
        let later = start + INTERVAL + Duration::from_millis(1);
        assert_eq!(timing.decide(later, INTERVAL), ThrottleDecision::TimedOut);
    }

    /// Any full reply re-arms the next poll, even seconds after the request.
    #[test]
    fn test_decision_table() {
        let start = Instant::now();
        let soon = start + Duration::from_secs(5);
        let late = start + Duration::from_secs(301);

        let mut answered = Timing::default();
        answered.mark_requested(start);
        answered.mark_responded(start + Duration::from_secs(1));
        assert_eq!(answered.decide(soon, INTERVAL), ThrottleDecision::ResponseReceived);
        assert_eq!(answered.decide(late, INTERVAL), ThrottleDecision::ResponseReceived);

        let mut unanswered = Timing::default();
        unanswered.mark_requested(start);
        assert_eq!(unanswered.decide(soon, INTERVAL), ThrottleDecision::Pending);
        assert_eq!(unanswered.decide(late, INTERVAL), ThrottleDecision::TimedOut);

        // A reply before any request does not count as a request.
        let mut unsolicited = Timing::default();
        unsolicited.mark_responded(start);
        assert_eq!(unsolicited.decide(soon, INTERVAL), ThrottleDecision::FirstRequest);
    }

    #[test]
    fn test_new_request_clears_response() {
        let start = Instant::now();
        let mut timing = Timing::default();
        timing.mark_requested(start);
        timing.mark_responded(start);
        timing.mark_requested(start + Duration::from_secs(10));
        assert!(timing.last_response().is_none());
        assert_eq!(timing.last_request(), Some(start + Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_record_response_sets_timestamp() {
        let throttler = RequestThrottler::new(INTERVAL);
        throttler.lock().await.mark_requested(Instant::now());
        assert!(throttler.snapshot().await.last_response().is_none());
        throttler.record_response().await;
        assert!(throttler.snapshot().await.last_response().is_some());
    }
}
