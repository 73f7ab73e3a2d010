use std::time::{Duration, Instant};

/// Interval between pose submissions.
pub const POSE_INTERVAL: Duration = Duration::from_millis(50);

/// Gates pose submission to at most one per interval.
#[derive(Debug, Clone)]
pub struct SendCadence {
    interval: Duration,
    last: Option<Instant>,
}

impl Default for SendCadence {
    fn default() -> Self {
        Self::new(POSE_INTERVAL)
    }
}

impl SendCadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True when strictly more than one interval has passed since the last
    /// send (or nothing was sent yet). Marks `now` as sent when true.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    /// Forces the next [`ready`](Self::ready) to fire, e.g. after a
    /// resend request.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
