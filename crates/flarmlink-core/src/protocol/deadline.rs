use std::time::{Duration, Instant};

/// An absolute point in time bounding a whole protocol operation.
///
/// Computed once from the caller's timeout and handed down to every
/// blocking step, so retries inside an operation can never add up to more
/// than the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// Deadline that never expires
    pub fn never() -> Self {
        Self { at: None }
    }

    /// Check whether the deadline has passed
    pub fn has_expired(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Time left until expiry, zero once expired
    pub fn remaining(&self) -> Duration {
        match self.at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    /// The earlier of two deadlines
    pub fn min(self, other: Deadline) -> Deadline {
        match (self.at, other.at) {
            (Some(a), Some(b)) => Deadline { at: Some(a.min(b)) },
            (Some(_), None) => self,
            (None, _) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.has_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_never_expires() {
        let deadline = Deadline::never();
        assert!(!deadline.has_expired());
        assert_eq!(deadline.remaining(), Duration::MAX);
    }

    #[test]
    fn test_remaining_is_bounded_by_timeout() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert!(!deadline.has_expired());
        assert!(deadline.remaining() <= Duration::from_secs(10));
    }

    #[test]
    fn test_min_picks_earlier() {
        let short = Deadline::after(Duration::from_millis(5));
        let long = Deadline::after(Duration::from_secs(60));
        assert_eq!(short.min(long), short);
        assert_eq!(long.min(short), short);
        assert_eq!(Deadline::never().min(short), short);
        assert_eq!(short.min(Deadline::never()), short);
    }
}
