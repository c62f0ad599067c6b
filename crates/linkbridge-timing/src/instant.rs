use crate::Duration;

/// A monotonic timestamp, backed by [`std::time::Instant`].
///
/// Wraps the OS monotonic clock rather than hand-rolling one; this bridge
/// never leaves a single host, so there's no cross-process timestamp to
/// reconcile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(std::time::Instant);

impl Instant {
    /// A timestamp guaranteed to be in the past relative to any `now()`.
    /// Used as a "never fired yet" sentinel for [`crate::Repeater`].
    pub fn epoch() -> Self {
        Self(std::time::Instant::now() - std::time::Duration::from_secs(365 * 24 * 3600))
    }

    #[inline]
    pub fn now() -> Self {
        Self(std::time::Instant::now())
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.0.elapsed().as_millis() as u64)
    }

    #[inline]
    pub fn saturating_sub(&self, other: Instant) -> Duration {
        Duration::from_millis(self.0.saturating_duration_since(other.0).as_millis() as u64)
    }
}

impl Default for Instant {
    fn default() -> Self {
        Self::epoch()
    }
}
