use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A wall-clock duration, in milliseconds.
///
/// The bridge only ever reasons about coarse deadlines (a 50ms UART
/// quiescence check, a 10s stuck-send timeout, a 300s idle timeout), so
/// millisecond resolution backed by the OS monotonic clock is enough; there
/// is no need for a cycle-counting clock here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(pub u64);

impl Duration {
    pub const MAX: Self = Self(u64::MAX);
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s * 1_000)
    }

    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Duration) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn saturating_add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl From<Duration> for std::time::Duration {
    #[inline]
    fn from(d: Duration) -> Self {
        std::time::Duration::from_millis(d.0)
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = self.saturating_sub(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_sub_floors_at_zero() {
        assert_eq!(Duration::from_millis(5).saturating_sub(Duration::from_millis(10)), Duration::ZERO);
    }

    #[test]
    fn secs_to_millis() {
        assert_eq!(Duration::from_secs(10), Duration::from_millis(10_000));
    }
}
