use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// A [`Duration`] that can be read and updated from any task.
///
/// Stored as whole nanoseconds, saturating at `u64::MAX` (about 584 years).
pub(crate) struct AtomicDuration(AtomicU64);

const fn to_nanos(d: Duration) -> u64 {
    let nanos = d.as_nanos();
    if nanos > u64::MAX as u128 { u64::MAX } else { nanos as u64 }
}

impl AtomicDuration {
    pub(crate) const fn new(d: Duration) -> Self {
        Self(AtomicU64::new(to_nanos(d)))
    }

    pub(crate) fn store(&self, d: Duration, order: Ordering) {
        self.0.store(to_nanos(d), order);
    }

    pub(crate) fn load(&self, order: Ordering) -> Duration {
        Duration::from_nanos(self.0.load(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_duration() {
        let d = AtomicDuration::new(Duration::from_micros(100));
        assert_eq!(d.load(Ordering::Relaxed), Duration::from_micros(100));

        d.store(Duration::new(42, 123_456_789), Ordering::Release);
        assert_eq!(d.load(Ordering::Acquire), Duration::new(42, 123_456_789));

        d.store(Duration::ZERO, Ordering::Relaxed);
        assert_eq!(d.load(Ordering::Relaxed), Duration::ZERO);

        // Saturates instead of wrapping
        d.store(Duration::MAX, Ordering::Relaxed);
        assert_eq!(d.load(Ordering::Relaxed), Duration::from_nanos(u64::MAX));
    }
}
