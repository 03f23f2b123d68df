use std::time::{Duration, Instant};

/// Time source for measuring how long an exchange waited.
///
/// Contexts take an `Arc<dyn Clock>` so tests can substitute a clock that
/// advances only when a simulated receive times out.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time instant.
    fn now(&self) -> Instant;

    /// Time elapsed since `started`, saturating at zero.
    fn elapsed_since(&self, started: Instant) -> Duration {
        self.now().saturating_duration_since(started)
    }
}

/// Monotonic system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}
