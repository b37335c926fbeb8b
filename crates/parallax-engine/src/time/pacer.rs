use std::time::{Duration, Instant};

/// Fixed-interval frame scheduler.
///
/// The pacer does not sleep; it reports how long the caller may wait before
/// the next frame is due so the wait can be combined with other events.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    next: Instant,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Pacer for a target rate in frames per second. Non-positive rates fall back to 60.
    pub fn with_rate(fps: f32) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 60.0 };
        Self::new(Duration::from_secs_f32(1.0 / fps))
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left until the next frame is due; zero when already due.
    pub fn until_next(&self) -> Duration {
        self.next.saturating_duration_since(Instant::now())
    }

    pub fn is_due(&self) -> bool {
        Instant::now() >= self.next
    }

    /// Marks a frame as produced now and schedules the next one.
    ///
    /// If the caller fell behind by more than one interval the schedule is
    /// rebased instead of bursting to catch up.
    pub fn mark(&mut self) {
        let now = Instant::now();
        self.next += self.interval;
        if self.next < now {
            self.next = now + self.interval;
        }
    }

    /// Makes the next frame due immediately (e.g. after resuming).
    pub fn reset(&mut self) {
        self.next = Instant::now();
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::with_rate(60.0)
    }
}
