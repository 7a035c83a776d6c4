use super::Phase;

/// Upper bound of catch-up frames flushed by a single pre-phase event.
pub const MAX_CATCH_UP: u64 = 5;

/// Owner of the sampling clock.
///
/// Turns the time elapsed since the last tick into a number of frames to push,
/// so that readings from many collectors land in one coherent frame per tick.
/// The clock starts with the first event it sees, which is always due one frame.
#[derive(Debug, Clone)]
pub struct Reconciler {
    interval_ms: u64,
    last_tick_ms: Option<u64>,
}

impl Reconciler {
    /// Creates a new `Reconciler` that hasn't seen any event yet.
    ///
    /// # Arguments
    /// * `interval_ms` - The sampling interval, zero disables ticking.
    pub fn new(interval_ms: u16) -> Self {
        Self {
            interval_ms: interval_ms as u64,
            last_tick_ms: None,
        }
    }

    /// The amount of intervals elapsed since the last tick.
    ///
    /// Rounded half up by the interval: `(elapsed + interval / 2) / interval`.
    pub fn frames_due(&self, now_ms: u64) -> u64 {
        if self.interval_ms == 0 {
            return 0;
        }

        let Some(last_tick_ms) = self.last_tick_ms else {
            return 1;
        };

        let elapsed = now_ms.saturating_sub(last_tick_ms);
        (elapsed + self.interval_ms / 2) / self.interval_ms
    }

    /// Decides how many frames a collector event pushes.
    ///
    /// A pre-phase event flushes the backlog under the stale samples, a post-phase
    /// event commits exactly one frame under the fresh ones and moves the clock.
    ///
    /// # Arguments
    /// * `phase` - The side of the collector update the event comes from.
    /// * `now_ms` - The current time in milliseconds.
    ///
    /// # Returns
    /// The amount of frames to push.
    pub fn frames_for(&mut self, phase: Phase, now_ms: u64) -> u64 {
        let due = self.frames_due(now_ms);
        if due == 0 {
            return 0;
        }

        match phase {
            Phase::Pre => (due - 1).min(MAX_CATCH_UP),
            Phase::Post => {
                self.last_tick_ms = Some(now_ms);
                1
            }
        }
    }
}
