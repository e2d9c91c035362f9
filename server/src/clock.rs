//! Fixed-step accumulator.
//!
//! Host ticks arrive at whatever rate the host manages; physics advances in
//! fixed steps. Time is tracked as integer nanoseconds so identical elapsed
//! sequences always produce identical step sequences.

use std::time::Duration;

/// Outcome of feeding one host tick into the clock.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StepPlan {
    /// Fixed steps to run this tick.
    pub steps: u32,
    /// Whole steps discarded because the per-tick cap was reached.
    pub dropped: u32,
}

#[derive(Clone, Debug)]
pub struct FixedStepClock {
    step_nanos: u64,
    max_substeps: u32,
    accumulator: u64,
    total_steps: u64,
    total_dropped: u64,
}

impl FixedStepClock {
    /// `step` is clamped to at least one nanosecond, `max_substeps` to at least one.
    pub fn new(step: Duration, max_substeps: u32) -> Self {
        Self {
            step_nanos: (step.as_nanos() as u64).max(1),
            max_substeps: max_substeps.max(1),
            accumulator: 0,
            total_steps: 0,
            total_dropped: 0,
        }
    }

    pub fn step(&self) -> Duration {
        Duration::from_nanos(self.step_nanos)
    }

    /// Step length in seconds, as handed to the backend.
    pub fn step_secs(&self) -> f32 {
        self.step_nanos as f32 / 1_000_000_000.0
    }

    pub fn max_substeps(&self) -> u32 {
        self.max_substeps
    }

    /// Time carried over to the next tick.
    pub fn backlog(&self) -> Duration {
        Duration::from_nanos(self.accumulator)
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn total_dropped(&self) -> u64 {
        self.total_dropped
    }

    /// Add `elapsed` and take as many whole steps as the cap allows.
    ///
    /// Whole steps beyond the cap are discarded; the sub-step remainder is kept.
    pub fn advance(&mut self, elapsed: Duration) -> StepPlan {
        let elapsed = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.accumulator = self.accumulator.saturating_add(elapsed);

        let available = self.accumulator / self.step_nanos;
        let steps = available.min(self.max_substeps as u64);
        let dropped = available - steps;

        self.accumulator -= available * self.step_nanos;
        self.total_steps += steps;
        self.total_dropped += dropped;

        StepPlan {
            steps: steps as u32,
            dropped: u32::try_from(dropped).unwrap_or(u32::MAX),
        }
    }

    pub fn reset(&mut self) {
        self.accumulator = 0;
    }
}
