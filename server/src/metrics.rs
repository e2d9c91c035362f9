//! Per-tick reports and rolling step-time statistics.

use std::collections::VecDeque;
use std::time::Duration;

/// What one host tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Fixed steps run.
    pub steps: u32,
    /// Whole steps discarded by the sub-step cap.
    pub dropped_steps: u32,
    /// Remote requests answered this tick.
    pub requests: u32,
    /// Bindings whose proxy was found invalid during validation.
    pub removed_invalid: u32,
    /// Bindings whose proxy vanished between validation and a read/write.
    pub removed_lost_race: u32,
    pub removed_out_of_bounds: u32,
    pub pulled: u32,
    pub pushed: u32,
    /// Pushes skipped because the body slept in place.
    pub skipped_sleeping: u32,
    /// Contact start/stop events delivered to listeners.
    pub contacts: u32,
    /// Wall time spent inside backend steps.
    pub step_time: Duration,
    /// Live bindings at the end of the tick.
    pub bodies: usize,
}

impl TickReport {
    pub fn removed(&self) -> u32 {
        self.removed_invalid + self.removed_lost_race + self.removed_out_of_bounds
    }
}

/// Fixed-window rolling average of step time.
#[derive(Clone, Debug)]
pub struct TickMetrics {
    window: usize,
    samples: VecDeque<Duration>,
    sum: Duration,
    max: Duration,
    ticks: u64,
    total_dropped_steps: u64,
}

impl TickMetrics {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            sum: Duration::ZERO,
            max: Duration::ZERO,
            ticks: 0,
            total_dropped_steps: 0,
        }
    }

    pub fn record(&mut self, report: &TickReport) {
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
            }
        }
        self.samples.push_back(report.step_time);
        self.sum += report.step_time;
        self.max = self.max.max(report.step_time);
        self.ticks += 1;
        self.total_dropped_steps += report.dropped_steps as u64;
    }

    /// Mean step time over the window.
    pub fn average(&self) -> Duration {
        match self.samples.len() {
            0 => Duration::ZERO,
            n => self.sum / n as u32,
        }
    }

    /// Largest step time seen since the last reset.
    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn total_dropped_steps(&self) -> u64 {
        self.total_dropped_steps
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = Duration::ZERO;
        self.max = Duration::ZERO;
        self.ticks = 0;
        self.total_dropped_steps = 0;
    }
}
