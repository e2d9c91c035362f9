/*!
Simulation tuning constants.

These constants centralize the defaults used by the fixed-step clock, the
backend, and the transform reconciliation passes. Runtime overrides live in the
server's `EngineSettings`; everything here is the value used when nothing is
configured.

Notes
- Distances are in meters (one host block is one meter), time in seconds.
- Tolerances are world-space, not machine epsilon.
*/

use std::time::Duration;

/// Rate at which the host drives `on_tick` (ticks per second).
/// Only used to derive sensible defaults; the loop never assumes it.
pub const HOST_TICK_HZ: u32 = 20;

/// Fixed physics rate (steps per second).
pub const DEFAULT_PHYSICS_HZ: u32 = 60;

/// Maximum physics steps run inside one host tick.
/// Backlog beyond this is dropped so a stalled host cannot trigger a catch-up spiral.
pub const DEFAULT_MAX_SUBSTEPS: u32 = 8;

/// Gravity magnitude in meters per second squared (positive value, applied along -Y).
pub const GRAVITY_MPS2: f32 = 9.81;

/// Upper bound on simultaneously simulated bodies.
pub const DEFAULT_MAX_BODIES: usize = 10_000;

/// Translation difference below which two transforms are treated as equal (meters).
pub const TRANSFORM_LINEAR_EPS: f32 = 1.0e-4;

/// Rotation difference below which two transforms are treated as equal (radians).
pub const TRANSFORM_ANGULAR_EPS: f32 = 1.0e-4;

/// Client-side teleport interpolation applied to display proxies (host ticks).
pub const DEFAULT_TELEPORT_INTERPOLATION_TICKS: i32 = 2;

/// Number of samples kept by the step-time rolling average.
pub const DEFAULT_METRICS_WINDOW: usize = 100;

/// Length of one fixed step at `hz` steps per second.
///
/// A rate of zero is treated as one step per second.
#[inline]
pub const fn fixed_step(hz: u32) -> Duration {
    let hz = if hz == 0 { 1 } else { hz };
    Duration::from_nanos(1_000_000_000 / hz as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_matches_rate() {
        assert_eq!(fixed_step(20), Duration::from_millis(50));
        assert_eq!(fixed_step(60), Duration::from_nanos(16_666_666));
    }

    #[test]
    fn zero_rate_does_not_divide_by_zero() {
        assert_eq!(fixed_step(0), Duration::from_secs(1));
    }
}
