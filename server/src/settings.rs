//! Runtime-tunable engine settings.
//!
//! Finding and reading the settings document is the embedder's job; this
//! module only turns an already-loaded TOML string into typed settings.
//! Out-of-range values are clamped by [`EngineSettings::validated`] with a
//! warning instead of failing startup.

use serde::{Deserialize, Serialize};
use shared::settings::{DEFAULT_METRICS_WINDOW, DEFAULT_TELEPORT_INTERPOLATION_TICKS, fixed_step};
use shared::{DEFAULT_MAX_BODIES, DEFAULT_MAX_SUBSTEPS, DEFAULT_PHYSICS_HZ, GRAVITY_MPS2, Vec3};
use thiserror::Error;

/// Highest accepted physics rate.
const MAX_PHYSICS_HZ: u32 = 1_000;
/// Highest accepted sub-step cap.
const MAX_SUBSTEPS_LIMIT: u32 = 64;

const fn default_physics_hz() -> u32 {
    DEFAULT_PHYSICS_HZ
}
const fn default_max_substeps() -> u32 {
    DEFAULT_MAX_SUBSTEPS
}
const fn default_gravity() -> [f32; 3] {
    [0.0, -GRAVITY_MPS2, 0.0]
}
const fn default_max_bodies() -> usize {
    DEFAULT_MAX_BODIES
}
const fn default_true() -> bool {
    true
}
const fn default_metrics_window() -> usize {
    DEFAULT_METRICS_WINDOW
}
const fn default_teleport_ticks() -> i32 {
    DEFAULT_TELEPORT_INTERPOLATION_TICKS
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings document: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Axis-aligned world region bodies may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl WorldBounds {
    pub fn contains(&self, p: [f64; 3]) -> bool {
        (0..3).all(|i| self.min[i] <= p[i] && p[i] <= self.max[i])
    }

    fn is_well_formed(&self) -> bool {
        (0..3).all(|i| self.min[i].is_finite() && self.max[i].is_finite() && self.min[i] < self.max[i])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Fixed physics rate in steps per second (default: 60).
    #[serde(default = "default_physics_hz")]
    pub physics_hz: u32,

    /// Most physics steps run in one host tick (default: 8).
    #[serde(default = "default_max_substeps")]
    pub max_substeps: u32,

    /// Gravity vector [x, y, z] in m/s^2.
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],

    /// Body limit of the backend.
    #[serde(default = "default_max_bodies")]
    pub max_bodies: usize,

    /// Bodies leaving these bounds are released. `None` disables culling.
    #[serde(default)]
    pub world_bounds: Option<WorldBounds>,

    /// Skip pushing bodies that sleep in place.
    #[serde(default = "default_true")]
    pub sleep_skip: bool,

    /// Ticks kept by the step-time rolling average.
    #[serde(default = "default_metrics_window")]
    pub metrics_window: usize,

    /// Client-side teleport interpolation for display proxies, in host ticks.
    #[serde(default = "default_teleport_ticks")]
    pub teleport_interpolation_ticks: i32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            physics_hz: default_physics_hz(),
            max_substeps: default_max_substeps(),
            gravity: default_gravity(),
            max_bodies: default_max_bodies(),
            world_bounds: None,
            sleep_skip: true,
            metrics_window: default_metrics_window(),
            teleport_interpolation_ticks: default_teleport_ticks(),
        }
    }
}

impl EngineSettings {
    /// Parse and clamp a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text)?;
        Ok(settings.validated())
    }

    /// Clamp out-of-range values, logging each correction.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if self.physics_hz == 0 || self.physics_hz > MAX_PHYSICS_HZ {
            let fixed = self.physics_hz.clamp(1, MAX_PHYSICS_HZ);
            log::warn!("physics_hz {} out of range, using {}", self.physics_hz, fixed);
            self.physics_hz = fixed;
        }
        if self.max_substeps == 0 || self.max_substeps > MAX_SUBSTEPS_LIMIT {
            let fixed = self.max_substeps.clamp(1, MAX_SUBSTEPS_LIMIT);
            log::warn!("max_substeps {} out of range, using {}", self.max_substeps, fixed);
            self.max_substeps = fixed;
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            log::warn!("gravity {:?} is not finite, using default", self.gravity);
            self.gravity = defaults.gravity;
        }
        if self.max_bodies == 0 {
            log::warn!("max_bodies must be > 0, using {}", defaults.max_bodies);
            self.max_bodies = defaults.max_bodies;
        }
        if let Some(bounds) = self.world_bounds {
            if !bounds.is_well_formed() {
                log::warn!("world_bounds {bounds:?} are empty or not finite, culling disabled");
                self.world_bounds = None;
            }
        }
        if self.metrics_window == 0 {
            log::warn!("metrics_window must be > 0, using {}", defaults.metrics_window);
            self.metrics_window = defaults.metrics_window;
        }
        if self.teleport_interpolation_ticks < 0 {
            log::warn!(
                "teleport_interpolation_ticks {} is negative, using 0",
                self.teleport_interpolation_ticks
            );
            self.teleport_interpolation_ticks = 0;
        }
        self
    }

    pub fn fixed_step(&self) -> std::time::Duration {
        fixed_step(self.physics_hz)
    }

    pub fn gravity_vector(&self) -> Vec3 {
        Vec3::from(self.gravity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(EngineSettings::from_toml_str("").unwrap(), EngineSettings::default());
    }

    #[test]
    fn parses_every_key() {
        let text = r#"
            physics_hz = 120
            max_substeps = 4
            gravity = [0.0, -20.0, 0.0]
            max_bodies = 500
            sleep_skip = false
            metrics_window = 20
            teleport_interpolation_ticks = 1

            [world_bounds]
            min = [-1000.0, -64.0, -1000.0]
            max = [1000.0, 320.0, 1000.0]
        "#;
        let s = EngineSettings::from_toml_str(text).unwrap();
        assert_eq!(s.physics_hz, 120);
        assert_eq!(s.max_substeps, 4);
        assert_eq!(s.gravity, [0.0, -20.0, 0.0]);
        assert_eq!(s.max_bodies, 500);
        assert!(!s.sleep_skip);
        assert_eq!(s.metrics_window, 20);
        assert_eq!(s.teleport_interpolation_ticks, 1);
        let bounds = s.world_bounds.unwrap();
        assert!(bounds.contains([0.0, 0.0, 0.0]));
        assert!(!bounds.contains([0.0, -65.0, 0.0]));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let s = EngineSettings::from_toml_str(
            r#"
            physics_hz = 0
            max_substeps = 1000
            max_bodies = 0
            teleport_interpolation_ticks = -3
            "#,
        )
        .unwrap();
        assert_eq!(s.physics_hz, 1);
        assert_eq!(s.max_substeps, MAX_SUBSTEPS_LIMIT);
        assert_eq!(s.max_bodies, DEFAULT_MAX_BODIES);
        assert_eq!(s.teleport_interpolation_ticks, 0);
    }

    #[test]
    fn inverted_bounds_disable_culling() {
        let s = EngineSettings {
            world_bounds: Some(WorldBounds {
                min: [10.0, 10.0, 10.0],
                max: [0.0, 0.0, 0.0],
            }),
            ..Default::default()
        }
        .validated();
        assert_eq!(s.world_bounds, None);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(EngineSettings::from_toml_str("physics_hz = \"fast\"").is_err());
    }
}
