//! Engine-agnostic physics backend contract.
//!
//! The simulation kernel (collision, constraint solving, integration) is a
//! supplied capability. Everything above it talks to [`PhysicsBackend`], which
//! [`RapierBackend`](crate::RapierBackend) implements on top of `rapier3d`.
//!
//! Handles are owned by whoever created the body; the backend never destroys a
//! body on its own.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shape::ShapeDescriptor;
use crate::transform::{Real, Transform, Vec3};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("backend body limit reached ({limit} bodies)")]
    OutOfResources { limit: usize },
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("invalid mass {0}; mass must be finite and > 0")]
    InvalidMass(Real),
}

/// How the backend integrates a body.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionType {
    /// Affected by forces, gravity and contacts.
    #[default]
    Dynamic,
    /// Moved only by explicit transform writes; pushes dynamic bodies.
    Kinematic,
    /// Never moves.
    Fixed,
}

/// Backend-reported activation of a body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActivationState {
    Active,
    Sleeping,
    /// The handle does not refer to a live body.
    Removed,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Whether a touching pair just started or just stopped touching.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContactPhase {
    Started,
    Stopped,
}

/// One contact start/stop between two bodies, reported after a step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContactEvent<H> {
    pub a: H,
    pub b: H,
    pub phase: ContactPhase,
}

impl<H: Copy> ContactEvent<H> {
    /// Same event with the handles mapped through `f`. `None` if either side fails to map.
    pub fn map<T>(&self, mut f: impl FnMut(H) -> Option<T>) -> Option<ContactEvent<T>> {
        Some(ContactEvent {
            a: f(self.a)?,
            b: f(self.b)?,
            phase: self.phase,
        })
    }

    pub fn involves(&self, handle: H) -> bool
    where
        H: PartialEq,
    {
        self.a == handle || self.b == handle
    }
}

/// Closest body hit by a ray.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayHit<H> {
    pub body: H,
    /// Distance along the normalized ray direction.
    pub distance: Real,
    pub point: Vec3,
    pub normal: Vec3,
}

/// Everything needed to create one body.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyDesc {
    pub shape: ShapeDescriptor,
    pub motion: MotionType,
    /// Total mass in kilograms. `None` derives it from the shape at unit density.
    pub mass: Option<Real>,
    pub transform: Transform,
    pub can_sleep: bool,
}

impl BodyDesc {
    pub fn new(shape: ShapeDescriptor, motion: MotionType, transform: Transform) -> Self {
        Self {
            shape,
            motion,
            mass: None,
            transform,
            can_sleep: true,
        }
    }

    pub fn with_mass(mut self, mass: Real) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Shape and mass checks shared by every backend.
    pub fn validate(&self) -> Result<(), BackendError> {
        self.shape.validate(self.motion)?;
        match self.mass {
            Some(m) if !(m.is_finite() && m > 0.0) => Err(BackendError::InvalidMass(m)),
            _ => Ok(()),
        }
    }
}

/// Trait that concrete physics engines must implement.
///
/// `step` is a single blocking call. Any internal parallelism is invisible to
/// callers: when it returns, every body has advanced by exactly `dt`.
pub trait PhysicsBackend {
    type Handle: Copy + Eq + Hash + fmt::Debug;

    /// Create a body. Fails without side effects.
    fn create_body(&mut self, desc: &BodyDesc) -> Result<Self::Handle, BackendError>;

    /// Destroy a body and its colliders. Returns `false` if it was already gone.
    fn destroy_body(&mut self, handle: Self::Handle) -> bool;

    /// Advance the simulation by `dt` seconds.
    fn step(&mut self, dt: Real);

    fn transform(&self, handle: Self::Handle) -> Option<Transform>;

    /// Teleport a body. Returns `false` for unknown handles.
    fn set_transform(&mut self, handle: Self::Handle, transform: &Transform) -> bool;

    fn velocity(&self, handle: Self::Handle) -> Option<Velocity>;

    fn set_velocity(&mut self, handle: Self::Handle, velocity: Velocity) -> bool;

    /// Apply an instantaneous linear impulse (N*s) at the centre of mass.
    /// Returns `false` for unknown handles and for bodies that are not dynamic.
    fn apply_impulse(&mut self, handle: Self::Handle, impulse: Vec3) -> bool;

    /// First body hit by a ray starting at `origin`, at most `max_distance` away.
    fn cast_ray(
        &self,
        _origin: Vec3,
        _direction: Vec3,
        _max_distance: Real,
    ) -> Option<RayHit<Self::Handle>> {
        None
    }

    /// Contacts that started or stopped since the last call, in the order the
    /// backend produced them.
    fn drain_contact_events(&mut self) -> Vec<ContactEvent<Self::Handle>> {
        Vec::new()
    }

    fn activation(&self, handle: Self::Handle) -> ActivationState;

    /// Number of live bodies.
    fn body_count(&self) -> usize;

    /// Human-readable engine name (e.g., "rapier3d").
    fn name(&self) -> &str;
}
