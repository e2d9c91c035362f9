//! Rapier-backed implementation of [`PhysicsBackend`].
//!
//! Holds every Rapier set and pipeline object in one struct, since
//! `PhysicsPipeline::step` needs mutable access to all of them at once.
//!
//! Design goals
//! - Deterministic: same creation order and same `dt` sequence give identical results.
//! - One body, one collider: colliders are attached with identity local transform.
//! - Bounded: creation fails with `OutOfResources` once `max_bodies` is reached.

// Re-export Rapier so downstream crates can reach its types without
// depending on `rapier3d` directly.
pub use rapier3d;

use std::sync::mpsc;

use rapier3d::prelude::*;

use crate::backend::{
    ActivationState, BackendError, BodyDesc, ContactEvent, ContactPhase, MotionType,
    PhysicsBackend, RayHit, Velocity,
};
use crate::settings::{DEFAULT_MAX_BODIES, GRAVITY_MPS2};
use crate::transform::{Real, Transform, Vec3};

pub struct RapierBackend {
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,

    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    ccd: CCDSolver,

    events: ChannelEventCollector,
    collisions: mpsc::Receiver<CollisionEvent>,
    // Contact forces are not surfaced; the receiver only keeps the channel open.
    _forces: mpsc::Receiver<ContactForceEvent>,

    params: IntegrationParameters,
    gravity: Vec3,
    max_bodies: usize,
}

impl Default for RapierBackend {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -GRAVITY_MPS2, 0.0), DEFAULT_MAX_BODIES)
    }
}

impl RapierBackend {
    pub fn new(gravity: Vec3, max_bodies: usize) -> Self {
        let (collision_send, collisions) = mpsc::channel();
        let (force_send, forces) = mpsc::channel();
        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            ccd: CCDSolver::new(),
            events: ChannelEventCollector::new(collision_send, force_send),
            collisions,
            _forces: forces,
            params: IntegrationParameters::default(),
            gravity,
            max_bodies,
        }
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn max_bodies(&self) -> usize {
        self.max_bodies
    }

    pub fn query_pipeline<'a>(&'a self, filter: QueryFilter<'a>) -> QueryPipeline<'a> {
        self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        )
    }

    fn parent_of(&self, collider: ColliderHandle) -> Option<RigidBodyHandle> {
        self.colliders.get(collider)?.parent()
    }
}

fn body_builder(motion: MotionType) -> RigidBodyBuilder {
    match motion {
        MotionType::Dynamic => RigidBodyBuilder::dynamic(),
        MotionType::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        MotionType::Fixed => RigidBodyBuilder::fixed(),
    }
}

impl PhysicsBackend for RapierBackend {
    type Handle = RigidBodyHandle;

    fn create_body(&mut self, desc: &BodyDesc) -> Result<RigidBodyHandle, BackendError> {
        if self.bodies.len() >= self.max_bodies {
            return Err(BackendError::OutOfResources {
                limit: self.max_bodies,
            });
        }
        desc.validate()?;

        let rb = body_builder(desc.motion)
            .pose(desc.transform.iso())
            .can_sleep(desc.can_sleep)
            .build();
        let handle = self.bodies.insert(rb);

        let mut collider = desc
            .shape
            .collider_builder()
            .active_events(ActiveEvents::COLLISION_EVENTS);
        if let Some(mass) = desc.mass {
            collider = collider.mass(mass);
        }
        self.colliders
            .insert_with_parent(collider.build(), handle, &mut self.bodies);

        log::trace!("rapier: created {:?} body {:?}", desc.motion, handle);
        Ok(handle)
    }

    fn destroy_body(&mut self, handle: RigidBodyHandle) -> bool {
        self.bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    fn step(&mut self, dt: Real) {
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &(),
            &self.events,
        );
    }

    fn transform(&self, handle: RigidBodyHandle) -> Option<Transform> {
        self.bodies
            .get(handle)
            .map(|rb| Transform::new(*rb.translation(), *rb.rotation()))
    }

    fn set_transform(&mut self, handle: RigidBodyHandle, transform: &Transform) -> bool {
        let Some(rb) = self.bodies.get_mut(handle) else {
            return false;
        };
        rb.set_translation(transform.translation, true);
        rb.set_rotation(transform.rotation, true);
        true
    }

    fn velocity(&self, handle: RigidBodyHandle) -> Option<Velocity> {
        self.bodies.get(handle).map(|rb| Velocity {
            linear: *rb.linvel(),
            angular: *rb.angvel(),
        })
    }

    fn set_velocity(&mut self, handle: RigidBodyHandle, velocity: Velocity) -> bool {
        let Some(rb) = self.bodies.get_mut(handle) else {
            return false;
        };
        rb.set_linvel(velocity.linear, true);
        rb.set_angvel(velocity.angular, true);
        true
    }

    fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vec3) -> bool {
        match self.bodies.get_mut(handle) {
            Some(rb) if rb.is_dynamic() => {
                rb.apply_impulse(impulse, true);
                true
            }
            _ => false,
        }
    }

    fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: Real,
    ) -> Option<RayHit<RigidBodyHandle>> {
        let dir = direction.try_normalize(Real::EPSILON)?;
        if !(max_distance.is_finite() && max_distance >= 0.0) {
            return None;
        }
        let ray = Ray::new(point![origin.x, origin.y, origin.z], dir);
        let (collider, hit) = self
            .query_pipeline(QueryFilter::default())
            .cast_ray_and_get_normal(&ray, max_distance, true)?;
        Some(RayHit {
            body: self.parent_of(collider)?,
            distance: hit.time_of_impact,
            point: ray.point_at(hit.time_of_impact).coords,
            normal: hit.normal,
        })
    }

    fn drain_contact_events(&mut self) -> Vec<ContactEvent<RigidBodyHandle>> {
        let mut out = Vec::new();
        while let Ok(event) = self.collisions.try_recv() {
            // Colliders removed mid-contact no longer have a parent to report.
            let (Some(a), Some(b)) = (
                self.parent_of(event.collider1()),
                self.parent_of(event.collider2()),
            ) else {
                continue;
            };
            let phase = if event.started() {
                ContactPhase::Started
            } else {
                ContactPhase::Stopped
            };
            out.push(ContactEvent { a, b, phase });
        }
        out
    }

    fn activation(&self, handle: RigidBodyHandle) -> ActivationState {
        match self.bodies.get(handle) {
            None => ActivationState::Removed,
            Some(rb) if rb.is_sleeping() => ActivationState::Sleeping,
            Some(_) => ActivationState::Active,
        }
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn name(&self) -> &str {
        "rapier3d"
    }
}
