//! Body registry: the single source of truth for what is simulated.
//!
//! Each record couples one backend body with one host proxy. Records are
//! created and destroyed together with their native body, so
//! `len() == backend().body_count()` always holds. Mutable backend access is
//! crate-private and only used to step the simulation.
//!
//! Design notes
//! - Body ids come from a monotonically increasing counter and are never
//!   reused, so a stale id can only ever miss.
//! - Records live in a `BTreeMap` keyed by id, so iteration is already in id
//!   order. Host keys and backend handles are indexed with hash maps.
//! - `for_each_active` hands out a snapshot ordered by id. Callers may
//!   register/unregister while iterating it, and passes run in a stable order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use shared::{
    ActivationState, BodyDesc, ContactEvent, MotionType, PhysicsBackend, RayHit, Real,
    ShapeDescriptor, Transform, Vec3, Velocity,
};

use crate::error::RegistryError;
use crate::host::HostProxyKey;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Which side is authoritative for a binding's transform.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPolicy {
    /// Physics moves the proxy.
    PhysicsDrivesHost,
    /// The proxy moves the body; the body is kinematic or fixed.
    HostDrivesPhysics,
    /// Physics moves the proxy unless the host moved it since the last sync.
    Bidirectional,
}

impl SyncPolicy {
    #[inline]
    pub fn pulls(self) -> bool {
        matches!(self, SyncPolicy::HostDrivesPhysics | SyncPolicy::Bidirectional)
    }

    #[inline]
    pub fn pushes(self) -> bool {
        matches!(self, SyncPolicy::PhysicsDrivesHost | SyncPolicy::Bidirectional)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BodyBinding {
    pub body: BodyId,
    pub key: HostProxyKey,
    pub policy: SyncPolicy,
    /// The proxy was spawned by the engine and is despawned with the binding.
    pub owns_proxy: bool,
}

/// Read-only view of a simulated body.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicsBody {
    pub id: BodyId,
    pub shape: ShapeDescriptor,
    pub mass: Option<Real>,
    pub motion: MotionType,
    pub transform: Transform,
    pub velocity: Velocity,
    pub activation: ActivationState,
}

/// What the façade needs to create a body; motion comes from the policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub shape: ShapeDescriptor,
    /// Kilograms. `None` derives the mass from the shape.
    pub mass: Option<Real>,
    pub can_sleep: bool,
}

impl ObjectDescriptor {
    pub fn new(shape: ShapeDescriptor) -> Self {
        Self {
            shape,
            mass: None,
            can_sleep: true,
        }
    }

    pub fn with_mass(mut self, mass: Real) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Backend description for a body bound to `key` under `policy`.
    ///
    /// Host-driven entities become kinematic, host-driven blocks fixed,
    /// everything else dynamic.
    pub fn body_desc(&self, key: HostProxyKey, policy: SyncPolicy, transform: Transform) -> BodyDesc {
        let motion = match (policy, key) {
            (SyncPolicy::HostDrivesPhysics, HostProxyKey::Block(_)) => MotionType::Fixed,
            (SyncPolicy::HostDrivesPhysics, HostProxyKey::Entity(_)) => MotionType::Kinematic,
            _ => MotionType::Dynamic,
        };
        BodyDesc {
            shape: self.shape.clone(),
            motion,
            mass: self.mass,
            transform,
            can_sleep: self.can_sleep,
        }
    }
}

impl From<ShapeDescriptor> for ObjectDescriptor {
    fn from(shape: ShapeDescriptor) -> Self {
        Self::new(shape)
    }
}

struct Record<H> {
    binding: BodyBinding,
    handle: H,
    shape: ShapeDescriptor,
    motion: MotionType,
    mass: Option<Real>,
    /// Transform last written to or read from the host.
    last_synced: Option<Transform>,
}

pub struct BodyRegistry<B: PhysicsBackend> {
    backend: B,
    next_id: u64,
    records: BTreeMap<BodyId, Record<B::Handle>>,
    by_host: HashMap<HostProxyKey, BodyId>,
    by_handle: HashMap<B::Handle, BodyId>,
}

impl<B: PhysicsBackend> BodyRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            next_id: 1,
            records: BTreeMap::new(),
            by_host: HashMap::new(),
            by_handle: HashMap::new(),
        }
    }

    /// Create a body and bind it to `key`.
    ///
    /// On failure nothing is left behind: no body, no index entry.
    pub fn register(
        &mut self,
        desc: &BodyDesc,
        key: HostProxyKey,
        policy: SyncPolicy,
        owns_proxy: bool,
    ) -> Result<BodyBinding, RegistryError> {
        if self.by_host.contains_key(&key) {
            return Err(RegistryError::DuplicateBinding(key));
        }
        let handle = self.backend.create_body(desc)?;

        let id = BodyId(self.next_id);
        self.next_id += 1;

        let binding = BodyBinding {
            body: id,
            key,
            policy,
            owns_proxy,
        };
        self.records.insert(
            id,
            Record {
                binding,
                handle,
                shape: desc.shape.clone(),
                motion: desc.motion,
                mass: desc.mass,
                last_synced: Some(desc.transform),
            },
        );
        self.by_host.insert(key, id);
        self.by_handle.insert(handle, id);

        log::debug!("registered {id} <-> {key} ({policy:?})");
        Ok(binding)
    }

    /// Release the body and its binding. Absent ids are a no-op.
    pub fn unregister(&mut self, id: BodyId) -> Option<BodyBinding> {
        let record = self.records.remove(&id)?;
        self.by_host.remove(&record.binding.key);
        self.by_handle.remove(&record.handle);
        self.backend.destroy_body(record.handle);
        log::debug!("unregistered {id} <-> {}", record.binding.key);
        Some(record.binding)
    }

    /// Release everything. Returns the bindings that were removed, ordered by id.
    pub fn clear(&mut self) -> Vec<BodyBinding> {
        let ids: Vec<BodyId> = self.for_each_active().map(|b| b.body).collect();
        ids.into_iter().filter_map(|id| self.unregister(id)).collect()
    }

    pub fn lookup_by_host(&self, key: HostProxyKey) -> Option<BodyId> {
        self.by_host.get(&key).copied()
    }

    pub fn lookup_by_body(&self, id: BodyId) -> Option<HostProxyKey> {
        self.records.get(&id).map(|r| r.binding.key)
    }

    pub fn binding(&self, id: BodyId) -> Option<BodyBinding> {
        self.records.get(&id).map(|r| r.binding)
    }

    /// Snapshot of all bindings at call time, ordered by id.
    pub fn for_each_active(&self) -> std::vec::IntoIter<BodyBinding> {
        let bindings: Vec<BodyBinding> = self.records.values().map(|r| r.binding).collect();
        bindings.into_iter()
    }

    /// Body that owns a backend handle, if it is still registered.
    pub fn lookup_by_handle(&self, handle: B::Handle) -> Option<BodyId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn body(&self, id: BodyId) -> Option<PhysicsBody> {
        let record = self.records.get(&id)?;
        Some(PhysicsBody {
            id,
            shape: record.shape.clone(),
            mass: record.mass,
            motion: record.motion,
            transform: self.backend.transform(record.handle)?,
            velocity: self.backend.velocity(record.handle)?,
            activation: self.backend.activation(record.handle),
        })
    }

    pub fn handle(&self, id: BodyId) -> Option<B::Handle> {
        self.records.get(&id).map(|r| r.handle)
    }

    pub fn transform(&self, id: BodyId) -> Option<Transform> {
        self.backend.transform(self.handle(id)?)
    }

    pub fn motion(&self, id: BodyId) -> Option<MotionType> {
        self.records.get(&id).map(|r| r.motion)
    }

    pub fn velocity(&self, id: BodyId) -> Option<Velocity> {
        self.backend.velocity(self.handle(id)?)
    }

    pub fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> bool {
        match self.handle(id) {
            Some(h) => self.backend.set_velocity(h, velocity),
            None => false,
        }
    }

    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec3) -> bool {
        match self.handle(id) {
            Some(h) => self.backend.apply_impulse(h, impulse),
            None => false,
        }
    }

    /// First registered body along the ray.
    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: Real,
    ) -> Option<RayHit<BodyId>> {
        let hit = self.backend.cast_ray(origin, direction, max_distance)?;
        Some(RayHit {
            body: self.lookup_by_handle(hit.body)?,
            distance: hit.distance,
            point: hit.point,
            normal: hit.normal,
        })
    }

    /// Contact events since the last drain, keyed by body id.
    ///
    /// Events touching a handle that is no longer registered are dropped.
    pub fn drain_contacts(&mut self) -> Vec<ContactEvent<BodyId>> {
        let events = self.backend.drain_contact_events();
        events
            .iter()
            .filter_map(|e| e.map(|h| self.lookup_by_handle(h)))
            .collect()
    }

    pub fn activation(&self, id: BodyId) -> ActivationState {
        match self.handle(id) {
            Some(h) => self.backend.activation(h),
            None => ActivationState::Removed,
        }
    }

    /// Teleport the body and clear its velocities.
    pub fn place(&mut self, id: BodyId, transform: &Transform) -> bool {
        let Some(handle) = self.handle(id) else {
            return false;
        };
        self.backend.set_transform(handle, transform)
            && self.backend.set_velocity(handle, Velocity::zero())
    }

    pub fn last_synced(&self, id: BodyId) -> Option<Transform> {
        self.records.get(&id).and_then(|r| r.last_synced)
    }

    pub fn set_last_synced(&mut self, id: BodyId, transform: Transform) {
        if let Some(record) = self.records.get_mut(&id) {
            record.last_synced = Some(transform);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{BlockPos, EntityId};
    use shared::{BackendError, RapierBackend, Vec3};

    fn registry(limit: usize) -> BodyRegistry<RapierBackend> {
        BodyRegistry::new(RapierBackend::new(Vec3::new(0.0, -9.81, 0.0), limit))
    }

    fn cube_at(y: Real) -> BodyDesc {
        BodyDesc::new(
            ShapeDescriptor::unit_block(),
            MotionType::Dynamic,
            Transform::from_translation(0.0, y, 0.0),
        )
    }

    fn entity(n: u32) -> HostProxyKey {
        HostProxyKey::Entity(EntityId(n))
    }

    fn assert_bijection(reg: &BodyRegistry<RapierBackend>) {
        for b in reg.for_each_active() {
            assert_eq!(reg.lookup_by_host(b.key), Some(b.body));
            assert_eq!(reg.lookup_by_body(b.body), Some(b.key));
        }
        assert_eq!(reg.len(), reg.backend().body_count());
    }

    #[test]
    fn register_indexes_both_directions() {
        let mut reg = registry(16);
        let a = reg
            .register(&cube_at(1.0), entity(1), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap();
        let b = reg
            .register(&cube_at(2.0), entity(2), SyncPolicy::Bidirectional, false)
            .unwrap();
        assert_ne!(a.body, b.body);
        assert_eq!(reg.len(), 2);
        assert_bijection(&reg);
    }

    #[test]
    fn duplicate_key_leaves_first_binding_untouched() {
        let mut reg = registry(16);
        let first = reg
            .register(&cube_at(1.0), entity(7), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap();
        let err = reg
            .register(&cube_at(5.0), entity(7), SyncPolicy::HostDrivesPhysics, false)
            .unwrap_err();

        assert_eq!(err, RegistryError::DuplicateBinding(entity(7)));
        assert_eq!(reg.binding(first.body), Some(first));
        assert_eq!(reg.len(), 1);
        assert_bijection(&reg);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut reg = registry(16);
        let b = reg
            .register(&cube_at(1.0), entity(1), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap();
        assert_eq!(reg.unregister(b.body), Some(b));
        assert_eq!(reg.unregister(b.body), None);
        assert_eq!(reg.unregister(BodyId(999)), None);
        assert!(reg.is_empty());
        assert_eq!(reg.backend().body_count(), 0);
        assert_eq!(reg.lookup_by_host(entity(1)), None);
    }

    #[test]
    fn failed_register_leaves_nothing_behind() {
        let mut reg = registry(1);
        reg.register(&cube_at(1.0), entity(1), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap();
        let err = reg
            .register(&cube_at(2.0), entity(2), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap_err();
        assert_eq!(err, RegistryError::BackendOutOfResources { limit: 1 });
        assert_eq!(reg.lookup_by_host(entity(2)), None);

        let bad = BodyDesc::new(
            ShapeDescriptor::Sphere { radius: 0.0 },
            MotionType::Dynamic,
            Transform::identity(),
        );
        reg.unregister(BodyId(1));
        assert!(matches!(
            reg.register(&bad, entity(3), SyncPolicy::PhysicsDrivesHost, true),
            Err(RegistryError::InvalidShape(_))
        ));
        assert!(reg.is_empty());
        assert_bijection(&reg);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut reg = registry(16);
        let a = reg
            .register(&cube_at(1.0), entity(1), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap();
        reg.unregister(a.body);
        let b = reg
            .register(&cube_at(1.0), entity(1), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap();
        assert!(b.body > a.body);
    }

    #[test]
    fn snapshot_survives_mutation() {
        let mut reg = registry(16);
        for n in 0..4 {
            reg.register(&cube_at(n as Real), entity(n), SyncPolicy::PhysicsDrivesHost, true)
                .unwrap();
        }
        let mut seen = 0;
        for b in reg.for_each_active() {
            reg.unregister(b.body);
            seen += 1;
        }
        assert_eq!(seen, 4);
        assert!(reg.is_empty());
        assert_eq!(reg.backend().body_count(), 0);
    }

    #[test]
    fn body_view_reports_backend_state() {
        let mut reg = registry(16);
        let key = HostProxyKey::Block(BlockPos::new(0, 0, 0));
        let desc = BodyDesc::new(
            ShapeDescriptor::unit_block(),
            MotionType::Fixed,
            Transform::from_translation(0.5, 0.5, 0.5),
        );
        let b = reg.register(&desc, key, SyncPolicy::HostDrivesPhysics, false).unwrap();
        let view = reg.body(b.body).unwrap();
        assert_eq!(view.motion, MotionType::Fixed);
        assert!(view.transform.approx_eq(&desc.transform));
        assert_eq!(reg.last_synced(b.body), Some(desc.transform));
    }

    #[test]
    fn clear_releases_everything() {
        let mut reg = registry(16);
        for n in 0..3 {
            reg.register(&cube_at(n as Real), entity(n), SyncPolicy::PhysicsDrivesHost, true)
                .unwrap();
        }
        let removed = reg.clear();
        assert_eq!(removed.len(), 3);
        assert!(removed.windows(2).all(|w| w[0].body < w[1].body));
        assert!(reg.is_empty());
        assert_eq!(reg.backend().body_count(), 0);
    }

    #[test]
    fn backend_handles_map_back_to_ids() {
        let mut reg = registry(16);
        let b = reg
            .register(&cube_at(1.0), entity(1), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap();
        let handle = reg.handle(b.body).unwrap();
        assert_eq!(reg.lookup_by_handle(handle), Some(b.body));
        reg.unregister(b.body);
        assert_eq!(reg.lookup_by_handle(handle), None);
    }

    #[test]
    fn velocity_writes_reach_only_registered_bodies() {
        let mut reg = registry(16);
        let b = reg
            .register(&cube_at(1.0), entity(1), SyncPolicy::PhysicsDrivesHost, true)
            .unwrap();
        let v = Velocity {
            linear: Vec3::new(0.0, 3.0, 0.0),
            angular: Vec3::zeros(),
        };
        assert!(reg.set_velocity(b.body, v));
        assert_eq!(reg.velocity(b.body), Some(v));
        assert!(reg.apply_impulse(b.body, Vec3::new(1.0, 0.0, 0.0)));
        assert!(reg.velocity(b.body).unwrap().linear.x > 0.0);

        assert!(!reg.set_velocity(BodyId(99), v));
        assert!(!reg.apply_impulse(BodyId(99), Vec3::x()));
        assert_eq!(reg.velocity(BodyId(99)), None);
    }

    #[test]
    fn backend_mass_errors_surface() {
        let mut reg = registry(16);
        let err = reg
            .register(
                &cube_at(0.0).with_mass(-1.0),
                entity(1),
                SyncPolicy::PhysicsDrivesHost,
                true,
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::Backend(BackendError::InvalidMass(-1.0)));
    }
}
