//! World sync loop.
//!
//! Driven by the host's tick callback, the loop keeps backend bodies and host
//! proxies consistent. Each tick runs its passes in a fixed order:
//!
//! 0. drain marshalled remote requests
//! 1. validation: bindings whose proxy is gone, or whose block changed
//!    shape, are released
//! 2. pull: host-driven transforms are written into their bodies
//! 3. step: the fixed-step clock decides how many backend steps to run, then
//!    contact events are handed to listeners
//! 4. push: physics-driven transforms are written to their proxies
//! 5. culling: bodies outside the world bounds are released
//!
//! Design notes
//! - Single tick thread. The loop holds `Rc`s and is `!Send`; there are no locks.
//! - A proxy can vanish at any moment. A failed read or write releases the
//!   binding and is counted, never retried and never surfaced as an error.
//! - Bidirectional bindings are pulled only when the host moved the proxy away
//!   from the transform last synced, so physics motion is not reset every tick.
//! - Stop requests (listener or [`StopHandle`]) take effect at a tick boundary.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use shared::{
    ActivationState, ContactEvent, MotionType, PhysicsBackend, RayHit, Real, ShapeDescriptor,
    Transform, Vec3, Velocity,
};

use crate::capabilities::{HostCapabilities, VersionCapabilities};
use crate::clock::FixedStepClock;
use crate::error::{EngineError, HostError, LoopError};
use crate::host::HostProxyKey;
use crate::metrics::{TickMetrics, TickReport};
use crate::registry::{BodyBinding, BodyId, BodyRegistry, ObjectDescriptor, SyncPolicy};
use crate::remote::{FacadeRequest, RemoteFacade, RequestInbox};
use crate::settings::EngineSettings;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Passed to listeners; lets them stop the loop at the end of the tick.
#[derive(Debug, Default)]
pub struct LoopControl {
    stop_requested: bool,
}

impl LoopControl {
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }
}

/// Hooks run on the tick thread around every tick.
pub trait TickListener {
    fn on_tick_start(&mut self, _tick: u64, _control: &mut LoopControl) {}

    /// A contact between two registered bodies started or stopped during the step pass.
    fn on_contact(&mut self, _event: &ContactEvent<BodyId>, _control: &mut LoopControl) {}

    fn on_tick_end(&mut self, _report: &TickReport, _control: &mut LoopControl) {}
}

/// Requests a stop from inside a tick callback (host shutdown hooks etc.).
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Rc<Cell<bool>>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.set(true);
    }

    pub fn is_requested(&self) -> bool {
        self.0.get()
    }

    fn take(&self) -> bool {
        self.0.replace(false)
    }
}

/// Why a binding was released during a tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Release {
    Invalid,
    LostRace,
    OutOfBounds,
}

pub struct WorldSyncLoop<B: PhysicsBackend> {
    state: LoopState,
    caps: Option<Rc<VersionCapabilities>>,
    registry: BodyRegistry<B>,
    /// Block shape each block binding was created from.
    block_shapes: HashMap<BodyId, ShapeDescriptor>,
    clock: FixedStepClock,
    metrics: TickMetrics,
    settings: EngineSettings,
    listeners: Vec<Box<dyn TickListener>>,
    stop: StopHandle,
    inbox: RequestInbox,
    tick: u64,
    last_report: Option<TickReport>,
}

impl<B: PhysicsBackend> WorldSyncLoop<B> {
    pub fn new(backend: B, settings: EngineSettings) -> Self {
        let settings = settings.validated();
        Self {
            state: LoopState::Stopped,
            caps: None,
            registry: BodyRegistry::new(backend),
            block_shapes: HashMap::new(),
            clock: FixedStepClock::new(settings.fixed_step(), settings.max_substeps),
            metrics: TickMetrics::new(settings.metrics_window),
            settings,
            listeners: Vec::new(),
            stop: StopHandle::default(),
            inbox: RequestInbox::new(),
            tick: 0,
            last_report: None,
        }
    }

    pub fn attach_capabilities(&mut self, caps: Rc<VersionCapabilities>) {
        self.caps = Some(caps);
    }

    /// Forget the resolved capabilities. Only allowed while stopped.
    pub fn detach_capabilities(&mut self) -> Option<Rc<VersionCapabilities>> {
        if self.state != LoopState::Stopped {
            return None;
        }
        self.caps.take()
    }

    pub fn capabilities(&self) -> Option<&Rc<VersionCapabilities>> {
        self.caps.as_ref()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &BodyRegistry<B> {
        &self.registry
    }

    pub fn clock(&self) -> &FixedStepClock {
        &self.clock
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn remote(&self) -> RemoteFacade {
        self.inbox.remote()
    }

    pub fn add_listener(&mut self, listener: Box<dyn TickListener>) {
        self.listeners.push(listener);
    }

    pub fn start(&mut self) -> Result<(), LoopError> {
        if self.state != LoopState::Stopped {
            return Err(LoopError::AlreadyRunning);
        }
        let Some(caps) = self.caps.as_ref() else {
            return Err(LoopError::NotInitialized);
        };
        self.state = LoopState::Starting;
        log::info!(
            "sync loop starting: {} Hz, max {} substeps, strategy {}",
            self.settings.physics_hz,
            self.settings.max_substeps,
            caps.strategy()
        );

        self.clock.reset();
        self.stop.take();
        self.state = LoopState::Running;
        self.inbox.set_running(true);
        Ok(())
    }

    /// Release every binding and stop. Returns the number of bindings released.
    pub fn stop(&mut self) -> usize {
        if self.state == LoopState::Stopped {
            return 0;
        }
        self.state = LoopState::Stopping;
        self.inbox.set_running(false);
        let rejected = self.inbox.reject_pending();

        let released = self.registry.clear();
        self.block_shapes.clear();
        if let Some(caps) = self.caps.clone() {
            for binding in released.iter().filter(|b| b.owns_proxy) {
                caps.capabilities().despawn_host_proxy(binding.key);
            }
        }

        self.clock.reset();
        self.state = LoopState::Stopped;
        log::info!(
            "sync loop stopped after {} ticks: released {} bindings, rejected {} requests",
            self.tick,
            released.len(),
            rejected
        );
        released.len()
    }

    /// Run one host tick. Returns `None` when the loop is not running.
    pub fn tick(&mut self, elapsed: Duration) -> Option<TickReport> {
        if self.state != LoopState::Running {
            self.inbox.reject_pending();
            return None;
        }
        if self.stop.take() {
            self.stop();
            return None;
        }
        let caps = self.caps.clone()?;
        let caps = caps.capabilities();

        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };
        let mut control = LoopControl::default();
        for listener in self.listeners.iter_mut() {
            listener.on_tick_start(self.tick, &mut control);
        }

        report.requests = self.drain_requests(caps);
        self.validate(caps, &mut report);
        self.pull(caps, &mut report);
        self.step(elapsed, &mut report);
        self.dispatch_contacts(&mut report, &mut control);
        self.push(caps, &mut report);
        self.cull(caps, &mut report);

        report.bodies = self.registry.len();
        self.metrics.record(&report);
        for listener in self.listeners.iter_mut() {
            listener.on_tick_end(&report, &mut control);
        }
        self.last_report = Some(report.clone());

        if control.stop_requested() || self.stop.take() {
            self.stop();
        }
        Some(report)
    }

    fn release(
        &mut self,
        caps: &dyn HostCapabilities,
        binding: BodyBinding,
        why: Release,
        report: &mut TickReport,
    ) {
        if self.registry.unregister(binding.body).is_none() {
            return;
        }
        self.block_shapes.remove(&binding.body);
        if binding.owns_proxy {
            caps.despawn_host_proxy(binding.key);
        }
        match why {
            Release::Invalid => report.removed_invalid += 1,
            Release::LostRace => report.removed_lost_race += 1,
            Release::OutOfBounds => report.removed_out_of_bounds += 1,
        }
        log::debug!("released {} <-> {} ({:?})", binding.body, binding.key, why);
    }

    fn validate(&mut self, caps: &dyn HostCapabilities, report: &mut TickReport) {
        for binding in self.registry.for_each_active() {
            if !caps.is_host_proxy_valid(binding.key) || self.block_reshaped(caps, binding) {
                self.release(caps, binding, Release::Invalid, report);
            }
        }
    }

    /// The block under a block binding now has a different collision shape
    /// (e.g. stone replaced by a slab).
    fn block_reshaped(&self, caps: &dyn HostCapabilities, binding: BodyBinding) -> bool {
        let HostProxyKey::Block(pos) = binding.key else {
            return false;
        };
        let current = caps.shape_for_block(pos);
        let reshaped = current.as_ref() != self.block_shapes.get(&binding.body);
        if reshaped {
            log::debug!("block {pos} changed shape to {current:?}");
        }
        reshaped
    }

    fn pull(&mut self, caps: &dyn HostCapabilities, report: &mut TickReport) {
        for binding in self.registry.for_each_active().filter(|b| b.policy.pulls()) {
            let host = match caps.read_host_transform(binding.key) {
                Ok(t) => t,
                Err(err) => {
                    log::debug!("pull from {} failed: {err}", binding.key);
                    self.release(caps, binding, Release::LostRace, report);
                    continue;
                }
            };
            let unchanged = self
                .registry
                .last_synced(binding.body)
                .is_some_and(|last| last.approx_eq(&host));
            if unchanged {
                continue;
            }
            if self.registry.place(binding.body, &host) {
                self.registry.set_last_synced(binding.body, host);
                report.pulled += 1;
            }
        }
    }

    fn step(&mut self, elapsed: Duration, report: &mut TickReport) {
        let plan = self.clock.advance(elapsed);
        let dt = self.clock.step_secs();

        let started = Instant::now();
        let backend = self.registry.backend_mut();
        for _ in 0..plan.steps {
            backend.step(dt);
        }
        report.step_time = started.elapsed();
        report.steps = plan.steps;
        report.dropped_steps = plan.dropped;

        if plan.dropped > 0 {
            log::warn!(
                "tick {}: dropped {} physics steps of backlog (cap {})",
                report.tick,
                plan.dropped,
                self.clock.max_substeps()
            );
        }
    }

    fn dispatch_contacts(&mut self, report: &mut TickReport, control: &mut LoopControl) {
        let contacts = self.registry.drain_contacts();
        report.contacts = contacts.len() as u32;
        for event in &contacts {
            for listener in self.listeners.iter_mut() {
                listener.on_contact(event, control);
            }
        }
    }

    fn push(&mut self, caps: &dyn HostCapabilities, report: &mut TickReport) {
        for binding in self.registry.for_each_active().filter(|b| b.policy.pushes()) {
            let Some(current) = self.registry.transform(binding.body) else {
                continue;
            };
            if self.settings.sleep_skip
                && self.registry.activation(binding.body) == ActivationState::Sleeping
                && self
                    .registry
                    .last_synced(binding.body)
                    .is_some_and(|last| last.approx_eq(&current))
            {
                report.skipped_sleeping += 1;
                continue;
            }
            match caps.write_host_transform(binding.key, &current) {
                Ok(()) => {
                    self.registry.set_last_synced(binding.body, current);
                    report.pushed += 1;
                }
                Err(err) => {
                    log::debug!("push to {} failed: {err}", binding.key);
                    self.release(caps, binding, Release::LostRace, report);
                }
            }
        }
    }

    fn cull(&mut self, caps: &dyn HostCapabilities, report: &mut TickReport) {
        let Some(bounds) = self.settings.world_bounds else {
            return;
        };
        for binding in self.registry.for_each_active() {
            let outside = self
                .registry
                .transform(binding.body)
                .is_some_and(|t| !bounds.contains(t.position_f64()));
            if outside {
                self.release(caps, binding, Release::OutOfBounds, report);
            }
        }
    }

    fn drain_requests(&mut self, caps: &dyn HostCapabilities) -> u32 {
        let mut answered = 0;
        for request in self.inbox.drain() {
            answered += 1;
            match request {
                FacadeRequest::Spawn {
                    object,
                    transform,
                    policy,
                    reply,
                } => {
                    let _ = reply.send(self.spawn_with(caps, &object, &transform, policy));
                }
                FacadeRequest::Remove { id, reply } => {
                    let _ = reply.send(self.remove_with(caps, id));
                }
                FacadeRequest::Query { id, reply } => {
                    let _ = reply.send(self.query(id));
                }
            }
        }
        answered
    }

    fn running_caps(&self) -> Result<Rc<VersionCapabilities>, EngineError> {
        if self.state != LoopState::Running {
            return Err(LoopError::NotRunning.into());
        }
        self.caps.clone().ok_or(LoopError::NotInitialized.into())
    }

    /// Spawn a proxy and bind a new body to it.
    ///
    /// If the body cannot be registered the proxy is despawned again.
    pub fn spawn_object(
        &mut self,
        object: &ObjectDescriptor,
        transform: &Transform,
        policy: SyncPolicy,
    ) -> Result<BodyId, EngineError> {
        let caps = self.running_caps()?;
        self.spawn_with(caps.capabilities(), object, transform, policy)
    }

    fn spawn_with(
        &mut self,
        caps: &dyn HostCapabilities,
        object: &ObjectDescriptor,
        transform: &Transform,
        policy: SyncPolicy,
    ) -> Result<BodyId, EngineError> {
        let key = caps.spawn_host_proxy(&object.shape, transform)?;
        let desc = object.body_desc(key, policy, *transform);
        match self.registry.register(&desc, key, policy, true) {
            Ok(binding) => Ok(binding.body),
            Err(err) => {
                caps.despawn_host_proxy(key);
                log::debug!("spawn at {key} rolled back: {err}");
                Err(err.into())
            }
        }
    }

    /// Bind a body to a proxy the host already owns.
    ///
    /// Blocks can only be host-driven; their shape defaults to the block's own.
    pub fn bind_existing(
        &mut self,
        key: HostProxyKey,
        object: Option<ObjectDescriptor>,
        policy: SyncPolicy,
    ) -> Result<BodyId, EngineError> {
        let caps = self.running_caps()?;
        let caps = caps.capabilities();

        let (object, block_shape) = match key {
            HostProxyKey::Block(pos) => {
                if policy != SyncPolicy::HostDrivesPhysics {
                    return Err(EngineError::UnsupportedPolicy { key, policy });
                }
                let shape = caps
                    .shape_for_block(pos)
                    .ok_or(EngineError::NoCollisionShape(key))?;
                let object = object.unwrap_or_else(|| ObjectDescriptor::new(shape.clone()));
                (object, Some(shape))
            }
            HostProxyKey::Entity(_) => {
                if !caps.is_host_proxy_valid(key) {
                    return Err(HostError::ProxyInvalid(key).into());
                }
                let object =
                    object.unwrap_or_else(|| ObjectDescriptor::new(ShapeDescriptor::unit_block()));
                (object, None)
            }
        };

        let transform = caps.read_host_transform(key)?;
        let desc = object.body_desc(key, policy, transform);
        let id = self.registry.register(&desc, key, policy, false)?.body;
        if let Some(shape) = block_shape {
            self.block_shapes.insert(id, shape);
        }
        Ok(id)
    }

    /// Release a body; proxies the engine spawned are despawned with it.
    pub fn remove_object(&mut self, id: BodyId) -> Result<(), EngineError> {
        match self.caps.clone() {
            Some(caps) => self.remove_with(caps.capabilities(), id),
            None => Err(EngineError::UnknownHandle(id)),
        }
    }

    fn remove_with(&mut self, caps: &dyn HostCapabilities, id: BodyId) -> Result<(), EngineError> {
        let binding = self
            .registry
            .unregister(id)
            .ok_or(EngineError::UnknownHandle(id))?;
        self.block_shapes.remove(&id);
        if binding.owns_proxy {
            caps.despawn_host_proxy(binding.key);
        }
        Ok(())
    }

    pub fn query(&self, id: BodyId) -> Result<Transform, EngineError> {
        self.registry
            .transform(id)
            .ok_or(EngineError::UnknownHandle(id))
    }

    pub fn velocity(&self, id: BodyId) -> Result<Velocity, EngineError> {
        self.registry
            .velocity(id)
            .ok_or(EngineError::UnknownHandle(id))
    }

    /// Overwrite a dynamic body's velocity. Host-driven bodies are rejected.
    pub fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<(), EngineError> {
        self.require_dynamic(id)?;
        if self.registry.set_velocity(id, velocity) {
            Ok(())
        } else {
            Err(EngineError::UnknownHandle(id))
        }
    }

    /// Apply a linear impulse (N*s) at a dynamic body's centre of mass.
    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec3) -> Result<(), EngineError> {
        self.require_dynamic(id)?;
        if self.registry.apply_impulse(id, impulse) {
            Ok(())
        } else {
            Err(EngineError::UnknownHandle(id))
        }
    }

    /// First registered body along a ray, as of the last step.
    pub fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: Real,
    ) -> Option<RayHit<BodyId>> {
        self.registry.cast_ray(origin, direction, max_distance)
    }

    fn require_dynamic(&self, id: BodyId) -> Result<(), EngineError> {
        match self.registry.motion(id) {
            None => Err(EngineError::UnknownHandle(id)),
            Some(MotionType::Dynamic) => Ok(()),
            Some(_) => Err(EngineError::NotDynamic(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilityProvider;
    use crate::host::{BlockPos, HostWorld, InMemoryHost};
    use crate::registry::ObjectDescriptor;
    use crate::settings::WorldBounds;
    use shared::RapierBackend;

    fn running_loop(marker: &str, settings: EngineSettings) -> (Rc<InMemoryHost>, WorldSyncLoop<RapierBackend>) {
        let host = Rc::new(InMemoryHost::new(marker));
        let caps = CapabilityProvider::standard()
            .resolve(host.clone(), settings.teleport_interpolation_ticks)
            .unwrap();
        let backend = RapierBackend::new(settings.gravity_vector(), settings.max_bodies);
        let mut sync = WorldSyncLoop::new(backend, settings);
        sync.attach_capabilities(Rc::new(caps));
        sync.start().unwrap();
        (host, sync)
    }

    fn cube() -> ObjectDescriptor {
        ObjectDescriptor::new(ShapeDescriptor::unit_block()).with_mass(1.0)
    }

    const TICK: Duration = Duration::from_millis(50);

    #[test]
    fn start_requires_capabilities() {
        let mut sync = WorldSyncLoop::new(RapierBackend::default(), EngineSettings::default());
        assert_eq!(sync.start(), Err(LoopError::NotInitialized));
        assert_eq!(sync.state(), LoopState::Stopped);
        assert!(sync.tick(TICK).is_none());
    }

    #[test]
    fn start_twice_is_rejected() {
        let (_host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        assert_eq!(sync.start(), Err(LoopError::AlreadyRunning));
    }

    #[test]
    fn spawn_requires_running_loop() {
        let (_host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        sync.stop();
        assert_eq!(
            sync.spawn_object(&cube(), &Transform::identity(), SyncPolicy::PhysicsDrivesHost),
            Err(EngineError::Loop(LoopError::NotRunning))
        );
    }

    #[test]
    fn physics_driven_bodies_move_their_proxy() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let id = sync
            .spawn_object(&cube(), &Transform::from_translation(0.0, 100.0, 0.0), SyncPolicy::PhysicsDrivesHost)
            .unwrap();
        let key = sync.registry().lookup_by_body(id).unwrap();
        let HostProxyKey::Entity(entity) = key else {
            panic!("expected an entity proxy");
        };

        let report = sync.tick(TICK).unwrap();
        assert_eq!(report.steps, 3);
        assert_eq!(report.pushed, 1);

        let body_y = sync.query(id).unwrap().translation.y;
        let host_y = host.entity_position(entity).unwrap()[1] as f32;
        assert!(body_y < 100.0);
        assert!((body_y - host_y).abs() < 1.0e-4);
    }

    #[test]
    fn removed_proxy_is_released_in_the_same_tick() {
        let (host, mut sync) = running_loop("MC: 1.18.2", EngineSettings::default());
        let id = sync
            .spawn_object(&cube(), &Transform::from_translation(0.0, 10.0, 0.0), SyncPolicy::PhysicsDrivesHost)
            .unwrap();
        let HostProxyKey::Entity(entity) = sync.registry().lookup_by_body(id).unwrap() else {
            panic!("expected an entity proxy");
        };
        host.remove_entity(entity);

        let report = sync.tick(TICK).unwrap();
        assert_eq!(report.removed_invalid, 1);
        assert_eq!(report.pushed, 0);
        assert!(sync.registry().is_empty());
        assert_eq!(sync.registry().backend().body_count(), 0);
    }

    #[test]
    fn host_driven_entity_follows_the_host() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let id = sync
            .spawn_object(&cube(), &Transform::from_translation(0.0, 64.0, 0.0), SyncPolicy::HostDrivesPhysics)
            .unwrap();
        let HostProxyKey::Entity(entity) = sync.registry().lookup_by_body(id).unwrap() else {
            panic!("expected an entity proxy");
        };

        host.move_entity(entity, [5.0, 64.0, -3.0]);
        let report = sync.tick(TICK).unwrap();
        assert_eq!(report.pulled, 1);
        assert_eq!(report.pushed, 0);
        let t = sync.query(id).unwrap();
        assert!(t.approx_eq(&Transform::from_translation(5.0, 64.0, -3.0)));

        // Kinematic: gravity does not move it between pulls.
        let report = sync.tick(TICK).unwrap();
        assert_eq!(report.pulled, 0);
        assert!(sync.query(id).unwrap().approx_eq(&t));
    }

    #[test]
    fn bidirectional_pulls_only_host_edits() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let id = sync
            .spawn_object(&cube(), &Transform::from_translation(0.0, 100.0, 0.0), SyncPolicy::Bidirectional)
            .unwrap();
        let HostProxyKey::Entity(entity) = sync.registry().lookup_by_body(id).unwrap() else {
            panic!("expected an entity proxy");
        };

        let first = sync.tick(TICK).unwrap();
        assert_eq!((first.pulled, first.pushed), (0, 1));
        let second = sync.tick(TICK).unwrap();
        assert_eq!((second.pulled, second.pushed), (0, 1));
        assert!(sync.query(id).unwrap().translation.y < 100.0);

        host.move_entity(entity, [20.0, 200.0, 20.0]);
        let third = sync.tick(TICK).unwrap();
        assert_eq!(third.pulled, 1);
        let t = sync.query(id).unwrap();
        assert!((t.translation.x - 20.0).abs() < 1.0e-3);
        assert!(t.translation.y < 200.0 && t.translation.y > 199.0);
    }

    #[test]
    fn block_bindings_are_host_driven_only() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let pos = BlockPos::new(0, 63, 0);
        host.set_block(pos, "minecraft:stone");
        let key = HostProxyKey::Block(pos);

        assert_eq!(
            sync.bind_existing(key, None, SyncPolicy::PhysicsDrivesHost),
            Err(EngineError::UnsupportedPolicy {
                key,
                policy: SyncPolicy::PhysicsDrivesHost
            })
        );
        let id = sync.bind_existing(key, None, SyncPolicy::HostDrivesPhysics).unwrap();
        assert!(sync
            .query(id)
            .unwrap()
            .approx_eq(&Transform::from_translation(0.5, 63.5, 0.5)));

        let air = HostProxyKey::Block(BlockPos::new(0, 64, 0));
        assert_eq!(
            sync.bind_existing(air, None, SyncPolicy::HostDrivesPhysics),
            Err(EngineError::NoCollisionShape(air))
        );

        host.clear_block(pos);
        let report = sync.tick(TICK).unwrap();
        assert_eq!(report.removed_invalid, 1);
        assert!(sync.registry().is_empty());
    }

    #[test]
    fn cube_comes_to_rest_on_a_bound_floor() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        for x in -1..=1 {
            for z in -1..=1 {
                let pos = BlockPos::new(x, 63, z);
                host.set_block(pos, "minecraft:stone");
                sync.bind_existing(HostProxyKey::Block(pos), None, SyncPolicy::HostDrivesPhysics)
                    .unwrap();
            }
        }
        let id = sync
            .spawn_object(&cube(), &Transform::from_translation(0.5, 66.0, 0.5), SyncPolicy::PhysicsDrivesHost)
            .unwrap();

        for _ in 0..100 {
            sync.tick(TICK);
        }
        let y = sync.query(id).unwrap().translation.y;
        assert!((y - 64.5).abs() < 0.05, "cube settled at {y}");
    }

    #[test]
    fn bodies_leaving_bounds_are_culled() {
        let settings = EngineSettings {
            world_bounds: Some(WorldBounds {
                min: [-100.0, 0.0, -100.0],
                max: [100.0, 256.0, 100.0],
            }),
            ..Default::default()
        };
        let (host, mut sync) = running_loop("MC: 1.20.4", settings);
        sync.spawn_object(&cube(), &Transform::from_translation(0.0, 0.5, 0.0), SyncPolicy::PhysicsDrivesHost)
            .unwrap();
        assert_eq!(host.entity_count(), 1);

        let mut culled = 0;
        for _ in 0..10 {
            culled += sync.tick(TICK).map_or(0, |r| r.removed_out_of_bounds);
        }
        assert_eq!(culled, 1);
        assert!(sync.registry().is_empty());
        assert_eq!(host.entity_count(), 0);
    }

    #[test]
    fn spawn_rollback_despawns_the_proxy() {
        let settings = EngineSettings {
            max_bodies: 1,
            ..Default::default()
        };
        let (host, mut sync) = running_loop("MC: 1.20.4", settings);
        sync.spawn_object(&cube(), &Transform::identity(), SyncPolicy::PhysicsDrivesHost)
            .unwrap();
        let err = sync
            .spawn_object(&cube(), &Transform::identity(), SyncPolicy::PhysicsDrivesHost)
            .unwrap_err();
        assert!(err.is_out_of_resources());
        assert_eq!(host.entity_count(), 1);
        assert_eq!(sync.registry().len(), 1);
    }

    #[test]
    fn stop_releases_everything_and_despawns_owned_proxies() {
        let (host, mut sync) = running_loop("MC: 1.16.5", EngineSettings::default());
        let pos = BlockPos::new(0, 0, 0);
        host.set_block(pos, "minecraft:stone");
        sync.bind_existing(HostProxyKey::Block(pos), None, SyncPolicy::HostDrivesPhysics)
            .unwrap();
        for i in 0..3 {
            sync.spawn_object(&cube(), &Transform::from_translation(i as f32, 5.0, 0.0), SyncPolicy::PhysicsDrivesHost)
                .unwrap();
        }
        assert_eq!(host.entity_count(), 3);

        assert_eq!(sync.stop(), 4);
        assert_eq!(sync.state(), LoopState::Stopped);
        assert!(sync.registry().is_empty());
        assert_eq!(sync.registry().backend().body_count(), 0);
        assert_eq!(host.entity_count(), 0);
        assert_eq!(host.block_at(pos).as_deref(), Some("minecraft:stone"));
    }

    struct StopAfter(u64);

    impl TickListener for StopAfter {
        fn on_tick_end(&mut self, report: &TickReport, control: &mut LoopControl) {
            if report.tick >= self.0 {
                control.request_stop();
            }
        }
    }

    #[test]
    fn listener_stop_takes_effect_after_the_tick() {
        let (_host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        sync.add_listener(Box::new(StopAfter(2)));
        sync.spawn_object(&cube(), &Transform::from_translation(0.0, 5.0, 0.0), SyncPolicy::PhysicsDrivesHost)
            .unwrap();

        assert!(sync.tick(TICK).is_some());
        let second = sync.tick(TICK).unwrap();
        assert_eq!(second.pushed, 1);
        assert_eq!(sync.state(), LoopState::Stopped);
        assert!(sync.tick(TICK).is_none());
        assert!(sync.registry().is_empty());
    }

    #[test]
    fn stop_handle_is_honoured_at_the_next_boundary() {
        let (_host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let handle = sync.stop_handle();
        sync.tick(TICK).unwrap();
        handle.request_stop();
        assert!(sync.tick(TICK).is_none());
        assert_eq!(sync.state(), LoopState::Stopped);

        // Restarting clears the old request.
        sync.start().unwrap();
        assert!(sync.tick(TICK).is_some());
    }

    #[test]
    fn sleeping_bodies_are_not_pushed() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let floor = BlockPos::new(0, 0, 0);
        host.set_block(floor, "minecraft:stone");
        sync.bind_existing(HostProxyKey::Block(floor), None, SyncPolicy::HostDrivesPhysics)
            .unwrap();
        sync.spawn_object(&cube(), &Transform::from_translation(0.5, 1.5, 0.5), SyncPolicy::PhysicsDrivesHost)
            .unwrap();

        let mut skipped = 0;
        for _ in 0..200 {
            skipped += sync.tick(TICK).map_or(0, |r| r.skipped_sleeping);
        }
        assert!(skipped > 0, "resting cube never fell asleep");
    }

    #[derive(Default)]
    struct ContactLog(Rc<std::cell::RefCell<Vec<ContactEvent<BodyId>>>>);

    impl TickListener for ContactLog {
        fn on_contact(&mut self, event: &ContactEvent<BodyId>, _control: &mut LoopControl) {
            self.0.borrow_mut().push(*event);
        }
    }

    #[test]
    fn landing_is_reported_to_listeners_by_body_id() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        sync.add_listener(Box::new(ContactLog(seen.clone())));

        let pos = BlockPos::new(0, 63, 0);
        host.set_block(pos, "minecraft:stone");
        let floor = sync
            .bind_existing(HostProxyKey::Block(pos), None, SyncPolicy::HostDrivesPhysics)
            .unwrap();
        let falling = sync
            .spawn_object(&cube(), &Transform::from_translation(0.5, 66.0, 0.5), SyncPolicy::PhysicsDrivesHost)
            .unwrap();

        let mut counted = 0;
        for _ in 0..40 {
            counted += sync.tick(TICK).map_or(0, |r| r.contacts);
        }
        let seen = seen.borrow();
        assert_eq!(counted as usize, seen.len());
        let landing = seen
            .iter()
            .find(|e| e.phase == shared::ContactPhase::Started)
            .expect("cube never touched the floor");
        assert!(landing.involves(floor) && landing.involves(falling));
    }

    #[test]
    fn explicit_block_shapes_still_need_a_solid_block() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let air = HostProxyKey::Block(BlockPos::new(3, 70, 3));
        assert_eq!(
            sync.bind_existing(air, Some(cube()), SyncPolicy::HostDrivesPhysics),
            Err(EngineError::NoCollisionShape(air))
        );

        let pos = BlockPos::new(3, 64, 3);
        host.set_block(pos, "minecraft:oak_slab");
        let id = sync
            .bind_existing(HostProxyKey::Block(pos), Some(cube()), SyncPolicy::HostDrivesPhysics)
            .unwrap();
        // Same block, same shape: the binding survives even though the body
        // was given a custom descriptor.
        let report = sync.tick(TICK).unwrap();
        assert_eq!(report.removed_invalid, 0);
        assert!(sync.query(id).is_ok());
    }

    #[test]
    fn velocity_writes_are_limited_to_dynamic_bodies() {
        let (host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        let pos = BlockPos::new(0, 0, 0);
        host.set_block(pos, "minecraft:stone");
        let block = sync
            .bind_existing(HostProxyKey::Block(pos), None, SyncPolicy::HostDrivesPhysics)
            .unwrap();
        let ball = sync
            .spawn_object(&cube(), &Transform::from_translation(0.0, 50.0, 0.0), SyncPolicy::PhysicsDrivesHost)
            .unwrap();

        let up = Velocity {
            linear: Vec3::new(0.0, 5.0, 0.0),
            angular: Vec3::zeros(),
        };
        sync.set_velocity(ball, up).unwrap();
        assert_eq!(sync.velocity(ball).unwrap(), up);
        assert_eq!(sync.set_velocity(block, up), Err(EngineError::NotDynamic(block)));
        assert_eq!(
            sync.apply_impulse(block, Vec3::new(0.0, 1.0, 0.0)),
            Err(EngineError::NotDynamic(block))
        );
        assert_eq!(
            sync.apply_impulse(BodyId(404), Vec3::new(0.0, 1.0, 0.0)),
            Err(EngineError::UnknownHandle(BodyId(404)))
        );
    }

    #[test]
    fn metrics_track_every_tick() {
        let (_host, mut sync) = running_loop("MC: 1.20.4", EngineSettings::default());
        for _ in 0..5 {
            sync.tick(TICK);
        }
        assert_eq!(sync.metrics().ticks(), 5);
        assert_eq!(sync.tick_count(), 5);
        assert_eq!(sync.last_report().map(|r| r.tick), Some(5));
        assert_eq!(sync.clock().total_steps(), 15);
    }
}
