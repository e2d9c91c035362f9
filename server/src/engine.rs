//! Integration façade.
//!
//! [`Engine`] is the one type surrounding code talks to. Plugin lifecycle hooks
//! call [`Engine::initialize`], [`Engine::start`] and [`Engine::shutdown`]; the
//! host's tick callback calls [`Engine::on_tick`]; commands and event handlers
//! spawn, remove and query simulated objects.
//!
//! Design notes
//! - `initialize` resolves the version strategy exactly once. A failed
//!   resolution leaves the engine uninitialized and `start` keeps failing.
//! - Spawning is proxy first, registration second. If registration fails the
//!   proxy is despawned again, so callers never see half-created objects.
//! - Velocity and impulse writes only reach dynamic bodies; host-driven bodies
//!   answer `NotDynamic`.
//! - Off-thread callers go through [`Engine::remote`].

use std::rc::Rc;
use std::time::Duration;

use shared::{PhysicsBackend, RapierBackend, RayHit, Real, Transform, Vec3, Velocity};

use crate::capabilities::{CapabilityProvider, VersionCapabilities};
use crate::error::{EngineError, LoopError, UnsupportedHostVersion};
use crate::host::{HostProxyKey, HostWorld};
use crate::metrics::{TickMetrics, TickReport};
use crate::registry::{BodyId, BodyRegistry, ObjectDescriptor, PhysicsBody, SyncPolicy};
use crate::remote::RemoteFacade;
use crate::settings::EngineSettings;
use crate::sync_loop::{LoopState, StopHandle, TickListener, WorldSyncLoop};

pub struct Engine<B: PhysicsBackend = RapierBackend> {
    host: Rc<dyn HostWorld>,
    provider: CapabilityProvider,
    sync: WorldSyncLoop<B>,
}

impl Engine<RapierBackend> {
    /// Engine backed by rapier, configured from `settings`.
    pub fn new(host: Rc<dyn HostWorld>, settings: EngineSettings) -> Self {
        let settings = settings.validated();
        let backend = RapierBackend::new(settings.gravity_vector(), settings.max_bodies);
        Self::with_backend(host, backend, settings)
    }
}

impl<B: PhysicsBackend> Engine<B> {
    pub fn with_backend(host: Rc<dyn HostWorld>, backend: B, settings: EngineSettings) -> Self {
        Self {
            host,
            provider: CapabilityProvider::standard(),
            sync: WorldSyncLoop::new(backend, settings),
        }
    }

    /// Replace the strategy list used by `initialize`.
    pub fn with_provider(mut self, provider: CapabilityProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Resolve the strategy for the running host.
    ///
    /// Calling it again after a successful resolution returns the same
    /// capabilities; re-resolution requires a new engine.
    pub fn initialize(&mut self) -> Result<Rc<VersionCapabilities>, UnsupportedHostVersion> {
        if let Some(caps) = self.sync.capabilities() {
            return Ok(caps.clone());
        }
        let ticks = self.sync.settings().teleport_interpolation_ticks;
        match self.provider.resolve(self.host.clone(), ticks) {
            Ok(caps) => {
                let caps = Rc::new(caps);
                self.sync.attach_capabilities(caps.clone());
                Ok(caps)
            }
            Err(err) => {
                log::error!("cannot start physics engine: {err}");
                Err(err)
            }
        }
    }

    pub fn start(&mut self) -> Result<(), LoopError> {
        self.sync.start()
    }

    /// Host tick entry point. The only input that advances the simulation clock.
    pub fn on_tick(&mut self, elapsed: Duration) -> Option<TickReport> {
        self.sync.tick(elapsed)
    }

    /// Stop the loop, releasing every body. Returns the number released.
    pub fn stop(&mut self) -> usize {
        self.sync.stop()
    }

    /// Stop and forget the resolved strategy.
    pub fn shutdown(&mut self) {
        self.sync.stop();
        if self.sync.detach_capabilities().is_some() {
            log::info!("physics engine shut down");
        }
    }

    pub fn spawn_simulated_object(
        &mut self,
        object: impl Into<ObjectDescriptor>,
        transform: Transform,
        policy: SyncPolicy,
    ) -> Result<BodyId, EngineError> {
        self.sync.spawn_object(&object.into(), &transform, policy)
    }

    pub fn remove_simulated_object(&mut self, id: BodyId) -> Result<(), EngineError> {
        self.sync.remove_object(id)
    }

    pub fn query_state(&self, id: BodyId) -> Result<Transform, EngineError> {
        self.sync.query(id)
    }

    pub fn velocity(&self, id: BodyId) -> Result<Velocity, EngineError> {
        self.sync.velocity(id)
    }

    pub fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<(), EngineError> {
        self.sync.set_velocity(id, velocity)
    }

    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec3) -> Result<(), EngineError> {
        self.sync.apply_impulse(id, impulse)
    }

    /// Nearest simulated body along a ray. `direction` need not be normalized.
    pub fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: Real,
    ) -> Option<RayHit<BodyId>> {
        self.sync.raycast(origin, direction, max_distance)
    }

    /// Simulate a host object the engine did not spawn. See
    /// [`WorldSyncLoop::bind_existing`].
    pub fn bind_existing(
        &mut self,
        key: HostProxyKey,
        object: Option<ObjectDescriptor>,
        policy: SyncPolicy,
    ) -> Result<BodyId, EngineError> {
        self.sync.bind_existing(key, object, policy)
    }

    pub fn body(&self, id: BodyId) -> Option<PhysicsBody> {
        self.sync.registry().body(id)
    }

    pub fn lookup_by_host(&self, key: HostProxyKey) -> Option<BodyId> {
        self.sync.registry().lookup_by_host(key)
    }

    pub fn lookup_by_body(&self, id: BodyId) -> Option<HostProxyKey> {
        self.sync.registry().lookup_by_body(id)
    }

    pub fn remote(&self) -> RemoteFacade {
        self.sync.remote()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.sync.stop_handle()
    }

    pub fn add_listener(&mut self, listener: impl TickListener + 'static) {
        self.sync.add_listener(Box::new(listener));
    }

    pub fn metrics(&self) -> &TickMetrics {
        self.sync.metrics()
    }

    pub fn last_report(&self) -> Option<&TickReport> {
        self.sync.last_report()
    }

    pub fn state(&self) -> LoopState {
        self.sync.state()
    }

    pub fn capabilities(&self) -> Option<&Rc<VersionCapabilities>> {
        self.sync.capabilities()
    }

    pub fn settings(&self) -> &EngineSettings {
        self.sync.settings()
    }

    pub fn registry(&self) -> &BodyRegistry<B> {
        self.sync.registry()
    }

    pub fn host(&self) -> &Rc<dyn HostWorld> {
        &self.host
    }
}
