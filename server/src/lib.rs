pub mod capabilities;
pub mod clock;
pub mod engine;
pub mod error;
pub mod host;
pub mod metrics;
pub mod registry;
pub mod remote;
pub mod settings;
pub mod sync_loop;
pub mod version;

pub use capabilities::{CapabilityProvider, HostCapabilities, StrategyEntry, VersionCapabilities};
pub use clock::{FixedStepClock, StepPlan};
pub use engine::Engine;
pub use error::{EngineError, HostError, LoopError, RegistryError, UnsupportedHostVersion};
pub use host::{BlockPos, EntityId, EntityKind, HostProxyKey, HostWorld, InMemoryHost, MetaValue};
pub use metrics::{TickMetrics, TickReport};
pub use registry::{BodyBinding, BodyId, BodyRegistry, ObjectDescriptor, PhysicsBody, SyncPolicy};
pub use remote::{FacadeRequest, PendingReply, RemoteFacade};
pub use settings::{EngineSettings, SettingsError, WorldBounds};
pub use sync_loop::{LoopControl, LoopState, StopHandle, TickListener, WorldSyncLoop};
pub use version::{HostVersion, VersionRange};

pub use shared::{ContactEvent, ContactPhase, RayHit, Velocity};
