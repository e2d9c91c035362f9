pub mod backend;
pub mod bitmask_flags;
pub mod rapier_world;
pub mod settings;
pub mod shape;
pub mod transform;

pub use backend::{
    ActivationState, BackendError, BodyDesc, ContactEvent, ContactPhase, MotionType,
    PhysicsBackend, RayHit, Velocity,
};
pub use bitmask_flags::{ArmorStandFlag, BitmaskFlags, EntityFlag, FlagBitmask};
pub use rapier_world::RapierBackend;
pub use settings::{
    DEFAULT_MAX_BODIES, DEFAULT_MAX_SUBSTEPS, DEFAULT_PHYSICS_HZ, GRAVITY_MPS2, HOST_TICK_HZ,
    TRANSFORM_ANGULAR_EPS, TRANSFORM_LINEAR_EPS,
};
pub use shape::ShapeDescriptor;
pub use transform::{Quat, Real, Transform, Vec3};
