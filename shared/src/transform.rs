/*!
Rigid transforms exchanged between the backend and the host.

The backend works in single precision (`Real`), the host stores entity
positions as `f64`. Conversions live here so every strategy rounds the same way.

Rotation conventions
- `rotation` is a unit quaternion, Y-up, right-handed.
- Euler angles are `[x, y, z]` in degrees, composed as `Rz * Ry * Rx`
  (nalgebra's roll/pitch/yaw order). This is the layout armor-stand head poses use.
*/

use nalgebra as na;

use crate::settings::{TRANSFORM_ANGULAR_EPS, TRANSFORM_LINEAR_EPS};

/// Scalar type used by the physics backend.
pub type Real = f32;

pub type Vec3 = na::Vector3<Real>;
pub type Quat = na::UnitQuaternion<Real>;
pub type Iso = na::Isometry3<Real>;

/// A rigid transform (isometry) in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    #[inline]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    #[inline]
    pub fn identity() -> Self {
        Self::new(Vec3::zeros(), Quat::identity())
    }

    #[inline]
    pub fn from_translation(x: Real, y: Real, z: Real) -> Self {
        Self::new(Vec3::new(x, y, z), Quat::identity())
    }

    /// Convert to nalgebra `Isometry3` for the backend.
    #[inline]
    pub fn iso(&self) -> Iso {
        Iso::from_parts(
            na::Translation3::new(self.translation.x, self.translation.y, self.translation.z),
            self.rotation,
        )
    }

    #[inline]
    pub fn from_iso(iso: &Iso) -> Self {
        Self::new(iso.translation.vector, iso.rotation)
    }

    /// Host-side position (double precision).
    #[inline]
    pub fn position_f64(&self) -> [f64; 3] {
        [
            self.translation.x as f64,
            self.translation.y as f64,
            self.translation.z as f64,
        ]
    }

    /// Build from a host-side position and a rotation.
    #[inline]
    pub fn from_position_f64(position: [f64; 3], rotation: Quat) -> Self {
        Self::new(
            Vec3::new(position[0] as Real, position[1] as Real, position[2] as Real),
            rotation,
        )
    }

    /// True if both transforms agree within the default world-space tolerances.
    #[inline]
    pub fn approx_eq(&self, other: &Transform) -> bool {
        self.approx_eq_with(other, TRANSFORM_LINEAR_EPS, TRANSFORM_ANGULAR_EPS)
    }

    pub fn approx_eq_with(&self, other: &Transform, linear_eps: Real, angular_eps: Real) -> bool {
        (self.translation - other.translation).norm() <= linear_eps
            && self.rotation.angle_to(&other.rotation) <= angular_eps
    }

    /// `[x, y, z]` Euler angles in degrees.
    pub fn euler_degrees(&self) -> [f32; 3] {
        quat_to_euler_degrees(&self.rotation)
    }

    /// Entity-style `(yaw, pitch)` in degrees.
    ///
    /// Host entities only carry heading and pitch; roll is lost.
    pub fn yaw_pitch_degrees(&self) -> (f32, f32) {
        let forward = self.rotation * Vec3::z();
        let yaw = (-forward.x).atan2(forward.z).to_degrees();
        let horizontal = (forward.x * forward.x + forward.z * forward.z).sqrt();
        let pitch = (-forward.y).atan2(horizontal).to_degrees();
        (yaw, pitch)
    }
}

/// Convert a rotation into `[x, y, z]` Euler angles in degrees.
pub fn quat_to_euler_degrees(q: &Quat) -> [f32; 3] {
    let (roll, pitch, yaw) = q.euler_angles();
    [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
}

/// Inverse of [`quat_to_euler_degrees`].
pub fn quat_from_euler_degrees(angles: [f32; 3]) -> Quat {
    Quat::from_euler_angles(
        angles[0].to_radians(),
        angles[1].to_radians(),
        angles[2].to_radians(),
    )
}

/// Pack a rotation as `[x, y, z, w]`, the order host metadata uses.
#[inline]
pub fn quat_to_xyzw(q: &Quat) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

/// Unpack `[x, y, z, w]`. Non-normalized input is renormalized.
#[inline]
pub fn quat_from_xyzw(v: [f32; 4]) -> Quat {
    Quat::from_quaternion(na::Quaternion::new(v[3], v[0], v[1], v[2]))
}
