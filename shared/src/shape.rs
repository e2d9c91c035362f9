//! Shape descriptors for simulated bodies.
//!
//! A [`ShapeDescriptor`] is the schema-agnostic description of a body's collision
//! shape. The host side derives one from a block or entity type, the backend turns
//! it into a collider.
//!
//! Conventions
//! - Units are meters; a full host block is a cuboid with half-extents `0.5`.
//! - All round/axis-aligned variants are Y-aligned in local space.
//! - Planes are infinite and can only back fixed bodies.

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, MotionType};
use crate::transform::Vec3;

/// Supported body shapes.
///
/// Keep this intentionally small and deterministic. Extend as needed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ShapeDescriptor {
    /// Infinite plane (half-space) with its normal along local +Y.
    Plane,

    /// Oriented cuboid with given half-extents (meters).
    Cuboid { half_extents: [f32; 3] },

    /// Sphere/ball (meters).
    Sphere { radius: f32 },

    /// Y-aligned capsule (meters).
    CapsuleY { radius: f32, half_height: f32 },

    /// Y-aligned cylinder (meters).
    CylinderY { radius: f32, half_height: f32 },

    /// Y-aligned cone (meters).
    ConeY { radius: f32, half_height: f32 },

    /// Rounded cuboid (meters).
    ///
    /// `border_radius` rounds all edges/corners.
    RoundCuboid {
        half_extents: [f32; 3],
        border_radius: f32,
    },
}

impl ShapeDescriptor {
    /// A full host block.
    pub fn unit_block() -> Self {
        Self::Cuboid {
            half_extents: [0.5, 0.5, 0.5],
        }
    }

    /// A block-wide slab of the given height (meters, `0 < height <= 1`).
    pub fn slab(height: f32) -> Self {
        Self::Cuboid {
            half_extents: [0.5, height * 0.5, 0.5],
        }
    }

    /// Reject descriptors the backend cannot build a body from.
    ///
    /// - Every dimension must be finite and strictly positive
    ///   (border radii may be zero).
    /// - Planes are only valid for [`MotionType::Fixed`].
    pub fn validate(&self, motion: MotionType) -> Result<(), BackendError> {
        let positive = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(BackendError::InvalidShape(format!(
                    "{name} must be finite and > 0, got {v}"
                )))
            }
        };

        match self {
            ShapeDescriptor::Plane => {
                if motion != MotionType::Fixed {
                    return Err(BackendError::InvalidShape(
                        "planes can only back fixed bodies".into(),
                    ));
                }
                Ok(())
            }
            ShapeDescriptor::Cuboid { half_extents } => {
                half_extents.iter().try_for_each(|&h| positive("half extent", h))
            }
            ShapeDescriptor::Sphere { radius } => positive("radius", *radius),
            ShapeDescriptor::CapsuleY {
                radius,
                half_height,
            }
            | ShapeDescriptor::CylinderY {
                radius,
                half_height,
            }
            | ShapeDescriptor::ConeY {
                radius,
                half_height,
            } => {
                positive("radius", *radius)?;
                positive("half height", *half_height)
            }
            ShapeDescriptor::RoundCuboid {
                half_extents,
                border_radius,
            } => {
                half_extents
                    .iter()
                    .try_for_each(|&h| positive("half extent", h))?;
                if border_radius.is_finite() && *border_radius >= 0.0 {
                    Ok(())
                } else {
                    Err(BackendError::InvalidShape(format!(
                        "border radius must be finite and >= 0, got {border_radius}"
                    )))
                }
            }
        }
    }

    /// Half-extents of the local-space bounding box.
    ///
    /// Display proxies use this to scale a unit block to the body's size.
    /// Planes report a unit block since they have no finite extent.
    pub fn bounding_half_extents(&self) -> Vec3 {
        match self {
            ShapeDescriptor::Plane => Vec3::new(0.5, 0.5, 0.5),
            ShapeDescriptor::Cuboid { half_extents } => Vec3::from(*half_extents),
            ShapeDescriptor::Sphere { radius } => Vec3::new(*radius, *radius, *radius),
            ShapeDescriptor::CapsuleY {
                radius,
                half_height,
            } => Vec3::new(*radius, half_height + radius, *radius),
            ShapeDescriptor::CylinderY {
                radius,
                half_height,
            }
            | ShapeDescriptor::ConeY {
                radius,
                half_height,
            } => Vec3::new(*radius, *half_height, *radius),
            ShapeDescriptor::RoundCuboid {
                half_extents,
                border_radius,
            } => Vec3::from(*half_extents).add_scalar(*border_radius),
        }
    }

    /// Build the Rapier collider for this descriptor.
    ///
    /// The collider is attached with identity local transform; the body carries the pose.
    pub fn collider_builder(&self) -> ColliderBuilder {
        match self {
            ShapeDescriptor::Plane => ColliderBuilder::halfspace(Vector::y_axis()),

            ShapeDescriptor::Cuboid { half_extents } => {
                ColliderBuilder::cuboid(half_extents[0], half_extents[1], half_extents[2])
            }

            ShapeDescriptor::Sphere { radius } => ColliderBuilder::ball(*radius),

            ShapeDescriptor::CapsuleY {
                radius,
                half_height,
            } => ColliderBuilder::capsule_y(*half_height, *radius),

            ShapeDescriptor::CylinderY {
                radius,
                half_height,
            } => ColliderBuilder::cylinder(*half_height, *radius),

            ShapeDescriptor::ConeY {
                radius,
                half_height,
            } => ColliderBuilder::cone(*half_height, *radius),

            ShapeDescriptor::RoundCuboid {
                half_extents,
                border_radius,
            } => ColliderBuilder::round_cuboid(
                half_extents[0],
                half_extents[1],
                half_extents[2],
                *border_radius,
            ),
        }
    }
}
