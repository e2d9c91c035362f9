//! Block-display proxies (1.19.4 and later).
//!
//! A block display renders a unit block transformed by translation, left
//! rotation, scale and right rotation stored in metadata. The entity sits at
//! the body's position; the translation slot moves the cube so its center lands
//! on that point after rotation and scaling. 1.20.2 added a teleport-duration
//! slot in front of the transformation slots, shifting them by one.

use std::rc::Rc;

use shared::transform::{quat_from_xyzw, quat_to_xyzw};
use shared::{BitmaskFlags, Quat, ShapeDescriptor, Transform, Vec3};

use crate::error::HostError;
use crate::host::{BlockPos, EntityId, EntityKind, HostProxyKey, HostWorld, MetaValue};
use crate::version::VersionRange;

use super::blocks::BlockProxies;
use super::{HostCapabilities, StrategyContext, StrategyEntry};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DisplayLayout {
    /// `None` before the slot existed.
    pub teleport_duration: Option<u8>,
    pub translation: u8,
    pub scale: u8,
    pub left_rotation: u8,
    pub right_rotation: u8,
    pub block_state: u8,
}

const ENTITY_FLAGS_SLOT: u8 = 0;

/// Block rendered by display proxies.
const PROXY_BLOCK_STATE: &str = "minecraft:stone";

pub const LAYOUT_1194: DisplayLayout = DisplayLayout {
    teleport_duration: None,
    translation: 10,
    scale: 11,
    left_rotation: 12,
    right_rotation: 13,
    block_state: 22,
};

pub const LAYOUT_1202: DisplayLayout = DisplayLayout {
    teleport_duration: Some(10),
    translation: 11,
    scale: 12,
    left_rotation: 13,
    right_rotation: 14,
    block_state: 23,
};

pub const DISPLAY_1194: StrategyEntry = StrategyEntry {
    name: "display/1.19.4",
    range: VersionRange::new((1, 19, 4), (1, 20, 1)),
    factory: display_1194,
};

pub const DISPLAY_1202: StrategyEntry = StrategyEntry {
    name: "display/1.20.2",
    range: VersionRange::new((1, 20, 2), (1, 21, 11)),
    factory: display_1202,
};

fn display_1194(ctx: StrategyContext) -> Box<dyn HostCapabilities> {
    Box::new(DisplayStrategy::new(ctx, LAYOUT_1194))
}

fn display_1202(ctx: StrategyContext) -> Box<dyn HostCapabilities> {
    Box::new(DisplayStrategy::new(ctx, LAYOUT_1202))
}

pub struct DisplayStrategy {
    host: Rc<dyn HostWorld>,
    layout: DisplayLayout,
    blocks: BlockProxies,
    teleport_ticks: i32,
}

impl DisplayStrategy {
    pub fn new(ctx: StrategyContext, layout: DisplayLayout) -> Self {
        Self {
            blocks: BlockProxies::new(&ctx.version),
            host: ctx.host,
            layout,
            teleport_ticks: ctx.teleport_interpolation_ticks.max(0),
        }
    }

    /// Half-extents of the rendered cube, stored as the scale slot halved.
    fn half_extents(&self, id: EntityId) -> Vec3 {
        match self.host.read_metadata(id, self.layout.scale) {
            Some(MetaValue::Vector3f(s)) => Vec3::from(s) * 0.5,
            _ => Vec3::new(0.5, 0.5, 0.5),
        }
    }

    fn write_rotation(&self, id: EntityId, rotation: &Quat, half_extents: Vec3) -> bool {
        let offset = -(rotation * half_extents);
        self.host.write_metadata(
            id,
            self.layout.translation,
            MetaValue::Vector3f([offset.x, offset.y, offset.z]),
        ) && self.host.write_metadata(
            id,
            self.layout.left_rotation,
            MetaValue::Quaternion(quat_to_xyzw(rotation)),
        )
    }

    fn init_proxy(&self, id: EntityId, shape: &ShapeDescriptor, transform: &Transform) -> bool {
        let half = shape.bounding_half_extents();
        let size = half * 2.0;
        let flags = BitmaskFlags::<u8>::default();

        let mut ok = self
            .host
            .write_metadata(id, ENTITY_FLAGS_SLOT, MetaValue::Byte(flags.bits))
            && self.host.write_metadata(
                id,
                self.layout.block_state,
                MetaValue::BlockState(PROXY_BLOCK_STATE.to_string()),
            )
            && self
                .host
                .write_metadata(id, self.layout.scale, MetaValue::Vector3f([size.x, size.y, size.z]))
            && self.host.write_metadata(
                id,
                self.layout.right_rotation,
                MetaValue::Quaternion(quat_to_xyzw(&Quat::identity())),
            )
            && self.write_rotation(id, &transform.rotation, half);

        if let Some(slot) = self.layout.teleport_duration {
            ok = ok && self.host.write_metadata(id, slot, MetaValue::Int(self.teleport_ticks));
        }
        ok
    }
}

impl HostCapabilities for DisplayStrategy {
    fn read_host_transform(&self, key: HostProxyKey) -> Result<Transform, HostError> {
        match key {
            HostProxyKey::Entity(id) => {
                let position = self
                    .host
                    .entity_position(id)
                    .ok_or(HostError::ProxyInvalid(key))?;
                let rotation = match self.host.read_metadata(id, self.layout.left_rotation) {
                    Some(MetaValue::Quaternion(q)) => quat_from_xyzw(q),
                    _ => Quat::identity(),
                };
                Ok(Transform::from_position_f64(position, rotation))
            }
            HostProxyKey::Block(pos) => self.blocks.read_transform(self.host.as_ref(), pos),
        }
    }

    fn write_host_transform(&self, key: HostProxyKey, transform: &Transform) -> Result<(), HostError> {
        let HostProxyKey::Entity(id) = key else {
            return Err(HostError::ReadOnlyProxy(key));
        };
        let half = self.half_extents(id);
        if self
            .host
            .teleport_entity(id, transform.position_f64(), 0.0, 0.0)
            && self.write_rotation(id, &transform.rotation, half)
        {
            Ok(())
        } else {
            Err(HostError::ProxyInvalid(key))
        }
    }

    fn spawn_host_proxy(
        &self,
        shape: &ShapeDescriptor,
        transform: &Transform,
    ) -> Result<HostProxyKey, HostError> {
        let id = self
            .host
            .spawn_entity(EntityKind::BlockDisplay, transform.position_f64())?;
        let key = HostProxyKey::Entity(id);
        if !self.init_proxy(id, shape, transform) {
            self.host.remove_entity(id);
            return Err(HostError::ProxyInvalid(key));
        }
        Ok(key)
    }

    fn despawn_host_proxy(&self, key: HostProxyKey) {
        if let HostProxyKey::Entity(id) = key {
            self.host.remove_entity(id);
        }
    }

    fn is_host_proxy_valid(&self, key: HostProxyKey) -> bool {
        match key {
            HostProxyKey::Entity(id) => self.host.is_entity_valid(id),
            HostProxyKey::Block(pos) => self.blocks.is_valid(self.host.as_ref(), pos),
        }
    }

    fn shape_for_block(&self, pos: BlockPos) -> Option<ShapeDescriptor> {
        self.blocks.shape(self.host.as_ref(), pos)
    }
}
