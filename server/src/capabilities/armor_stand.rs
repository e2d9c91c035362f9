//! Armor-stand proxies for hosts without display entities (1.16.0 to 1.19.3).
//!
//! The proxy is an invisible marker armor stand. Position goes through entity
//! teleports; orientation goes through the head pose, which the host stores as
//! Euler degrees in a metadata slot. 1.17 inserted a base-entity field, which
//! shifts every armor-stand slot by one.

use std::rc::Rc;

use shared::transform::{quat_from_euler_degrees, quat_to_euler_degrees};
use shared::{ArmorStandFlag, BitmaskFlags, EntityFlag, Quat, ShapeDescriptor, Transform};

use crate::error::HostError;
use crate::host::{BlockPos, EntityId, EntityKind, HostProxyKey, HostWorld, MetaValue};
use crate::version::VersionRange;

use super::blocks::BlockProxies;
use super::{HostCapabilities, StrategyContext, StrategyEntry};

/// Metadata slots that moved between revisions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArmorStandLayout {
    pub client_flags: u8,
    pub head_pose: u8,
}

/// Base entity slots that did not move.
const ENTITY_FLAGS_SLOT: u8 = 0;
const NO_GRAVITY_SLOT: u8 = 5;

pub const LAYOUT_116: ArmorStandLayout = ArmorStandLayout {
    client_flags: 14,
    head_pose: 15,
};

pub const LAYOUT_117: ArmorStandLayout = ArmorStandLayout {
    client_flags: 15,
    head_pose: 16,
};

pub const LEGACY_116: StrategyEntry = StrategyEntry {
    name: "armor_stand/1.16",
    range: VersionRange::new((1, 16, 0), (1, 16, 5)),
    factory: legacy_116,
};

pub const LEGACY_117: StrategyEntry = StrategyEntry {
    name: "armor_stand/1.17",
    range: VersionRange::new((1, 17, 0), (1, 19, 3)),
    factory: legacy_117,
};

fn legacy_116(ctx: StrategyContext) -> Box<dyn HostCapabilities> {
    Box::new(ArmorStandStrategy::new(ctx, LAYOUT_116))
}

fn legacy_117(ctx: StrategyContext) -> Box<dyn HostCapabilities> {
    Box::new(ArmorStandStrategy::new(ctx, LAYOUT_117))
}

pub struct ArmorStandStrategy {
    host: Rc<dyn HostWorld>,
    layout: ArmorStandLayout,
    blocks: BlockProxies,
}

impl ArmorStandStrategy {
    pub fn new(ctx: StrategyContext, layout: ArmorStandLayout) -> Self {
        Self {
            blocks: BlockProxies::new(&ctx.version),
            host: ctx.host,
            layout,
        }
    }

    fn read_head_pose(&self, id: EntityId) -> Quat {
        match self.host.read_metadata(id, self.layout.head_pose) {
            Some(MetaValue::Rotations(angles)) => quat_from_euler_degrees(angles),
            _ => Quat::identity(),
        }
    }

    fn init_proxy(&self, id: EntityId) -> bool {
        let entity_flags = BitmaskFlags::<u8>::default().with(EntityFlag::Invisible);
        let stand_flags = BitmaskFlags::<u8>::default()
            .with(ArmorStandFlag::Marker)
            .with(ArmorStandFlag::NoBasePlate);

        self.host
            .write_metadata(id, ENTITY_FLAGS_SLOT, MetaValue::Byte(entity_flags.bits))
            && self
                .host
                .write_metadata(id, NO_GRAVITY_SLOT, MetaValue::Boolean(true))
            && self.host.write_metadata(
                id,
                self.layout.client_flags,
                MetaValue::Byte(stand_flags.bits),
            )
    }
}

impl HostCapabilities for ArmorStandStrategy {
    fn read_host_transform(&self, key: HostProxyKey) -> Result<Transform, HostError> {
        match key {
            HostProxyKey::Entity(id) => {
                let position = self
                    .host
                    .entity_position(id)
                    .ok_or(HostError::ProxyInvalid(key))?;
                Ok(Transform::from_position_f64(position, self.read_head_pose(id)))
            }
            HostProxyKey::Block(pos) => self.blocks.read_transform(self.host.as_ref(), pos),
        }
    }

    fn write_host_transform(&self, key: HostProxyKey, transform: &Transform) -> Result<(), HostError> {
        let HostProxyKey::Entity(id) = key else {
            return Err(HostError::ReadOnlyProxy(key));
        };
        let pose = MetaValue::Rotations(quat_to_euler_degrees(&transform.rotation));
        if self
            .host
            .teleport_entity(id, transform.position_f64(), 0.0, 0.0)
            && self.host.write_metadata(id, self.layout.head_pose, pose)
        {
            Ok(())
        } else {
            Err(HostError::ProxyInvalid(key))
        }
    }

    fn spawn_host_proxy(
        &self,
        _shape: &ShapeDescriptor,
        transform: &Transform,
    ) -> Result<HostProxyKey, HostError> {
        let id = self
            .host
            .spawn_entity(EntityKind::ArmorStand, transform.position_f64())?;
        let key = HostProxyKey::Entity(id);

        let pose = MetaValue::Rotations(quat_to_euler_degrees(&transform.rotation));
        if !(self.init_proxy(id) && self.host.write_metadata(id, self.layout.head_pose, pose)) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use crate::version::HostVersion;

    fn strategy(marker: &str, layout: ArmorStandLayout) -> (Rc<InMemoryHost>, ArmorStandStrategy) {
        let host = Rc::new(InMemoryHost::new(marker));
        let version = HostVersion::parse_marker(marker).unwrap();
        let ctx = StrategyContext {
            host: host.clone(),
            version,
            teleport_interpolation_ticks: 0,
        };
        (host, ArmorStandStrategy::new(ctx, layout))
    }

    fn entity(key: HostProxyKey) -> EntityId {
        match key {
            HostProxyKey::Entity(id) => id,
            HostProxyKey::Block(_) => panic!("expected an entity proxy"),
        }
    }

    #[test]
    fn spawned_stand_is_an_invisible_marker() {
        let (host, s) = strategy("MC: 1.16.5", LAYOUT_116);
        let key = s
            .spawn_host_proxy(&ShapeDescriptor::unit_block(), &Transform::from_translation(0.0, 70.0, 0.0))
            .unwrap();
        let id = entity(key);

        assert_eq!(host.entity_kind(id), Some(EntityKind::ArmorStand));
        assert_eq!(host.read_metadata(id, 0), Some(MetaValue::Byte(0b0010_0000)));
        assert_eq!(host.read_metadata(id, 14), Some(MetaValue::Byte(0b0001_1000)));
        assert_eq!(host.read_metadata(id, 5), Some(MetaValue::Boolean(true)));
    }

    #[test]
    fn head_pose_slot_moves_in_1_17() {
        let (host, s) = strategy("MC: 1.18.2", LAYOUT_117);
        let rotation = quat_from_euler_degrees([10.0, 20.0, 30.0]);
        let t = Transform::new(shared::Vec3::new(1.0, 2.0, 3.0), rotation);
        let key = s.spawn_host_proxy(&ShapeDescriptor::unit_block(), &t).unwrap();
        let id = entity(key);

        assert!(matches!(host.read_metadata(id, 16), Some(MetaValue::Rotations(_))));
        assert!(matches!(host.read_metadata(id, 15), Some(MetaValue::Byte(_))));

        let back = s.read_host_transform(key).unwrap();
        assert!(back.approx_eq_with(&t, 1.0e-4, 1.0e-3));
    }

    #[test]
    fn writes_to_removed_stands_fail() {
        let (host, s) = strategy("MC: 1.16.5", LAYOUT_116);
        let key = s
            .spawn_host_proxy(&ShapeDescriptor::unit_block(), &Transform::identity())
            .unwrap();
        host.remove_entity(entity(key));

        assert!(!s.is_host_proxy_valid(key));
        assert_eq!(
            s.write_host_transform(key, &Transform::identity()),
            Err(HostError::ProxyInvalid(key))
        );
        assert!(s.read_host_transform(key).is_err());
    }

    #[test]
    fn block_proxies_are_read_only() {
        let (host, s) = strategy("MC: 1.16.5", LAYOUT_116);
        let pos = BlockPos::new(0, 0, 0);
        host.set_block(pos, "minecraft:grass_path");
        let key = HostProxyKey::Block(pos);

        assert!(s.is_host_proxy_valid(key));
        assert_eq!(
            s.write_host_transform(key, &Transform::identity()),
            Err(HostError::ReadOnlyProxy(key))
        );
        assert_eq!(s.shape_for_block(pos), Some(ShapeDescriptor::slab(15.0 / 16.0)));
    }
}
