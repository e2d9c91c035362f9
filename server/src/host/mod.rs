//! Host world boundary.
//!
//! [`HostWorld`] is the raw, revision-specific surface of the running game
//! server: entities with indexed metadata, blocks identified by name, and a
//! free-form version marker. Nothing above the capability strategies touches
//! it directly; the loop only ever sees [`HostProxyKey`]s.
//!
//! Design notes
//! - Methods take `&self`. Hosts are shared (`Rc<dyn HostWorld>`) between the
//!   strategy and whoever embeds the engine, so implementations use interior
//!   mutability.
//! - Proxies are weak: an id plus a validity check. A key may dangle at any time
//!   and every call must tolerate that.

mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HostError;

pub use memory::InMemoryHost;

/// Host-assigned entity identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Integer block coordinates; the block occupies `[x, x+1) × [y, y+1) × [z, z+1)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// World position of the block's bottom face center.
    pub fn bottom_center(&self) -> [f64; 3] {
        [self.x as f64 + 0.5, self.y as f64, self.z as f64 + 0.5]
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Identity of the host-world object a body is bound to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostProxyKey {
    Entity(EntityId),
    Block(BlockPos),
}

impl fmt::Display for HostProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostProxyKey::Entity(id) => id.fmt(f),
            HostProxyKey::Block(pos) => pos.fmt(f),
        }
    }
}

/// Entity types the strategies spawn as proxies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    ArmorStand,
    /// Only exists from 1.19.4 on.
    BlockDisplay,
}

/// A typed value in an entity metadata slot.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    Byte(u8),
    Int(i32),
    Float(f32),
    Boolean(bool),
    Vector3f([f32; 3]),
    /// `[x, y, z, w]`.
    Quaternion([f32; 4]),
    /// Euler angles in degrees.
    Rotations([f32; 3]),
    BlockState(String),
}

/// Raw host access. Slot indices and entity kinds are revision specific; only
/// capability strategies know which ones to use.
pub trait HostWorld {
    /// Free-form version string as reported by the host, e.g. `"git-Paper-196 (MC: 1.20.4)"`.
    fn version_marker(&self) -> String;

    fn spawn_entity(&self, kind: EntityKind, position: [f64; 3]) -> Result<EntityId, HostError>;

    /// Returns `false` if the entity was already gone.
    fn remove_entity(&self, id: EntityId) -> bool;

    fn is_entity_valid(&self, id: EntityId) -> bool;

    fn entity_position(&self, id: EntityId) -> Option<[f64; 3]>;

    /// Move an entity. Returns `false` if it no longer exists.
    fn teleport_entity(&self, id: EntityId, position: [f64; 3], yaw: f32, pitch: f32) -> bool;

    fn write_metadata(&self, id: EntityId, slot: u8, value: MetaValue) -> bool;

    fn read_metadata(&self, id: EntityId, slot: u8) -> Option<MetaValue>;

    /// Namespaced block name (`"minecraft:stone"`), or `None` for unloaded chunks.
    fn block_at(&self, pos: BlockPos) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_keys_display_their_identity() {
        assert_eq!(HostProxyKey::Entity(EntityId(7)).to_string(), "entity#7");
        assert_eq!(
            HostProxyKey::Block(BlockPos::new(1, -2, 3)).to_string(),
            "block(1, -2, 3)"
        );
    }

    #[test]
    fn bottom_center_is_inside_the_block() {
        assert_eq!(BlockPos::new(-1, 64, 2).bottom_center(), [-0.5, 64.0, 2.5]);
    }
}
