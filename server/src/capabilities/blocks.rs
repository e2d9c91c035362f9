//! Block identity to collision shape.
//!
//! Block names changed across releases (`grass_path` became `dirt_path` in
//! 1.17, `grass` became `short_grass` in 1.20.3), so the table is keyed by the
//! naming era of the running host. Names from another era are not recognised
//! and fall through to the full-cube default, the same as any unknown block.
//!
//! Block proxies are read-only: the host owns them, bodies bound to a block
//! follow it (`HostDrivesPhysics`) and are placed with the shape's bottom face
//! on the block's bottom face.

use shared::{Quat, ShapeDescriptor, Transform};

use crate::error::HostError;
use crate::host::{BlockPos, HostProxyKey, HostWorld};
use crate::version::HostVersion;

/// Era-dependent block names.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockNaming {
    pub path: &'static str,
    pub short_grass: &'static str,
}

impl BlockNaming {
    pub fn for_version(version: &HostVersion) -> Self {
        Self {
            path: if version.is_at_least(1, 17, 0) {
                "dirt_path"
            } else {
                "grass_path"
            },
            short_grass: if version.is_at_least(1, 20, 3) {
                "short_grass"
            } else {
                "grass"
            },
        }
    }
}

/// Blocks with no collision box.
const PASSABLE: &[&str] = &[
    "air",
    "cave_air",
    "void_air",
    "water",
    "lava",
    "tall_grass",
    "fern",
    "large_fern",
    "dead_bush",
    "dandelion",
    "poppy",
    "torch",
    "wall_torch",
    "redstone_wire",
    "rail",
];

/// Height of a path block (15/16 of a block).
const PATH_HEIGHT: f32 = 15.0 / 16.0;
const CARPET_HEIGHT: f32 = 1.0 / 16.0;

/// Collision shape for a namespaced block name, or `None` for passable blocks.
pub fn shape_for_name(name: &str, naming: &BlockNaming) -> Option<ShapeDescriptor> {
    let id = name.strip_prefix("minecraft:").unwrap_or(name);

    if PASSABLE.contains(&id) || id == naming.short_grass {
        return None;
    }
    if id == naming.path || id == "farmland" {
        return Some(ShapeDescriptor::slab(PATH_HEIGHT));
    }
    if id.ends_with("_slab") {
        return Some(ShapeDescriptor::slab(0.5));
    }
    if id.ends_with("_carpet") {
        return Some(ShapeDescriptor::slab(CARPET_HEIGHT));
    }
    Some(ShapeDescriptor::unit_block())
}

/// Block-proxy half of every strategy.
#[derive(Copy, Clone, Debug)]
pub struct BlockProxies {
    naming: BlockNaming,
}

impl BlockProxies {
    pub fn new(version: &HostVersion) -> Self {
        Self {
            naming: BlockNaming::for_version(version),
        }
    }

    pub fn naming(&self) -> BlockNaming {
        self.naming
    }

    pub fn shape(&self, host: &dyn HostWorld, pos: BlockPos) -> Option<ShapeDescriptor> {
        shape_for_name(&host.block_at(pos)?, &self.naming)
    }

    pub fn is_valid(&self, host: &dyn HostWorld, pos: BlockPos) -> bool {
        self.shape(host, pos).is_some()
    }

    pub fn read_transform(&self, host: &dyn HostWorld, pos: BlockPos) -> Result<Transform, HostError> {
        let shape = self
            .shape(host, pos)
            .ok_or(HostError::ProxyInvalid(HostProxyKey::Block(pos)))?;
        let mut at = pos.bottom_center();
        at[1] += shape.bounding_half_extents().y as f64;
        Ok(Transform::from_position_f64(at, Quat::identity()))
    }
}
