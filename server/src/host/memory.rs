//! Headless host used by tests and offline tooling.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use crate::error::HostError;
use crate::version::HostVersion;

use super::{BlockPos, EntityId, EntityKind, HostWorld, MetaValue};

#[derive(Clone, Debug)]
struct HostEntity {
    kind: EntityKind,
    position: [f64; 3],
    yaw: f32,
    pitch: f32,
    metadata: BTreeMap<u8, MetaValue>,
}

/// A [`HostWorld`] backed by plain maps.
///
/// Behaves like a host of the revision named by its marker: block displays can
/// only be spawned when the marker parses to 1.19.4 or later.
#[derive(Debug)]
pub struct InMemoryHost {
    marker: String,
    version: Option<HostVersion>,
    next_id: Cell<u32>,
    entities: RefCell<HashMap<EntityId, HostEntity>>,
    blocks: RefCell<HashMap<BlockPos, String>>,
    teleports: Cell<u64>,
}

impl InMemoryHost {
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        let version = HostVersion::parse_marker(&marker);
        Self {
            marker,
            version,
            next_id: Cell::new(1),
            entities: RefCell::new(HashMap::new()),
            blocks: RefCell::new(HashMap::new()),
            teleports: Cell::new(0),
        }
    }

    pub fn set_block(&self, pos: BlockPos, name: impl Into<String>) {
        self.blocks.borrow_mut().insert(pos, name.into());
    }

    pub fn clear_block(&self, pos: BlockPos) {
        self.blocks.borrow_mut().remove(&pos);
    }

    pub fn entity_count(&self) -> usize {
        self.entities.borrow().len()
    }

    pub fn entity_kind(&self, id: EntityId) -> Option<EntityKind> {
        self.entities.borrow().get(&id).map(|e| e.kind)
    }

    pub fn entity_yaw_pitch(&self, id: EntityId) -> Option<(f32, f32)> {
        self.entities.borrow().get(&id).map(|e| (e.yaw, e.pitch))
    }

    /// Total number of successful teleports; lets tests observe pushes.
    pub fn teleport_count(&self) -> u64 {
        self.teleports.get()
    }

    /// Move an entity the way a player or another plugin would, bypassing the engine.
    pub fn move_entity(&self, id: EntityId, position: [f64; 3]) -> bool {
        match self.entities.borrow_mut().get_mut(&id) {
            Some(e) => {
                e.position = position;
                true
            }
            None => false,
        }
    }

    fn supports(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::ArmorStand => true,
            EntityKind::BlockDisplay => self
                .version
                .is_some_and(|v| v.is_at_least(1, 19, 4)),
        }
    }
}

impl HostWorld for InMemoryHost {
    fn version_marker(&self) -> String {
        self.marker.clone()
    }

    fn spawn_entity(&self, kind: EntityKind, position: [f64; 3]) -> Result<EntityId, HostError> {
        if !self.supports(kind) {
            return Err(HostError::UnsupportedEntityKind(kind));
        }
        if position.iter().any(|c| !c.is_finite()) {
            return Err(HostError::Rejected(format!(
                "non-finite spawn position {position:?}"
            )));
        }
        let id = EntityId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entities.borrow_mut().insert(
            id,
            HostEntity {
                kind,
                position,
                yaw: 0.0,
                pitch: 0.0,
                metadata: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn remove_entity(&self, id: EntityId) -> bool {
        self.entities.borrow_mut().remove(&id).is_some()
    }

    fn is_entity_valid(&self, id: EntityId) -> bool {
        self.entities.borrow().contains_key(&id)
    }

    fn entity_position(&self, id: EntityId) -> Option<[f64; 3]> {
        self.entities.borrow().get(&id).map(|e| e.position)
    }

    fn teleport_entity(&self, id: EntityId, position: [f64; 3], yaw: f32, pitch: f32) -> bool {
        let mut entities = self.entities.borrow_mut();
        let Some(e) = entities.get_mut(&id) else {
            return false;
        };
        e.position = position;
        e.yaw = yaw;
        e.pitch = pitch;
        self.teleports.set(self.teleports.get() + 1);
        true
    }

    fn write_metadata(&self, id: EntityId, slot: u8, value: MetaValue) -> bool {
        match self.entities.borrow_mut().get_mut(&id) {
            Some(e) => {
                e.metadata.insert(slot, value);
                true
            }
            None => false,
        }
    }

    fn read_metadata(&self, id: EntityId, slot: u8) -> Option<MetaValue> {
        self.entities
            .borrow()
            .get(&id)
            .and_then(|e| e.metadata.get(&slot).cloned())
    }

    fn block_at(&self, pos: BlockPos) -> Option<String> {
        Some(
            self.blocks
                .borrow()
                .get(&pos)
                .cloned()
                .unwrap_or_else(|| "minecraft:air".to_string()),
        )
    }
}
