use std::collections::HashMap;

use thiserror::Error;

use super::entity::{Countdown, Entity, EntityDesc, EntityId, EntityIdAllocator};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("entity name must not be empty")]
    MissingName,
    #[error("entity name '{name}' is already registered")]
    DuplicateName { name: String },
    #[error("collider on '{name}' has box percent {percent}, expected 0..=100")]
    MalformedCollider { name: String, percent: u8 },
    #[error("entity '{name}' has non-finite position ({x}, {y})")]
    NonFinitePosition { name: String, x: f32, y: f32 },
    #[error("entity '{name}' has invalid size {width}x{height}")]
    InvalidSize { name: String, width: f32, height: f32 },
}

/// Authoritative entity store with role indices kept in insertion order.
///
/// Slots are indexed by id and never reused. Deletion is two-phase: `mark_deleted`
/// only flags the entity, `flush_deletions` purges it from every index.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    allocator: EntityIdAllocator,
    slots: Vec<Option<Entity>>,
    names: HashMap<String, EntityId>,
    moveable: Vec<EntityId>,
    collidable: Vec<EntityId>,
    animated: Vec<EntityId>,
    tickable: Vec<EntityId>,
    pending_deletions: Vec<EntityId>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, desc: EntityDesc) -> Result<EntityId, RegistryError> {
        validate_desc(&desc)?;
        if self.names.contains_key(&desc.name) {
            return Err(RegistryError::DuplicateName { name: desc.name });
        }

        let id = self.allocator.allocate();
        let entity = Entity::from_desc(id, desc);
        if entity.movement.is_some() {
            self.moveable.push(id);
        }
        if entity.collider.is_some() {
            self.collidable.push(id);
        }
        if entity.animation.is_some() {
            self.animated.push(id);
        }
        if entity.countdown.is_some() {
            self.tickable.push(id);
        }
        self.names.insert(entity.name.clone(), id);

        let index = id.0 as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(entity);
        Ok(id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Live lookup; entities flagged for deletion are skipped.
    pub fn get_live(&self, id: EntityId) -> Option<&Entity> {
        self.get(id).filter(|entity| !entity.deleted)
    }

    pub fn id_by_name(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Flags the entity and queues it for removal. Returns false if unknown or already flagged.
    pub fn mark_deleted(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.get_mut(id) else {
            return false;
        };
        if entity.deleted {
            return false;
        }
        entity.deleted = true;
        self.pending_deletions.push(id);
        true
    }

    pub fn pending_deletions(&self) -> &[EntityId] {
        &self.pending_deletions
    }

    /// Purges flagged entities from the arena, the name table and every role index.
    pub fn flush_deletions(&mut self) -> Vec<Entity> {
        if self.pending_deletions.is_empty() {
            return Vec::new();
        }
        let mut pending = std::mem::take(&mut self.pending_deletions);
        pending.sort();
        pending.dedup();

        let is_pending = |id: &EntityId| pending.binary_search(id).is_ok();
        self.moveable.retain(|id| !is_pending(id));
        self.collidable.retain(|id| !is_pending(id));
        self.animated.retain(|id| !is_pending(id));
        self.tickable.retain(|id| !is_pending(id));

        let mut purged = Vec::with_capacity(pending.len());
        for id in &pending {
            if let Some(entity) = self.slots.get_mut(id.0 as usize).and_then(Option::take) {
                self.names.remove(&entity.name);
                purged.push(entity);
            }
        }
        purged
    }

    pub fn moveable_ids(&self) -> &[EntityId] {
        &self.moveable
    }

    pub fn collidable_ids(&self) -> &[EntityId] {
        &self.collidable
    }

    pub fn animated_ids(&self) -> &[EntityId] {
        &self.animated
    }

    pub fn tickable_ids(&self) -> &[EntityId] {
        &self.tickable
    }

    pub(crate) fn set_countdown(&mut self, id: EntityId, countdown: Countdown) -> bool {
        let Some(entity) = self.get_mut(id) else {
            return false;
        };
        if entity.deleted {
            return false;
        }
        let newly_tickable = entity.countdown.is_none();
        entity.countdown = Some(countdown);
        if newly_tickable {
            self.tickable.push(id);
        }
        true
    }

    pub(crate) fn clear_countdown(&mut self, id: EntityId) -> Option<Countdown> {
        let countdown = self.get_mut(id).and_then(|entity| entity.countdown.take());
        if countdown.is_some() {
            self.tickable.retain(|existing| *existing != id);
        }
        countdown
    }

    /// Number of entities still in the arena, including ones awaiting a flush.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}

fn validate_desc(desc: &EntityDesc) -> Result<(), RegistryError> {
    if desc.name.trim().is_empty() {
        return Err(RegistryError::MissingName);
    }
    if !desc.position.is_finite() {
        return Err(RegistryError::NonFinitePosition {
            name: desc.name.clone(),
            x: desc.position.x,
            y: desc.position.y,
        });
    }
    let size_ok = desc.size.width.is_finite()
        && desc.size.height.is_finite()
        && desc.size.width > 0.0
        && desc.size.height > 0.0;
    if !size_ok {
        return Err(RegistryError::InvalidSize {
            name: desc.name.clone(),
            width: desc.size.width,
            height: desc.size.height,
        });
    }
    if let Some(collider) = &desc.collider {
        if collider.percent() > 100 {
            return Err(RegistryError::MalformedCollider {
                name: desc.name.clone(),
                percent: collider.percent(),
            });
        }
    }
    Ok(())
}
