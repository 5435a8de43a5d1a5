//! [`EntityWorld`]: entity id allocation plus a type-indexed, sparse
//! component store.
//!
//! This is a minimal, host-engine-agnostic store — not the host's own ECS.
//! The core addresses components by `(EntityId, TypeId)` and guarantees that
//! destroying an entity removes every component keyed to it before the id
//! returns to the free pool.

use std::any::{Any, TypeId};
use std::collections::HashMap;

pub type EntityId = u32;

/// Sparse, type-erased component storage for a single component type.
/// Kept as a trait object so `EntityWorld` can hold heterogeneous component
/// maps in one `HashMap<TypeId, _>`.
trait ComponentColumn: Any {
    fn remove_any(&mut self, entity: EntityId) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedColumn<T> {
    // Sparse by EntityId; a dense Vec<Option<T>> indexed by id keeps
    // `for_each` allocation-free (no separate index Vec to build).
    slots: Vec<Option<T>>,
}

impl<T> Default for TypedColumn<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T: 'static> ComponentColumn for TypedColumn<T> {
    fn remove_any(&mut self, entity: EntityId) -> bool {
        match self.slots.get_mut(entity as usize) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: 'static> TypedColumn<T> {
    fn ensure_len(&mut self, entity: EntityId) {
        let needed = entity as usize + 1;
        if self.slots.len() < needed {
            self.slots.resize_with(needed, || None);
        }
    }

    fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        self.ensure_len(entity);
        self.slots[entity as usize].replace(value)
    }

    fn get(&self, entity: EntityId) -> Option<&T> {
        self.slots.get(entity as usize).and_then(|s| s.as_ref())
    }

    fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.slots.get_mut(entity as usize).and_then(|s| s.as_mut())
    }
}

/// Entity id allocator plus `(EntityId, Type) -> Component` store.
#[derive(Default)]
pub struct EntityWorld {
    next_id: EntityId,
    free_ids: Vec<EntityId>,
    alive: Vec<bool>,
    columns: HashMap<TypeId, Box<dyn ComponentColumn>>,
}

impl EntityWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh or reused entity id.
    pub fn spawn_entity(&mut self) -> EntityId {
        if let Some(id) = self.free_ids.pop() {
            self.alive[id as usize] = true;
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.alive.push(true);
        id
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.alive.get(entity as usize).copied().unwrap_or(false)
    }

    /// Remove every component for `entity`, then return the id to the free
    /// pool. The id may be reused by a later `spawn_entity`.
    pub fn despawn_entity(&mut self, entity: EntityId) {
        if !self.is_alive(entity) {
            return;
        }
        for column in self.columns.values_mut() {
            column.remove_any(entity);
        }
        self.alive[entity as usize] = false;
        self.free_ids.push(entity);
    }

    fn column_mut<T: 'static>(&mut self) -> &mut TypedColumn<T> {
        self.columns
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(TypedColumn::<T>::default()))
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .expect("component column type mismatch")
    }

    fn column<T: 'static>(&self) -> Option<&TypedColumn<T>> {
        self.columns
            .get(&TypeId::of::<T>())
            .map(|c| c.as_any().downcast_ref::<TypedColumn<T>>().expect("component column type mismatch"))
    }

    pub fn set_component<T: 'static>(&mut self, entity: EntityId, value: T) -> Option<T> {
        self.column_mut::<T>().insert(entity, value)
    }

    pub fn get_component<T: 'static>(&self, entity: EntityId) -> Option<&T> {
        self.column::<T>().and_then(|c| c.get(entity))
    }

    pub fn get_component_mut<T: 'static>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.column_mut::<T>().get_mut(entity)
    }

    pub fn remove_component<T: 'static>(&mut self, entity: EntityId) -> bool {
        self.column_mut::<T>().slots.get_mut(entity as usize).and_then(|s| s.take()).is_some()
    }

    /// Allocation-free traversal: visits every live `(EntityId, &mut T)`
    /// pair without building an intermediate collection.
    pub fn for_each<T: 'static>(&mut self, mut f: impl FnMut(EntityId, &mut T)) {
        let column = self.column_mut::<T>();
        for (idx, slot) in column.slots.iter_mut().enumerate() {
            if let Some(value) = slot {
                f(idx as EntityId, value);
            }
        }
    }

    /// Snapshot view for code paths that mutate the world while iterating
    /// (allocation allowed, unlike `for_each`).
    pub fn view<T: Clone + 'static>(&self) -> Vec<(EntityId, T)> {
        match self.column::<T>() {
            Some(column) => column
                .slots
                .iter()
                .enumerate()
                .filter_map(|(idx, slot)| slot.as_ref().map(|v| (idx as EntityId, v.clone())))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }

    pub fn component_count<T: 'static>(&self) -> usize {
        self.column::<T>().map_or(0, |c| c.len())
    }

    /// Drop all entities and components.
    pub fn reset(&mut self) {
        self.next_id = 0;
        self.free_ids.clear();
        self.alive.clear();
        self.columns.clear();
    }
}
