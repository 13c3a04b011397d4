use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Unique identifier with generation tracking to prevent stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Entity identifier wrapper used across the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(pub GenerationalId);

impl EntityId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self(GenerationalId::new(index, generation))
    }

    pub fn from_index(index: u32) -> Self {
        Self::new(index as usize, 0)
    }

    pub fn index(&self) -> usize {
        self.0.index
    }

    pub fn generation(&self) -> u32 {
        self.0.generation
    }

    pub fn is_null(&self) -> bool {
        self.0.index == usize::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self(GenerationalId::new(usize::MAX, 0))
    }
}

/// Generational arena whose items stay densely packed in insertion order.
///
/// The dense position of an item (its *slot*) is what the state vector layout
/// is built from, so slots shift when an item is removed while ids stay valid.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
    ids: Vec<EntityId>,
    slots: Vec<Option<usize>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            ids: Vec::new(),
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> EntityId {
        let slot = self.items.len();
        let id = if let Some(index) = self.free_list.pop_front() {
            self.slots[index] = Some(slot);
            EntityId::new(index, self.generations[index])
        } else {
            let index = self.slots.len();
            self.slots.push(Some(slot));
            self.generations.push(0);
            EntityId::new(index, 0)
        };
        self.items.push(item);
        self.ids.push(id);
        id
    }

    /// Dense position of `id`, if it is live.
    pub fn slot_of(&self, id: EntityId) -> Option<usize> {
        if !self.is_valid(id) {
            return None;
        }
        self.slots.get(id.index()).copied().flatten()
    }

    pub fn id_at(&self, slot: usize) -> Option<EntityId> {
        self.ids.get(slot).copied()
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.slot_of(id).map(|slot| &self.items[slot])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        let slot = self.slot_of(id)?;
        self.items.get_mut(slot)
    }

    pub fn get2_mut(&mut self, id_a: EntityId, id_b: EntityId) -> Option<(&mut T, &mut T)> {
        let a = self.slot_of(id_a)?;
        let b = self.slot_of(id_b)?;
        if a == b {
            return None;
        }
        if a < b {
            let (left, right) = self.items.split_at_mut(b);
            Some((&mut left[a], &mut right[0]))
        } else {
            let (left, right) = self.items.split_at_mut(a);
            Some((&mut right[0], &mut left[b]))
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slot_of(id)?;
        let index = id.index();
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.slots[index] = None;
        self.free_list.push_back(index);

        self.ids.remove(slot);
        let item = self.items.remove(slot);
        for later in &self.ids[slot..] {
            if let Some(Some(s)) = self.slots.get_mut(later.index()) {
                *s -= 1;
            }
        }
        Some(item)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn iter_with_ids(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.ids.iter().copied().zip(self.items.iter())
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn is_valid(&self, id: EntityId) -> bool {
        self.generations
            .get(id.index())
            .is_some_and(|generation| *generation == id.generation())
    }
}
