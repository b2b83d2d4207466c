use indexmap::IndexMap;
use std::hash::Hash;

/// Result of [`Registry::upsert`], carries the entity position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Upsert {
    Inserted(usize),
    Updated(usize),
}

impl Upsert {
    pub fn position(self) -> usize {
        match self {
            Upsert::Inserted(pos) | Upsert::Updated(pos) => pos,
        }
    }
}

/// Handle indexed, insertion ordered store.
///
/// Registry is append-only: entities are never removed or reordered, an update for a known
/// handle rewrites the entity at its original position. Positions are therefore stable
/// for the whole registry lifetime and may be cached by consumers.
#[derive(Clone, Debug)]
pub struct Registry<H, E> {
    entries: IndexMap<H, E>,
}

impl<H, E> Default for Registry<H, E> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<H: Copy + Eq + Hash, E> Registry<H, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity if handle is new, else replace entity in place.
    pub fn upsert(&mut self, handle: H, entity: E) -> Upsert {
        match self.entries.get_full_mut(&handle) {
            Some((pos, _, existing)) => {
                *existing = entity;
                Upsert::Updated(pos)
            }
            None => {
                let (pos, _) = self.entries.insert_full(handle, entity);
                Upsert::Inserted(pos)
            }
        }
    }

    /// Mutate an entity in place. Return [`None`] if handle is unknown.
    pub fn update_with<R>(&mut self, handle: &H, f: impl FnOnce(&mut E) -> R) -> Option<R> {
        self.entries.get_mut(handle).map(f)
    }

    pub fn get(&self, handle: &H) -> Option<&E> {
        self.entries.get(handle)
    }

    pub fn get_mut(&mut self, handle: &H) -> Option<&mut E> {
        self.entries.get_mut(handle)
    }

    pub fn get_index(&self, pos: usize) -> Option<&E> {
        self.entries.get_index(pos).map(|(_, e)| e)
    }

    pub fn position(&self, handle: &H) -> Option<usize> {
        self.entries.get_index_of(handle)
    }

    pub fn contains(&self, handle: &H) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = H> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }
}

impl<H: Copy + Eq + Hash, E: Clone> Registry<H, E> {
    /// Point-in-time copy of all entities in registry order.
    pub fn snapshot(&self) -> Vec<E> {
        self.entries.values().cloned().collect()
    }
}
