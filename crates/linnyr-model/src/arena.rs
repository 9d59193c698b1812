//! A per-kind arena with stable integer indices.
//!
//! Clusters, links, and constraints form a graph with cycles (a product
//! appears in many clusters; links cross cluster boundaries), which rules
//! out owning entities by pointer/`Rc`. Every entity instead lives in a
//! `Vec` slot indexed by a small `Copy` handle; cross-entity references are
//! just another handle. Deletion tombstones the slot rather than shifting
//! indices, so a handle taken before a deletion never silently points at an
//! unrelated, later-inserted entity.

use std::marker::PhantomData;

/// A stable handle into an [`Arena<T>`]. Never reused after the slot it
/// names is removed.
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Id<T> {}
impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl<T> Eq for Id<T> {}
impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}
impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.index)
    }
}

#[derive(Default)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn insert(&mut self, value: T) -> Id<T> {
        let index = self.slots.len() as u32;
        self.slots.push(Some(value));
        Id {
            index,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.slots.get(id.index()).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        self.slots
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
    }

    /// Tombstones the slot. The `Id` remains well-formed but resolves to
    /// `None` from this point on — it is never reassigned to a new value.
    pub fn remove(&mut self, id: Id<T>) -> Option<T> {
        self.slots.get_mut(id.index()).and_then(Option::take)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|v| {
                (
                    Id {
                        index: i as u32,
                        _marker: PhantomData,
                    },
                    v,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creation order of still-live entries — the order the tableau
    /// builder relies on for deterministic row generation.
    pub fn creation_order(&self) -> impl Iterator<Item = Id<T>> + '_ {
        self.iter().map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let mut arena: Arena<&str> = Arena::new();
        let id = arena.insert("hello");
        assert_eq!(arena.get(id), Some(&"hello"));
    }

    #[test]
    fn removed_id_never_resolves_to_a_later_insert() {
        let mut arena: Arena<i32> = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        let b = arena.insert(2);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
        assert_ne!(a, b);
    }

    #[test]
    fn iteration_skips_tombstones() {
        let mut arena: Arena<i32> = Arena::new();
        let a = arena.insert(1);
        let _b = arena.insert(2);
        arena.remove(a);
        assert_eq!(arena.len(), 1);
    }
}
