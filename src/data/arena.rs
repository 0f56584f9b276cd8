//! Generational arena, in the spirit of the generational-arena crate.
//!
//! Iteration always follows slot order, so two arenas that received the same sequence of
//! insertions and removals iterate identically.

use std::mem;
use std::ops;

/// The `Arena` allows inserting and removing elements that are referred to by `Index`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Arena<T> {
    items: Vec<Entry<T>>,
    generation: u32,
    free_list_head: Option<u32>,
    len: usize,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
enum Entry<T> {
    Free { next_free: Option<u32> },
    Occupied { generation: u32, value: T },
}

/// An index (and generation) into an `Arena`.
///
/// An index becomes stale once its element is removed: the slot may be reused, but with a
/// different generation, so the stale index never aliases the new element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Index {
    index: u32,
    generation: u32,
}

impl Index {
    /// Create a new `Index` from its raw parts.
    ///
    /// The parts must have been returned from an earlier call to `into_raw_parts`.
    pub fn from_raw_parts(index: u32, generation: u32) -> Index {
        Index { index, generation }
    }

    /// Convert this `Index` into its raw parts.
    pub fn into_raw_parts(self) -> (u32, u32) {
        (self.index, self.generation)
    }

    /// An index that never points to a valid element.
    pub fn invalid() -> Index {
        Self::from_raw_parts(crate::INVALID_U32, crate::INVALID_U32)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena::new()
    }
}

impl<T> Arena<T> {
    /// Constructs a new, empty `Arena`.
    pub fn new() -> Arena<T> {
        Arena {
            items: Vec::new(),
            generation: 0,
            free_list_head: None,
            len: 0,
        }
    }

    /// Inserts `value` into the arena, allocating more capacity if necessary.
    pub fn insert(&mut self, value: T) -> Index {
        let generation = self.generation;

        match self.free_list_head {
            Some(i) => {
                let slot = &mut self.items[i as usize];
                let next_free = match slot {
                    Entry::Free { next_free } => *next_free,
                    Entry::Occupied { .. } => unreachable!("corrupt free list"),
                };
                *slot = Entry::Occupied { generation, value };
                self.free_list_head = next_free;
                self.len += 1;
                Index::from_raw_parts(i, generation)
            }
            None => {
                let i = self.items.len() as u32;
                self.items.push(Entry::Occupied { generation, value });
                self.len += 1;
                Index::from_raw_parts(i, generation)
            }
        }
    }

    /// Removes the element at index `i` from the arena.
    ///
    /// Returns `None` if `i` is stale or was never returned by this arena.
    pub fn remove(&mut self, i: Index) -> Option<T> {
        match self.items.get(i.index as usize) {
            Some(Entry::Occupied { generation, .. }) if *generation == i.generation => {}
            _ => return None,
        }

        let entry = mem::replace(
            &mut self.items[i.index as usize],
            Entry::Free {
                next_free: self.free_list_head,
            },
        );
        self.generation = self.generation.wrapping_add(1);
        self.free_list_head = Some(i.index);
        self.len -= 1;

        match entry {
            Entry::Occupied { value, .. } => Some(value),
            Entry::Free { .. } => None,
        }
    }

    /// Is the element at index `i` in the arena?
    pub fn contains(&self, i: Index) -> bool {
        self.get(i).is_some()
    }

    /// Get a shared reference to the element at index `i` if it is in the arena.
    pub fn get(&self, i: Index) -> Option<&T> {
        match self.items.get(i.index as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == i.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Get an exclusive reference to the element at index `i` if it is in the arena.
    pub fn get_mut(&mut self, i: Index) -> Option<&mut T> {
        match self.items.get_mut(i.index as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == i.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// The number of elements in the arena.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the arena empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over the elements of the arena, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Entry::Occupied { generation, value } => {
                    Some((Index::from_raw_parts(i as u32, *generation), value))
                }
                Entry::Free { .. } => None,
            })
    }

    /// Iterates mutably over the elements of the arena, in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Entry::Occupied { generation, value } => {
                    Some((Index::from_raw_parts(i as u32, *generation), value))
                }
                Entry::Free { .. } => None,
            })
    }
}

impl<T> ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &Self::Output {
        self.get(index).expect("No element at index")
    }
}

impl<T> ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut Self::Output {
        self.get_mut(index).expect("No element at index")
    }
}

#[cfg(test)]
mod test {
    use super::{Arena, Index};

    #[test]
    fn stale_index_does_not_alias() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.remove(a), Some(1));
        assert_eq!(arena.remove(a), None);

        // The slot of `a` is reused with a new generation.
        let c = arena.insert(3);
        assert_eq!(c.into_raw_parts().0, a.into_raw_parts().0);
        assert_ne!(c, a);
        assert!(arena.get(a).is_none());
        assert_eq!(arena[c], 3);
        assert_eq!(arena[b], 2);
        assert_eq!(arena.len(), 2);
        assert!(!arena.contains(Index::invalid()));
    }

    #[test]
    fn iteration_follows_slot_order() {
        let mut arena = Arena::new();
        let handles: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
        let _ = arena.remove(handles[1]);
        let _ = arena.remove(handles[3]);
        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 4]);

        for (_, v) in arena.iter_mut() {
            *v *= 10;
        }
        assert_eq!(arena[handles[4]], 40);
    }
}
