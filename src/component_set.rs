// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ordered component sets
//!
//! A [`ComponentSet`] is a strictly ascending, duplicate-free list of
//! [`ComponentId`]s. It serves as an archetype signature and as the
//! include/exclude filter of a query. Because the ids are sorted, equality is
//! a plain sequence comparison and membership is a binary search.

use std::ops::Deref;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::component::{ComponentId, MAX_QUERY_ARITY};

/// Sorted, duplicate-free component id list
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentSet {
    ids: SmallVec<[ComponentId; MAX_QUERY_ARITY]>,
}

impl ComponentSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from ids in any order; duplicates collapse
    pub fn from_unsorted(ids: &[ComponentId]) -> Self {
        let mut ids: SmallVec<[ComponentId; MAX_QUERY_ARITY]> = SmallVec::from_slice(ids);
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// Single-element set
    pub fn single(id: ComponentId) -> Self {
        let mut ids = SmallVec::new();
        ids.push(id);
        Self { ids }
    }

    /// Ids in ascending order
    pub fn as_slice(&self) -> &[ComponentId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Position of `id` in the set, which is also the column index an
    /// archetype with this signature stores the component at
    pub fn index_of(&self, id: ComponentId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// True when every id of `other` is in `self`
    pub fn is_superset(&self, other: &[ComponentId]) -> bool {
        // Both sides sorted: one linear merge
        let mut mine = self.ids.iter();
        'outer: for id in other {
            for candidate in mine.by_ref() {
                if candidate == id {
                    continue 'outer;
                }
                if candidate > id {
                    return false;
                }
            }
            return false;
        }
        true
    }

    /// True when the two sets share at least one id
    pub fn intersects(&self, other: &[ComponentId]) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < other.len() {
            match self.ids[i].cmp(&other[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// Copy of this set with `id` added
    pub fn with(&self, id: ComponentId) -> Self {
        let mut ids = self.ids.clone();
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
        }
        Self { ids }
    }

    /// Immutable, cheaply clonable form for sharing across threads
    pub fn freeze(self) -> FrozenComponentSet {
        FrozenComponentSet {
            ids: Arc::from(self.ids.as_slice()),
        }
    }
}

impl Deref for ComponentSet {
    type Target = [ComponentId];

    fn deref(&self) -> &[ComponentId] {
        &self.ids
    }
}

impl FromIterator<ComponentId> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        let ids: SmallVec<[ComponentId; MAX_QUERY_ARITY]> = iter.into_iter().collect();
        Self::from_unsorted(&ids)
    }
}

/// Frozen component set shared by query descriptors
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrozenComponentSet {
    ids: Arc<[ComponentId]>,
}

impl FrozenComponentSet {
    pub fn empty() -> Self {
        ComponentSet::new().freeze()
    }

    pub fn as_slice(&self) -> &[ComponentId] {
        &self.ids
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }
}

impl Deref for FrozenComponentSet {
    type Target = [ComponentId];

    fn deref(&self) -> &[ComponentId] {
        &self.ids
    }
}

impl From<ComponentSet> for FrozenComponentSet {
    fn from(set: ComponentSet) -> Self {
        set.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u32]) -> Vec<ComponentId> {
        raw.iter().copied().map(ComponentId::from_raw).collect()
    }

    #[test]
    fn test_from_unsorted_sorts_and_dedups() {
        let set = ComponentSet::from_unsorted(&ids(&[9, 3, 5, 3]));
        assert_eq!(set.as_slice(), ids(&[3, 5, 9]).as_slice());
        assert_eq!(set.index_of(ComponentId::from_raw(9)), Some(2));
        assert!(!set.contains(ComponentId::from_raw(4)));
    }

    #[test]
    fn test_superset_and_intersects() {
        let set = ComponentSet::from_unsorted(&ids(&[1, 4, 6, 8]));
        assert!(set.is_superset(&ids(&[4, 8])));
        assert!(set.is_superset(&[]));
        assert!(!set.is_superset(&ids(&[4, 5])));
        assert!(!set.is_superset(&ids(&[9])));
        assert!(set.intersects(&ids(&[0, 6])));
        assert!(!set.intersects(&ids(&[0, 2, 7])));
    }

    #[test]
    fn test_with_keeps_order() {
        let set = ComponentSet::from_unsorted(&ids(&[2, 7])).with(ComponentId::from_raw(4));
        assert_eq!(set.as_slice(), ids(&[2, 4, 7]).as_slice());
        assert_eq!(set.with(ComponentId::from_raw(4)), set);
    }

    #[test]
    fn test_frozen_equality() {
        let a = ComponentSet::from_unsorted(&ids(&[3, 1])).freeze();
        let b = ComponentSet::from_unsorted(&ids(&[1, 3])).freeze();
        assert_eq!(a, b);
        assert!(a.contains(ComponentId::from_raw(3)));
    }
}
