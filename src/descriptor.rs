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

//! Query descriptors
//!
//! A [`QueryDescriptor`] is an immutable archetype filter bound to one world:
//!
//! * `include`: every id must be in the archetype signature
//! * `exclude`: no id may be in the signature
//! * `any_of`: for each set, at least one id must be in the signature
//!
//! The list of matching archetypes is resolved lazily and cached inside the
//! descriptor. Archetypes are never removed from a world, so the cache only
//! has to scan archetypes created since the last resolution.

use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::archetype::Archetype;
use crate::component::{component_id, Component, ComponentId, MAX_QUERY_ARITY};
use crate::component_set::{ComponentSet, FrozenComponentSet};
use crate::world::World;

#[derive(Debug)]
struct MatchCache {
    /// Number of world archetypes already checked
    seen_archetypes: usize,
    /// Shared snapshot; replaced only when new archetypes match
    matches: Arc<[usize]>,
}

impl Default for MatchCache {
    fn default() -> Self {
        Self {
            seen_archetypes: 0,
            matches: Arc::from(Vec::new()),
        }
    }
}

/// Canonical archetype filter with a lazily built match list
#[derive(Debug)]
pub struct QueryDescriptor {
    world_id: u64,
    include: FrozenComponentSet,
    exclude: FrozenComponentSet,
    any_of: Vec<FrozenComponentSet>,
    matches: RwLock<MatchCache>,
}

impl QueryDescriptor {
    pub(crate) fn new(
        world_id: u64,
        include: FrozenComponentSet,
        exclude: FrozenComponentSet,
        any_of: Vec<FrozenComponentSet>,
    ) -> Self {
        Self {
            world_id,
            include,
            exclude,
            any_of,
            matches: RwLock::new(MatchCache::default()),
        }
    }

    /// Start an explicit (uncached) descriptor
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// Id of the world this descriptor was built for
    pub fn world_id(&self) -> u64 {
        self.world_id
    }

    pub fn include(&self) -> &[ComponentId] {
        &self.include
    }

    pub fn exclude(&self) -> &[ComponentId] {
        &self.exclude
    }

    pub fn any_of(&self) -> &[FrozenComponentSet] {
        &self.any_of
    }

    /// True when both descriptors filter exactly the same archetypes
    pub fn same_filter(&self, other: &QueryDescriptor) -> bool {
        self.include == other.include
            && self.exclude == other.exclude
            && self.any_of == other.any_of
    }

    /// Check a single archetype signature against the filter
    pub fn matches_signature(&self, signature: &ComponentSet) -> bool {
        signature.is_superset(&self.include)
            && !signature.intersects(&self.exclude)
            && self.any_of.iter().all(|set| signature.intersects(set))
    }

    /// Matching archetype ids, scanning only archetypes not seen before.
    ///
    /// Returns a shared snapshot; when no archetype was added since the last
    /// call this is the same allocation.
    pub(crate) fn resolve(&self, archetypes: &[Archetype]) -> Arc<[usize]> {
        {
            let cache = self.matches.read();
            if cache.seen_archetypes == archetypes.len() {
                return Arc::clone(&cache.matches);
            }
        }

        let mut cache = self.matches.write();
        // Another thread may have caught up while we waited for the lock
        if cache.seen_archetypes < archetypes.len() {
            let added: Vec<usize> = archetypes[cache.seen_archetypes..]
                .iter()
                .filter(|archetype| self.matches_signature(archetype.signature()))
                .map(Archetype::id)
                .collect();
            if !added.is_empty() {
                cache.matches = cache.matches.iter().copied().chain(added).collect();
            }
            cache.seen_archetypes = archetypes.len();
        }
        Arc::clone(&cache.matches)
    }

    /// Number of archetypes matched as of the last resolution
    pub fn cached_match_count(&self) -> usize {
        self.matches.read().matches.len()
    }
}

/// Builder for explicit query descriptors
///
/// Unlike cached queries, a built descriptor applies no implicit
/// [`Phantom`](crate::Phantom) exclusion; add `.without::<Phantom>()` when
/// needed.
#[derive(Debug, Default, Clone)]
pub struct QueryBuilder {
    include: SmallVec<[ComponentId; MAX_QUERY_ARITY]>,
    exclude: SmallVec<[ComponentId; MAX_QUERY_ARITY]>,
    any_of: Vec<ComponentSet>,
}

impl QueryBuilder {
    /// Require component `T`
    pub fn with<T: Component>(mut self) -> Self {
        self.include.push(component_id::<T>());
        self
    }

    /// Reject archetypes carrying component `T`
    pub fn without<T: Component>(mut self) -> Self {
        self.exclude.push(component_id::<T>());
        self
    }

    pub fn include_ids(mut self, ids: &[ComponentId]) -> Self {
        self.include.extend_from_slice(ids);
        self
    }

    pub fn exclude_ids(mut self, ids: &[ComponentId]) -> Self {
        self.exclude.extend_from_slice(ids);
        self
    }

    /// Require at least one of `ids`. An empty group is ignored.
    pub fn any_of_ids(mut self, ids: &[ComponentId]) -> Self {
        if !ids.is_empty() {
            self.any_of.push(ComponentSet::from_unsorted(ids));
        }
        self
    }

    /// Bind the filter to `world`
    pub fn build(self, world: &World) -> Arc<QueryDescriptor> {
        let mut any_of = self.any_of;
        any_of.sort();
        any_of.dedup();
        Arc::new(QueryDescriptor::new(
            world.id(),
            ComponentSet::from_unsorted(&self.include).freeze(),
            ComponentSet::from_unsorted(&self.exclude).freeze(),
            any_of.into_iter().map(ComponentSet::freeze).collect(),
        ))
    }
}
