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

//! World: central entity and archetype storage

use std::sync::Arc;

use ahash::AHashMap;
use slotmap::SlotMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ColumnFactory};
use crate::component::{component_id, Bundle, Component, ComponentId};
use crate::component_set::ComponentSet;
use crate::config::WorldConfig;
use crate::descriptor::QueryDescriptor;
use crate::entity::{EntityId, EntityLocation};
use crate::error::{EcsError, Result};
use crate::hash::{BucketHasher, SortedIds};
use crate::query::QueryTuple;
use crate::query_cache::{QueryCache, QueryCacheStats};
use crate::utils::next_id;

/// Central ECS world
///
/// Owns every archetype, the entity index, and the query cache. Each world
/// has its own cache; descriptors from one world are rejected by another.
pub struct World {
    /// Unique id, stamped into every descriptor built for this world
    id: u64,

    config: WorldConfig,

    /// Entity locations keyed by SlotMap IDs
    entity_locations: SlotMap<EntityId, EntityLocation>,

    /// All archetypes in the world, never removed
    archetypes: Vec<Archetype>,

    /// Maps component signatures to archetype indices
    archetype_index: AHashMap<ComponentSet, usize>,

    /// Canonical descriptors, one table per arity
    query_cache: QueryCache,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self::build(WorldConfig::default(), None)
    }

    /// Create a world with custom tunables
    pub fn with_config(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, None))
    }

    /// Create a world whose query cache hashes 3..=16-id combinations with
    /// `bucket_hasher`
    pub fn with_bucket_hasher(config: WorldConfig, bucket_hasher: BucketHasher) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, Some(bucket_hasher)))
    }

    fn build(config: WorldConfig, bucket_hasher: Option<BucketHasher>) -> Self {
        let id = next_id();
        let query_cache = match bucket_hasher {
            Some(hasher) => QueryCache::with_bucket_hasher(id, hasher),
            None => QueryCache::new(id),
        };

        Self {
            id,
            config,
            entity_locations: SlotMap::with_key(),
            // Start with reasonable defaults to avoid resize spikes
            archetypes: Vec::with_capacity(64),
            archetype_index: AHashMap::with_capacity(64),
            query_cache,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Spawn a new entity with the given bundle of components.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        let arch_id = self.archetype_for_bundle::<B>()?;
        Ok(self.spawn_in(arch_id, bundle))
    }

    /// Spawn many entities of the same bundle type
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> Result<Vec<EntityId>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
    {
        let arch_id = self.archetype_for_bundle::<B>()?;
        let bundles = bundles.into_iter();

        #[cfg(feature = "profiling")]
        let _span = info_span!("world.spawn_batch", archetype = arch_id).entered();

        let mut entities = Vec::with_capacity(bundles.size_hint().0);
        for bundle in bundles {
            entities.push(self.spawn_in(arch_id, bundle));
        }
        Ok(entities)
    }

    fn spawn_in<B: Bundle>(&mut self, arch_id: usize, bundle: B) -> EntityId {
        let placeholder = EntityLocation {
            archetype_id: arch_id,
            chunk_index: usize::MAX,
            row: usize::MAX,
        };
        let entity = self.entity_locations.insert(placeholder);

        let (chunk_index, row) = self.archetypes[arch_id].allocate(entity, bundle);
        if let Some(location) = self.entity_locations.get_mut(entity) {
            location.chunk_index = chunk_index;
            location.row = row;
        }
        entity
    }

    fn archetype_for_bundle<B: Bundle>(&mut self) -> Result<usize> {
        let ids = B::component_ids();
        // Rejects empty, oversized and duplicate bundles
        SortedIds::new(&ids)?;

        let signature = ComponentSet::from_unsorted(&ids);
        if let Some(&arch_id) = self.archetype_index.get(&signature) {
            return Ok(arch_id);
        }

        let mut factories = B::column_factories();
        factories.sort_unstable_by_key(|(id, _)| *id);
        let factories: Vec<ColumnFactory> =
            factories.into_iter().map(|(_, factory)| factory).collect();
        Ok(self.create_archetype(signature, factories))
    }

    fn create_archetype(&mut self, signature: ComponentSet, factories: Vec<ColumnFactory>) -> usize {
        let arch_id = self.archetypes.len();

        #[cfg(feature = "profiling")]
        tracing::debug!(arch_id, components = signature.len(), "archetype created");

        self.archetypes.push(Archetype::new(
            arch_id,
            signature.clone(),
            factories,
            self.config.chunk_capacity,
        ));
        self.archetype_index.insert(signature, arch_id);
        arch_id
    }

    /// Despawn entity immediately
    ///
    /// The archetype's last record moves into the freed row so chunks stay
    /// dense.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        let location = self
            .entity_locations
            .remove(entity)
            .ok_or(EcsError::EntityNotFound)?;

        let archetype = self
            .archetypes
            .get_mut(location.archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;
        if let Some(moved) = archetype.remove(location.chunk_index, location.row) {
            if let Some(moved_location) = self.entity_locations.get_mut(moved) {
                moved_location.chunk_index = location.chunk_index;
                moved_location.row = location.row;
            }
        }
        Ok(())
    }

    /// Check if an entity is alive
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entity_locations.contains_key(entity)
    }

    /// Get entity location
    pub fn get_entity_location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entity_locations.get(entity).copied()
    }

    /// Get immutable reference to a component on an entity
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let location = self.entity_locations.get(entity)?;
        let archetype = self.archetypes.get(location.archetype_id)?;
        let column = archetype.column_index(component_id::<T>())?;
        archetype
            .chunks()
            .get(location.chunk_index)?
            .column::<T>(column)?
            .get(location.row)
    }

    /// Get mutable reference to a component on an entity
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let location = *self.entity_locations.get(entity)?;
        let archetype = self.archetypes.get_mut(location.archetype_id)?;
        let column = archetype.column_index(component_id::<T>())?;
        archetype
            .chunks_mut()
            .get_mut(location.chunk_index)?
            .column_mut::<T>(column)?
            .get_mut(location.row)
    }

    /// Check if entity has a specific component
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.entity_locations
            .get(entity)
            .and_then(|location| self.archetypes.get(location.archetype_id))
            .is_some_and(|archetype| archetype.signature().contains(component_id::<T>()))
    }

    /// Get archetype by id
    pub fn get_archetype(&self, id: usize) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// All archetypes in creation order
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entity_locations.len()
    }

    /// Canonical descriptor for the component types of `Q`
    ///
    /// Every call with the same set of types, in any order, returns the same
    /// `Arc`.
    pub fn cached_query<Q: QueryTuple>(&self) -> Result<Arc<QueryDescriptor>> {
        self.query_cache.get_or_create(&Q::component_ids())
    }

    /// Canonical descriptor for a set of raw component ids
    pub fn cached_query_by_ids(&self, ids: &[ComponentId]) -> Result<Arc<QueryDescriptor>> {
        self.query_cache.get_or_create(ids)
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.query_cache
    }

    /// Get query cache statistics for diagnostics
    pub fn query_cache_stats(&self) -> QueryCacheStats {
        self.query_cache.stats()
    }

    /// Archetype ids matched by `descriptor`, in creation order
    pub fn matching_archetypes(&self, descriptor: &QueryDescriptor) -> Result<Arc<[usize]>> {
        if descriptor.world_id() != self.id {
            return Err(EcsError::ForeignDescriptor);
        }
        Ok(descriptor.resolve(&self.archetypes))
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(f32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(f32);

    #[test]
    fn test_spawn_despawn() -> Result<()> {
        let mut world = World::new();

        let entity = world.spawn((Position(1.0),))?;
        assert!(world.get_entity_location(entity).is_some());
        assert_eq!(world.get_component::<Position>(entity), Some(&Position(1.0)));

        world.despawn(entity)?;
        assert!(world.get_entity_location(entity).is_none());
        assert_eq!(world.despawn(entity), Err(EcsError::EntityNotFound));
        Ok(())
    }

    #[test]
    fn test_archetype_segregation() -> Result<()> {
        let mut world = World::new();

        struct A;
        struct B;
        struct C;

        world.spawn((A, B))?;
        world.spawn((B, A))?;
        world.spawn((A, C))?;
        world.spawn((B, C))?;

        assert_eq!(world.archetype_count(), 3);
        Ok(())
    }

    #[test]
    fn test_despawn_updates_moved_entity() -> Result<()> {
        let mut world = World::with_config(WorldConfig::default().with_chunk_capacity(2))?;
        let entities = world.spawn_batch((0..5).map(|i| (Position(i as f32), Velocity(0.0))))?;

        world.despawn(entities[0])?;

        // Record 4 (last chunk) now sits in chunk 0, row 0
        let location = world.get_entity_location(entities[4]).unwrap();
        assert_eq!((location.chunk_index, location.row), (0, 0));
        assert_eq!(world.get_component::<Position>(entities[4]), Some(&Position(4.0)));
        assert_eq!(world.entity_count(), 4);
        Ok(())
    }

    #[test]
    fn test_duplicate_bundle_rejected() {
        let mut world = World::new();
        let err = world.spawn((Position(0.0), Position(1.0))).unwrap_err();
        assert_eq!(err, EcsError::DuplicateComponent(component_id::<Position>()));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_component_mutation() -> Result<()> {
        let mut world = World::new();
        let e = world.spawn((Position(0.0), Velocity(2.0)))?;
        world.get_component_mut::<Position>(e).unwrap().0 += 3.0;
        assert_eq!(world.get_component::<Position>(e), Some(&Position(3.0)));
        assert!(world.has_component::<Velocity>(e));
        assert!(!world.has_component::<u8>(e));
        Ok(())
    }

    #[test]
    fn test_foreign_descriptor_rejected() {
        let world_a = World::new();
        let world_b = World::new();
        let descriptor = world_a.cached_query::<(Position,)>().unwrap();
        assert_eq!(
            world_b.matching_archetypes(&descriptor),
            Err(EcsError::ForeignDescriptor)
        );
    }
}
