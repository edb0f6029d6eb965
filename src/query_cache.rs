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

//! Canonical query cache
//!
//! Maps an unordered combination of 1..=16 component ids to the one shared
//! [`QueryDescriptor`] for that combination.
//!
//! The cache is split into one table per arity, each behind its own
//! `RwLock`, so lookups of different arities never contend. Keys:
//!
//! * arity 1: the raw id
//! * arity 2: `min | max << 32`
//! * arity 3..=16: seeded 64-bit hash of the sorted ids. Different sets may
//!   share a hash, so every bucket keeps the sorted ids next to the
//!   descriptor and lookups compare them element by element.
//!
//! A miss builds the descriptor without holding any lock, then re-checks the
//! table under the write lock. If another thread inserted the same
//! combination in the meantime, the freshly built descriptor is dropped and
//! the existing one is returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{ComponentId, MAX_QUERY_ARITY};
use crate::component_set::{ComponentSet, FrozenComponentSet};
use crate::descriptor::QueryDescriptor;
use crate::error::Result;
use crate::hash::{default_bucket_hash, pack_pair, BucketHasher, SortedIds};

struct CacheEntry {
    ids: SortedIds,
    descriptor: Arc<QueryDescriptor>,
}

#[derive(Default)]
struct ArityTable {
    buckets: FxHashMap<u64, SmallVec<[CacheEntry; 1]>>,
    entries: usize,
}

impl ArityTable {
    fn find(&self, key: u64, ids: &SortedIds) -> Option<Arc<QueryDescriptor>> {
        self.buckets
            .get(&key)?
            .iter()
            .find(|entry| entry.ids.as_slice() == ids.as_slice())
            .map(|entry| Arc::clone(&entry.descriptor))
    }

    fn insert(&mut self, key: u64, entry: CacheEntry) {
        self.buckets.entry(key).or_default().push(entry);
        self.entries += 1;
    }

    fn largest_bucket(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.len()).max().unwrap_or(0)
    }
}

/// Per-world cache of canonical query descriptors
pub struct QueryCache {
    world_id: u64,
    /// `tables[k - 1]` holds combinations of `k` ids
    tables: [RwLock<ArityTable>; MAX_QUERY_ARITY],
    bucket_hasher: BucketHasher,
    hits: AtomicU64,
    misses: AtomicU64,
    inserted: AtomicU64,
    discarded: AtomicU64,
}

impl QueryCache {
    /// Create an empty cache for the world with id `world_id`
    pub fn new(world_id: u64) -> Self {
        Self::with_bucket_hasher(world_id, default_bucket_hash)
    }

    /// Create a cache using `bucket_hasher` for arities 3..=16
    pub fn with_bucket_hasher(world_id: u64, bucket_hasher: BucketHasher) -> Self {
        Self {
            world_id,
            tables: std::array::from_fn(|_| RwLock::new(ArityTable::default())),
            bucket_hasher,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Get the canonical descriptor for `ids`, creating it on first use.
    ///
    /// `ids` may be in any order. Fails with
    /// [`EcsError::UnsupportedArity`](crate::EcsError::UnsupportedArity) for
    /// zero or more than 16 ids and with
    /// [`EcsError::DuplicateComponent`](crate::EcsError::DuplicateComponent)
    /// when an id repeats.
    pub fn get_or_create(&self, ids: &[ComponentId]) -> Result<Arc<QueryDescriptor>> {
        let sorted = SortedIds::new(ids)?;
        let key = self.key_for(&sorted);
        let table = &self.tables[sorted.len() - 1];

        if let Some(descriptor) = table.read().find(key, &sorted) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(descriptor);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "profiling")]
        let _span = info_span!("query_cache.miss", arity = sorted.len(), key).entered();

        // Built unlocked; may be thrown away if another thread wins the insert
        let tentative = Arc::new(self.build_descriptor(&sorted));

        let mut table = table.write();
        if let Some(existing) = table.find(key, &sorted) {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "profiling")]
            tracing::debug!(ids = ?sorted, "query cache insert lost race, reusing winner");
            return Ok(existing);
        }

        table.insert(
            key,
            CacheEntry {
                ids: sorted,
                descriptor: Arc::clone(&tentative),
            },
        );
        self.inserted.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "profiling")]
        tracing::debug!(ids = ?sorted, key, "query cache entry inserted");

        Ok(tentative)
    }

    /// Look up without creating
    pub fn get(&self, ids: &[ComponentId]) -> Result<Option<Arc<QueryDescriptor>>> {
        let sorted = SortedIds::new(ids)?;
        let key = self.key_for(&sorted);
        Ok(self.tables[sorted.len() - 1].read().find(key, &sorted))
    }

    /// Number of cached combinations with exactly `arity` ids
    pub fn len_for_arity(&self, arity: usize) -> usize {
        match arity {
            1..=MAX_QUERY_ARITY => self.tables[arity - 1].read().entries,
            _ => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tables.iter().map(|table| table.read().entries).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of cache counters
    pub fn stats(&self) -> QueryCacheStats {
        let mut entries_by_arity = [0usize; MAX_QUERY_ARITY];
        let mut largest_bucket = 0;
        for (slot, table) in entries_by_arity.iter_mut().zip(&self.tables) {
            let table = table.read();
            *slot = table.entries;
            largest_bucket = largest_bucket.max(table.largest_bucket());
        }

        QueryCacheStats {
            entries_by_arity,
            total_entries: entries_by_arity.iter().sum(),
            largest_bucket,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn key_for(&self, sorted: &SortedIds) -> u64 {
        let ids = sorted.as_slice();
        match ids {
            [single] => single.raw() as u64,
            [a, b] => pack_pair(*a, *b),
            _ => (self.bucket_hasher)(ids),
        }
    }

    /// Cached queries skip Phantom records unless Phantom is requested
    fn build_descriptor(&self, sorted: &SortedIds) -> QueryDescriptor {
        let include = ComponentSet::from_unsorted(sorted.as_slice());
        let exclude = if include.contains(ComponentId::PHANTOM) {
            FrozenComponentSet::empty()
        } else {
            ComponentSet::single(ComponentId::PHANTOM).freeze()
        };
        QueryDescriptor::new(self.world_id, include.freeze(), exclude, Vec::new())
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("world_id", &self.world_id)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about the query cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCacheStats {
    /// `entries_by_arity[k - 1]` is the number of cached `k`-id combinations
    pub entries_by_arity: [usize; MAX_QUERY_ARITY],
    /// Number of cached combinations across all arities
    pub total_entries: usize,
    /// Longest bucket in any table; above 1 only after a hash collision
    pub largest_bucket: usize,
    /// Lookups answered from the table
    pub hits: u64,
    /// Lookups that had to build a descriptor
    pub misses: u64,
    /// Descriptors that became canonical
    pub inserted: u64,
    /// Descriptors built on a miss but dropped because another thread
    /// inserted the same combination first
    pub discarded: u64,
}
