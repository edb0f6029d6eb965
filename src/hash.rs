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

//! Order-independent keys for component combinations
//!
//! Keys never allocate: ids are copied into a fixed stack buffer sized to
//! [`MAX_QUERY_ARITY`] and sorted in place.

use std::hash::{BuildHasher, Hasher};

use crate::component::{ComponentId, MAX_QUERY_ARITY};
use crate::error::{EcsError, Result};

/// Seed for the bucket hash. Keys are deterministic within a build.
pub const BUCKET_HASH_SEED: u64 = 42;

/// Hash over a sorted id list, used as the bucket key for arity 3..=16
pub type BucketHasher = fn(&[ComponentId]) -> u64;

/// Sorted copy of a component combination held on the stack
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SortedIds {
    len: u8,
    ids: [ComponentId; MAX_QUERY_ARITY],
}

impl SortedIds {
    /// Copy and sort `ids`.
    ///
    /// Fails on an empty list, on more than [`MAX_QUERY_ARITY`] ids, and on
    /// duplicates.
    pub fn new(ids: &[ComponentId]) -> Result<Self> {
        if ids.is_empty() || ids.len() > MAX_QUERY_ARITY {
            return Err(EcsError::UnsupportedArity {
                requested: ids.len(),
                max: MAX_QUERY_ARITY,
            });
        }

        let mut buffer = [ComponentId::PHANTOM; MAX_QUERY_ARITY];
        buffer[..ids.len()].copy_from_slice(ids);
        let sorted = &mut buffer[..ids.len()];
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(EcsError::DuplicateComponent(pair[0]));
        }

        Ok(Self {
            len: ids.len() as u8,
            ids: buffer,
        })
    }

    pub fn as_slice(&self) -> &[ComponentId] {
        &self.ids[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for SortedIds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Pack two ids into one order-independent key: low half min, high half max
#[inline]
pub fn pack_pair(a: ComponentId, b: ComponentId) -> u64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (lo.raw() as u64) | ((hi.raw() as u64) << 32)
}

/// Default bucket hash: seeded ahash over the little-endian bytes of the
/// sorted ids
pub fn default_bucket_hash(sorted: &[ComponentId]) -> u64 {
    debug_assert!(sorted.windows(2).all(|w| w[0] < w[1]));

    let mut bytes = [0u8; MAX_QUERY_ARITY * 4];
    let used = sorted.len().min(MAX_QUERY_ARITY) * 4;
    for (chunk, id) in bytes[..used].chunks_exact_mut(4).zip(sorted) {
        chunk.copy_from_slice(&id.raw().to_le_bytes());
    }

    let state = ahash::RandomState::with_seeds(
        BUCKET_HASH_SEED,
        BUCKET_HASH_SEED,
        BUCKET_HASH_SEED,
        BUCKET_HASH_SEED,
    );
    let mut hasher = state.build_hasher();
    hasher.write(&bytes[..used]);
    hasher.finish()
}
