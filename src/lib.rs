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

//! Archetype query core
//!
//! Chunked archetype storage with a per-arity query descriptor cache and a
//! sequential/parallel query execution engine.
//!
//! * [`QueryCache`] maps 1..=16 component ids to one canonical, shared
//!   [`QueryDescriptor`] regardless of the order the ids are given in.
//! * [`World::execute_sequential`] and [`World::execute_parallel`] run a
//!   callback over every record of every matching archetype.
//! * Cached queries never match archetypes carrying [`Phantom`] unless the
//!   query asks for it.

pub mod archetype;
pub mod component;
pub mod component_set;
pub mod config;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod hash;
pub mod prelude;
#[cfg(feature = "profiling")]
pub mod profiling;
pub mod query;
pub mod query_cache;
pub mod utils;
pub mod world;

pub use archetype::{Archetype, Chunk, ColumnFactory, ColumnPtr, ErasedColumn, TypedColumn};
pub use component::*;
pub use component_set::{ComponentSet, FrozenComponentSet};
pub use config::WorldConfig;
pub use descriptor::{QueryBuilder, QueryDescriptor};
pub use entity::{EntityId, EntityLocation};
pub use error::*;
pub use hash::{BucketHasher, SortedIds};
pub use query::*;
pub use query_cache::{QueryCache, QueryCacheStats};
pub use world::*;
