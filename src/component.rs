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

//! Component identity and Bundle traits
//!
//! Every component type gets a small process-wide [`ComponentId`] the first time
//! it is referenced. Bundles group multiple components for spawning.

use std::any::TypeId;
use std::fmt;
use std::sync::OnceLock;

use ahash::AHashMap;
use parking_lot::RwLock;
use smallvec::{smallvec, SmallVec};

use crate::archetype::{Chunk, ColumnFactory, TypedColumn};
use crate::component_set::ComponentSet;

/// Maximum number of component types in one query or bundle
pub const MAX_QUERY_ARITY: usize = 16;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// Reserved marker for logically deleted or reservation-only records.
///
/// Cached queries skip records carrying `Phantom` unless `Phantom` is one of
/// the requested types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Phantom;

/// Process-wide component type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Id permanently assigned to [`Phantom`]
    pub const PHANTOM: ComponentId = ComponentId(0);

    /// Build an id from its raw value.
    ///
    /// Useful for filters over ids that have no Rust type behind them; ids
    /// obtained this way only match storage if a registered type owns them.
    pub const fn from_raw(raw: u32) -> Self {
        ComponentId(raw)
    }

    /// Raw integer value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Registry {
    ids: AHashMap<TypeId, ComponentId>,
    names: Vec<&'static str>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut ids = AHashMap::with_capacity(64);
        ids.insert(TypeId::of::<Phantom>(), ComponentId::PHANTOM);
        RwLock::new(Registry {
            ids,
            names: vec![std::any::type_name::<Phantom>()],
        })
    })
}

/// Get (or assign on first use) the id of component type `T`
pub fn component_id<T: Component>() -> ComponentId {
    let type_id = TypeId::of::<T>();
    if let Some(&id) = registry().read().ids.get(&type_id) {
        return id;
    }

    let mut registry = registry().write();
    // Another thread may have registered T between the two locks
    if let Some(&id) = registry.ids.get(&type_id) {
        return id;
    }
    let id = ComponentId(registry.names.len() as u32);
    registry.ids.insert(type_id, id);
    registry.names.push(std::any::type_name::<T>());
    id
}

/// Type name a component id was registered under
pub fn component_name(id: ComponentId) -> Option<&'static str> {
    registry().read().names.get(id.0 as usize).copied()
}

/// Number of component types registered so far in this process
pub fn registered_component_count() -> usize {
    registry().read().names.len()
}

/// Bundle of components
///
/// Allows spawning entities with multiple components at once.
pub trait Bundle: Send + Sync + 'static {
    /// Component ids in declaration order
    fn component_ids() -> SmallVec<[ComponentId; MAX_QUERY_ARITY]>
    where
        Self: Sized;

    /// Column constructors in declaration order
    fn column_factories() -> SmallVec<[(ComponentId, ColumnFactory); MAX_QUERY_ARITY]>
    where
        Self: Sized;

    /// Push every component onto the matching column of `chunk`.
    ///
    /// `signature` is the archetype signature the chunk's columns follow.
    fn push_into(self, chunk: &mut Chunk, signature: &ComponentSet);
}

// Macro for tuple Bundle implementations
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn component_ids() -> SmallVec<[ComponentId; MAX_QUERY_ARITY]> {
                smallvec![$(component_id::<$T>()),*]
            }

            fn column_factories() -> SmallVec<[(ComponentId, ColumnFactory); MAX_QUERY_ARITY]> {
                smallvec![$((component_id::<$T>(), TypedColumn::<$T>::factory as ColumnFactory)),*]
            }

            #[allow(non_snake_case)]
            fn push_into(self, chunk: &mut Chunk, signature: &ComponentSet) {
                let ($($T,)*) = self;
                $(
                    let index = signature
                        .index_of(component_id::<$T>())
                        .expect("bundle component missing from archetype signature");
                    chunk.push_component(index, $T);
                )*
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
impl_bundle!(A, B, C, D, E, F, G, H, I);
impl_bundle!(A, B, C, D, E, F, G, H, I, J);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K, L);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K, L, M);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K, L, M, N);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P);
