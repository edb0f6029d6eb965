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

//! Query execution over chunked archetype storage
//!
//! A query names 1..=16 component types as a tuple, e.g.
//! `(Position, Velocity)`. Execution resolves a [`QueryDescriptor`] (the
//! world's cached one unless an override is given), walks every matching
//! archetype chunk by chunk and calls the callback once per record with the
//! entity id and `&mut` to each requested component.
//!
//! Callbacks come in three families, one trait per arity:
//!
//! * [`ForEach1`]..[`ForEach16`]: sequential, `&mut self`
//! * [`ParForEach1`]..[`ParForEach16`]: parallel, `&self`, `Sync`
//! * [`TryParForEach1`]..[`TryParForEach16`]: parallel and fallible
//!
//! Closures with the right signature implement them automatically:
//!
//! ```ignore
//! let visited = world.execute_sequential::<(Position, Velocity), _>(
//!     &mut |_: EntityId, pos: &mut Position, vel: &mut Velocity| {
//!         pos.x += vel.x;
//!     },
//!     None,
//! )?;
//! ```
//!
//! # Parallel execution
//! Each non-empty chunk is cut into consecutive batches of at most
//! `batch_size` rows and every batch becomes one rayon task. Batches cover
//! disjoint row ranges and chunks never share columns, so two concurrent
//! callback invocations never see the same component slot.
//!
//! If a callback panics, rayon finishes the batches already running, skips
//! the rest of the panicking branch and resumes the panic on the calling
//! thread. [`World::try_execute_parallel`] stops handing out new batches after
//! the first error and returns that error. Neither path rolls back writes made
//! by batches that completed.

use std::ops::Range;
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Chunk, ColumnPtr};
use crate::component::{component_id, Component, ComponentId, MAX_QUERY_ARITY};
use crate::descriptor::QueryDescriptor;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::hash::SortedIds;
use crate::world::World;

#[cfg(feature = "parallel")]
use crate::utils::{batch_count, clamp_batch_size};

/// Tuple of component types a query hands out mutably
///
/// # Safety
/// `columns` must return one pointer per entry of `component_ids`, in the
/// same order, each taken from the chunk column at the matching index.
pub unsafe trait QueryTuple: Sized + 'static {
    /// Number of component types
    const ARITY: usize;

    /// Per-chunk column pointers
    type Columns: Copy + Send + Sync;

    /// Index-aligned mutable slices, one per component
    type Slices<'a>;

    /// Component ids in declaration order
    fn component_ids() -> SmallVec<[ComponentId; MAX_QUERY_ARITY]>;

    /// Take column pointers from `chunk`; `indices[i]` is the column of the
    /// `i`-th component
    fn columns(chunk: &mut Chunk, indices: &[usize]) -> Option<Self::Columns>;

    /// Borrow rows `range` of every column
    ///
    /// # Safety
    /// `range` must lie within the chunk length the columns were taken at,
    /// the chunk must not have changed since, and no other borrow of those
    /// rows may be alive.
    unsafe fn slices<'a>(columns: Self::Columns, range: Range<usize>) -> Self::Slices<'a>;
}

/// Sequential callback dispatch, implemented for every `ForEachN` callback
pub trait QueryCallback<Q: QueryTuple> {
    /// Run the callback for every row of an index-aligned batch
    fn run_rows(&mut self, entities: &[EntityId], slices: Q::Slices<'_>);
}

/// Parallel callback dispatch, implemented for every `ParForEachN` callback
pub trait ParallelQueryCallback<Q: QueryTuple>: Sync {
    fn run_rows(&self, entities: &[EntityId], slices: Q::Slices<'_>);
}

/// Fallible parallel callback dispatch, implemented for every
/// `TryParForEachN` callback
pub trait TryParallelQueryCallback<Q: QueryTuple>: Sync {
    type Error: Send;

    /// Stops at the first failing row of the batch
    fn try_run_rows(
        &self,
        entities: &[EntityId],
        slices: Q::Slices<'_>,
    ) -> std::result::Result<(), Self::Error>;
}

macro_rules! impl_query {
    ($arity:literal, $for_each:ident, $par_for_each:ident, $try_par_for_each:ident; $($T:ident $v:ident),+) => {
        #[doc = concat!("Sequential callback over ", stringify!($arity), " components")]
        pub trait $for_each<$($T: Component),+> {
            fn execute(&mut self, entity: EntityId, $($v: &mut $T),+);
        }

        impl<$($T: Component,)+ Func> $for_each<$($T),+> for Func
        where
            Func: FnMut(EntityId, $(&mut $T),+),
        {
            #[inline]
            fn execute(&mut self, entity: EntityId, $($v: &mut $T),+) {
                (*self)(entity, $($v),+)
            }
        }

        #[doc = concat!("Parallel callback over ", stringify!($arity), " components")]
        pub trait $par_for_each<$($T: Component),+>: Sync {
            fn execute(&self, entity: EntityId, $($v: &mut $T),+);
        }

        impl<$($T: Component,)+ Func> $par_for_each<$($T),+> for Func
        where
            Func: Fn(EntityId, $(&mut $T),+) + Sync,
        {
            #[inline]
            fn execute(&self, entity: EntityId, $($v: &mut $T),+) {
                (*self)(entity, $($v),+)
            }
        }

        #[doc = concat!("Fallible parallel callback over ", stringify!($arity), " components")]
        pub trait $try_par_for_each<$($T: Component),+>: Sync {
            type Error: Send;

            fn try_execute(
                &self,
                entity: EntityId,
                $($v: &mut $T),+
            ) -> std::result::Result<(), Self::Error>;
        }

        impl<$($T: Component,)+ Func, Failure> $try_par_for_each<$($T),+> for Func
        where
            Func: Fn(EntityId, $(&mut $T),+) -> std::result::Result<(), Failure> + Sync,
            Failure: Send,
        {
            type Error = Failure;

            #[inline]
            fn try_execute(
                &self,
                entity: EntityId,
                $($v: &mut $T),+
            ) -> std::result::Result<(), Failure> {
                (*self)(entity, $($v),+)
            }
        }

        unsafe impl<$($T: Component),+> QueryTuple for ($($T,)+) {
            const ARITY: usize = $arity;
            type Columns = ($(ColumnPtr<$T>,)+);
            type Slices<'a> = ($(&'a mut [$T],)+);

            fn component_ids() -> SmallVec<[ComponentId; MAX_QUERY_ARITY]> {
                smallvec![$(component_id::<$T>()),+]
            }

            fn columns(chunk: &mut Chunk, indices: &[usize]) -> Option<Self::Columns> {
                let mut indices = indices.iter();
                Some(($(chunk.column_ptr::<$T>(*indices.next()?)?,)+))
            }

            unsafe fn slices<'a>(columns: Self::Columns, range: Range<usize>) -> Self::Slices<'a> {
                let ($($v,)+) = columns;
                ($($v.slice_mut(range.clone()),)+)
            }
        }

        impl<$($T: Component,)+ Func> QueryCallback<($($T,)+)> for Func
        where
            Func: $for_each<$($T),+>,
        {
            #[inline]
            fn run_rows(
                &mut self,
                entities: &[EntityId],
                slices: <($($T,)+) as QueryTuple>::Slices<'_>,
            ) {
                let ($($v,)+) = slices;
                $(debug_assert_eq!($v.len(), entities.len());)+
                for (row, &entity) in entities.iter().enumerate() {
                    $for_each::execute(self, entity, $(&mut $v[row]),+);
                }
            }
        }

        impl<$($T: Component,)+ Func> ParallelQueryCallback<($($T,)+)> for Func
        where
            Func: $par_for_each<$($T),+>,
        {
            #[inline]
            fn run_rows(
                &self,
                entities: &[EntityId],
                slices: <($($T,)+) as QueryTuple>::Slices<'_>,
            ) {
                let ($($v,)+) = slices;
                $(debug_assert_eq!($v.len(), entities.len());)+
                for (row, &entity) in entities.iter().enumerate() {
                    $par_for_each::execute(self, entity, $(&mut $v[row]),+);
                }
            }
        }

        impl<$($T: Component,)+ Func> TryParallelQueryCallback<($($T,)+)> for Func
        where
            Func: $try_par_for_each<$($T),+>,
        {
            type Error = <Func as $try_par_for_each<$($T),+>>::Error;

            #[inline]
            fn try_run_rows(
                &self,
                entities: &[EntityId],
                slices: <($($T,)+) as QueryTuple>::Slices<'_>,
            ) -> std::result::Result<(), Self::Error> {
                let ($($v,)+) = slices;
                $(debug_assert_eq!($v.len(), entities.len());)+
                for (row, &entity) in entities.iter().enumerate() {
                    $try_par_for_each::try_execute(self, entity, $(&mut $v[row]),+)?;
                }
                Ok(())
            }
        }
    };
}

impl_query!(1, ForEach1, ParForEach1, TryParForEach1; A a);
impl_query!(2, ForEach2, ParForEach2, TryParForEach2; A a, B b);
impl_query!(3, ForEach3, ParForEach3, TryParForEach3; A a, B b, C c);
impl_query!(4, ForEach4, ParForEach4, TryParForEach4; A a, B b, C c, D d);
impl_query!(5, ForEach5, ParForEach5, TryParForEach5; A a, B b, C c, D d, E e);
impl_query!(6, ForEach6, ParForEach6, TryParForEach6; A a, B b, C c, D d, E e, F f);
impl_query!(7, ForEach7, ParForEach7, TryParForEach7; A a, B b, C c, D d, E e, F f, G g);
impl_query!(8, ForEach8, ParForEach8, TryParForEach8; A a, B b, C c, D d, E e, F f, G g, H h);
impl_query!(9, ForEach9, ParForEach9, TryParForEach9; A a, B b, C c, D d, E e, F f, G g, H h, I i);
impl_query!(10, ForEach10, ParForEach10, TryParForEach10; A a, B b, C c, D d, E e, F f, G g, H h, I i, J j);
impl_query!(11, ForEach11, ParForEach11, TryParForEach11; A a, B b, C c, D d, E e, F f, G g, H h, I i, J j, K k);
impl_query!(12, ForEach12, ParForEach12, TryParForEach12; A a, B b, C c, D d, E e, F f, G g, H h, I i, J j, K k, L l);
impl_query!(13, ForEach13, ParForEach13, TryParForEach13; A a, B b, C c, D d, E e, F f, G g, H h, I i, J j, K k, L l, M m);
impl_query!(14, ForEach14, ParForEach14, TryParForEach14; A a, B b, C c, D d, E e, F f, G g, H h, I i, J j, K k, L l, M m, N n);
impl_query!(15, ForEach15, ParForEach15, TryParForEach15; A a, B b, C c, D d, E e, F f, G g, H h, I i, J j, K k, L l, M m, N n, O o);
impl_query!(16, ForEach16, ParForEach16, TryParForEach16; A a, B b, C c, D d, E e, F f, G g, H h, I i, J j, K k, L l, M m, N n, O o, P p);

/// One matched, non-empty archetype and where its columns sit
struct PlanStep {
    archetype_id: usize,
    columns: SmallVec<[usize; MAX_QUERY_ARITY]>,
}

/// Archetypes to visit, resolved before any chunk is touched
struct QueryPlan {
    steps: Vec<PlanStep>,
    /// Records across all steps at plan time
    total: usize,
}

/// Disjoint row range of one chunk, processed as a single parallel task
#[cfg(feature = "parallel")]
struct BatchJob<C> {
    entities: ColumnPtr<EntityId>,
    columns: C,
    range: Range<usize>,
}

#[cfg(feature = "parallel")]
impl<C: Copy> BatchJob<C> {
    /// # Safety
    /// No two live borrows may come from jobs with overlapping ranges of the
    /// same chunk, and the world must stay exclusively borrowed.
    unsafe fn borrow<'a, Q: QueryTuple<Columns = C>>(&self) -> (&'a [EntityId], Q::Slices<'a>) {
        (
            self.entities.slice(self.range.clone()),
            Q::slices(self.columns, self.range.clone()),
        )
    }
}

impl World {
    fn plan<Q: QueryTuple>(&self, descriptor: Option<&QueryDescriptor>) -> Result<QueryPlan> {
        let ids = Q::component_ids();
        // A tuple may name the same type twice
        SortedIds::new(&ids)?;

        let matched = match descriptor {
            Some(descriptor) => {
                if let Some(&missing) = ids
                    .iter()
                    .find(|&&id| descriptor.include().binary_search(&id).is_err())
                {
                    return Err(EcsError::DescriptorMismatch(missing));
                }
                self.matching_archetypes(descriptor)?
            }
            None => {
                let descriptor: Arc<QueryDescriptor> = self.cached_query::<Q>()?;
                self.matching_archetypes(&descriptor)?
            }
        };

        let mut steps = Vec::with_capacity(matched.len());
        let mut total = 0;
        for &arch_id in matched.iter() {
            let archetype = self
                .get_archetype(arch_id)
                .ok_or(EcsError::ArchetypeNotFound)?;
            if archetype.is_empty() {
                continue;
            }

            let columns = ids
                .iter()
                .map(|&id| archetype.column_index(id).ok_or(EcsError::ComponentNotFound))
                .collect::<Result<SmallVec<_>>>()?;
            total += archetype.len();
            steps.push(PlanStep {
                archetype_id: arch_id,
                columns,
            });
        }

        Ok(QueryPlan { steps, total })
    }

    /// Number of records a query over `Q` would visit
    pub fn count<Q: QueryTuple>(&self) -> Result<usize> {
        Ok(self.plan::<Q>(None)?.total)
    }

    /// Visit every record matched by `descriptor` (or the cached descriptor
    /// for `Q`) on the calling thread.
    ///
    /// Order is archetype order, then chunk order, then ascending row.
    /// Returns the number of records visited.
    pub fn execute_sequential<Q, C>(
        &mut self,
        callback: &mut C,
        descriptor: Option<&QueryDescriptor>,
    ) -> Result<usize>
    where
        Q: QueryTuple,
        C: QueryCallback<Q>,
    {
        let plan = self.plan::<Q>(descriptor)?;

        #[cfg(feature = "profiling")]
        let _span = info_span!(
            "query.execute_sequential",
            arity = Q::ARITY,
            archetypes = plan.steps.len(),
            records = plan.total
        )
        .entered();

        for step in &plan.steps {
            let archetype = &mut self.archetypes_mut()[step.archetype_id];
            for chunk in archetype.chunks_mut() {
                let len = chunk.len();
                if len == 0 {
                    continue;
                }

                let columns = Q::columns(chunk, &step.columns).ok_or(EcsError::ComponentNotFound)?;
                // SAFETY: the columns were just taken from this chunk, cover
                // 0..len, and nothing else borrows them until the next chunk.
                let slices = unsafe { Q::slices(columns, 0..len) };
                <C as QueryCallback<Q>>::run_rows(callback, chunk.entities(), slices);
            }
        }

        Ok(plan.total)
    }

    /// Visit matching records in parallel batches of at most `batch_size`
    /// rows; `batch_size` is clamped into `[1, chunk_capacity]`.
    ///
    /// Blocks until every batch has run. Returns the number of records
    /// visited.
    #[cfg(feature = "parallel")]
    pub fn execute_parallel<Q, C>(
        &mut self,
        callback: &C,
        descriptor: Option<&QueryDescriptor>,
        batch_size: usize,
    ) -> Result<usize>
    where
        Q: QueryTuple,
        C: ParallelQueryCallback<Q>,
    {
        let (jobs, total) = self.collect_batches::<Q>(descriptor, batch_size)?;

        #[cfg(feature = "profiling")]
        let _span = info_span!(
            "query.execute_parallel",
            arity = Q::ARITY,
            batches = jobs.len(),
            records = total
        )
        .entered();

        jobs.par_iter().for_each(|job| {
            // SAFETY: jobs partition each chunk into disjoint ranges and
            // `self` stays mutably borrowed until every job has finished.
            let (entities, slices) = unsafe { job.borrow::<Q>() };
            <C as ParallelQueryCallback<Q>>::run_rows(callback, entities, slices);
        });

        Ok(total)
    }

    /// [`World::execute_parallel`] with the world's configured batch size
    #[cfg(feature = "parallel")]
    pub fn execute_parallel_default<Q, C>(
        &mut self,
        callback: &C,
        descriptor: Option<&QueryDescriptor>,
    ) -> Result<usize>
    where
        Q: QueryTuple,
        C: ParallelQueryCallback<Q>,
    {
        let batch_size = self.config().default_batch_size;
        self.execute_parallel::<Q, C>(callback, descriptor, batch_size)
    }

    /// Parallel execution with a fallible callback.
    ///
    /// After the first error no new batch is started; batches already running
    /// finish. The first error observed is returned and writes made before it
    /// are kept.
    #[cfg(feature = "parallel")]
    pub fn try_execute_parallel<Q, C>(
        &mut self,
        callback: &C,
        descriptor: Option<&QueryDescriptor>,
        batch_size: usize,
    ) -> std::result::Result<usize, C::Error>
    where
        Q: QueryTuple,
        C: TryParallelQueryCallback<Q>,
        C::Error: From<EcsError>,
    {
        let (jobs, total) = self.collect_batches::<Q>(descriptor, batch_size)?;

        #[cfg(feature = "profiling")]
        let _span = info_span!(
            "query.try_execute_parallel",
            arity = Q::ARITY,
            batches = jobs.len(),
            records = total
        )
        .entered();

        jobs.par_iter().try_for_each(|job| {
            // SAFETY: same disjointness argument as `execute_parallel`
            let (entities, slices) = unsafe { job.borrow::<Q>() };
            <C as TryParallelQueryCallback<Q>>::try_run_rows(callback, entities, slices)
        })?;

        Ok(total)
    }

    #[cfg(feature = "parallel")]
    fn collect_batches<Q: QueryTuple>(
        &mut self,
        descriptor: Option<&QueryDescriptor>,
        batch_size: usize,
    ) -> Result<(Vec<BatchJob<Q::Columns>>, usize)> {
        let plan = self.plan::<Q>(descriptor)?;
        let batch_size = clamp_batch_size(batch_size, self.config());

        let mut jobs = Vec::new();
        for step in &plan.steps {
            let archetype = &mut self.archetypes_mut()[step.archetype_id];
            for chunk in archetype.chunks_mut() {
                let len = chunk.len();
                if len == 0 {
                    continue;
                }

                let columns = Q::columns(chunk, &step.columns).ok_or(EcsError::ComponentNotFound)?;
                let entities = chunk.entity_ptr();
                jobs.reserve(batch_count(len, batch_size));
                for start in (0..len).step_by(batch_size) {
                    jobs.push(BatchJob {
                        entities,
                        columns,
                        range: start..(start + batch_size).min(len),
                    });
                }
            }
        }

        Ok((jobs, plan.total))
    }
}
