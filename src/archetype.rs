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

//! Archetype storage split into fixed-capacity chunks
//!
//! Records of one archetype live in a list of [`Chunk`]s. Every chunk holds
//! one typed column per component of the archetype signature, stored in
//! signature order, plus the entity id of each row. Chunks are kept dense:
//! all chunks before the last occupied one are full, so the location of the
//! archetype's last record is always `(len - 1) / capacity`.

use std::any::Any;
use std::marker::PhantomData;
use std::ops::Range;
use std::ptr::NonNull;

use crate::component::{Bundle, Component};
use crate::component_set::ComponentSet;
use crate::entity::EntityId;

/// Constructor for an empty column with room for `capacity` rows
pub type ColumnFactory = fn(usize) -> Box<dyn ErasedColumn>;

/// Type-erased component column
pub trait ErasedColumn: Any + Send + Sync {
    /// Number of stored rows
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable reference for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutable reference for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Name of the element type
    fn element_type_name(&self) -> &'static str;

    /// Drop row `row` and move the last row into its place
    fn swap_remove(&mut self, row: usize);

    /// Drop row `row` and replace it with the last row of `donor`, which must
    /// be a column of the same element type
    fn fill_from_last(&mut self, row: usize, donor: &mut dyn ErasedColumn);
}

/// Column storing values of one component type contiguously
pub struct TypedColumn<T> {
    values: Vec<T>,
}

impl<T: Component> TypedColumn<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// [`ColumnFactory`] for this element type
    pub fn factory(capacity: usize) -> Box<dyn ErasedColumn> {
        Box::new(Self::with_capacity(capacity))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }
}

impl<T: Component> ErasedColumn for TypedColumn<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn element_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn swap_remove(&mut self, row: usize) {
        self.values.swap_remove(row);
    }

    fn fill_from_last(&mut self, row: usize, donor: &mut dyn ErasedColumn) {
        let donor = donor
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .expect("donor column has a different element type");
        if let Some(value) = donor.values.pop() {
            self.values[row] = value;
        }
    }
}

/// Raw base pointer and length of one chunk column.
///
/// Handed to the query engine so that disjoint row ranges of the same column
/// can be borrowed mutably from different threads.
pub struct ColumnPtr<T> {
    ptr: NonNull<T>,
    len: usize,
    _marker: PhantomData<*mut T>,
}

impl<T> Clone for ColumnPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ColumnPtr<T> {}

// SAFETY: a ColumnPtr is only turned into references for disjoint row ranges,
// and only while the owning world is exclusively borrowed by the query engine.
unsafe impl<T: Send + Sync> Send for ColumnPtr<T> {}
unsafe impl<T: Send + Sync> Sync for ColumnPtr<T> {}

impl<T> ColumnPtr<T> {
    fn from_slice(slice: &[T]) -> Self {
        Self {
            ptr: NonNull::from(slice).cast::<T>(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    fn from_mut_slice(slice: &mut [T]) -> Self {
        let len = slice.len();
        Self {
            ptr: NonNull::from(slice).cast::<T>(),
            len,
            _marker: PhantomData,
        }
    }

    /// Rows in the column when the pointer was taken
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow `range` immutably
    ///
    /// # Safety
    /// `range` must lie within `0..len`, the column must still be alive and
    /// unmoved, and no mutable borrow of the same rows may exist.
    pub unsafe fn slice<'a>(self, range: Range<usize>) -> &'a [T] {
        debug_assert!(range.start <= range.end && range.end <= self.len);
        std::slice::from_raw_parts(self.ptr.as_ptr().add(range.start), range.len())
    }

    /// Borrow `range` mutably
    ///
    /// # Safety
    /// Same as [`ColumnPtr::slice`], and no other borrow of the same rows may
    /// exist while the returned slice is alive. The pointer must have been
    /// taken from a mutable column.
    pub unsafe fn slice_mut<'a>(self, range: Range<usize>) -> &'a mut [T] {
        debug_assert!(range.start <= range.end && range.end <= self.len);
        std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(range.start), range.len())
    }
}

/// Fixed-capacity block of records with one column per component
pub struct Chunk {
    entities: Vec<EntityId>,
    columns: Vec<Box<dyn ErasedColumn>>,
    capacity: usize,
}

impl Chunk {
    fn new(factories: &[ColumnFactory], capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
            columns: factories.iter().map(|factory| factory(capacity)).collect(),
            capacity,
        }
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entities.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entity ids, index-aligned with every column
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of columns (the archetype signature length)
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Typed view of the column at `index`
    pub fn column<T: Component>(&self, index: usize) -> Option<&[T]> {
        self.columns
            .get(index)?
            .as_any()
            .downcast_ref::<TypedColumn<T>>()
            .map(TypedColumn::as_slice)
    }

    /// Mutable typed view of the column at `index`
    pub fn column_mut<T: Component>(&mut self, index: usize) -> Option<&mut [T]> {
        self.columns
            .get_mut(index)?
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .map(TypedColumn::as_mut_slice)
    }

    /// Append a value to the column at `index`
    ///
    /// Used by [`Bundle::push_into`]; callers must push to every column
    /// before the next record is added.
    pub fn push_component<T: Component>(&mut self, index: usize, value: T) {
        let column = self.columns[index]
            .as_any_mut()
            .downcast_mut::<TypedColumn<T>>()
            .expect("column element type does not match pushed component");
        column.values.push(value);
    }

    pub(crate) fn column_ptr<T: Component>(&mut self, index: usize) -> Option<ColumnPtr<T>> {
        self.column_mut::<T>(index).map(ColumnPtr::from_mut_slice)
    }

    pub(crate) fn entity_ptr(&self) -> ColumnPtr<EntityId> {
        ColumnPtr::from_slice(&self.entities)
    }

    #[cfg(debug_assertions)]
    fn assert_aligned(&self) {
        for column in &self.columns {
            debug_assert_eq!(
                column.len(),
                self.entities.len(),
                "column {} out of step with entity array",
                column.element_type_name()
            );
        }
    }
}

/// Archetype: records sharing one exact component signature
pub struct Archetype {
    id: usize,
    signature: ComponentSet,
    factories: Vec<ColumnFactory>,
    chunks: Vec<Chunk>,
    chunk_capacity: usize,
    len: usize,
}

impl Archetype {
    /// Create new archetype
    ///
    /// `factories` must be in signature order.
    pub fn new(
        id: usize,
        signature: ComponentSet,
        factories: Vec<ColumnFactory>,
        chunk_capacity: usize,
    ) -> Self {
        debug_assert_eq!(signature.len(), factories.len());
        Self {
            id,
            signature,
            factories,
            chunks: Vec::new(),
            chunk_capacity: chunk_capacity.max(1),
            len: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Get signature
    pub fn signature(&self) -> &ComponentSet {
        &self.signature
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if archetype is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Chunks in storage order, including empty trailing ones
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Column index of a component within every chunk of this archetype
    pub fn column_index(&self, id: crate::component::ComponentId) -> Option<usize> {
        self.signature.index_of(id)
    }

    /// Append a record, returning `(chunk_index, row)`
    pub(crate) fn allocate<B: Bundle>(&mut self, entity: EntityId, bundle: B) -> (usize, usize) {
        let chunk_index = self.len / self.chunk_capacity;
        if chunk_index == self.chunks.len() {
            self.chunks
                .push(Chunk::new(&self.factories, self.chunk_capacity));
        }

        let chunk = &mut self.chunks[chunk_index];
        let row = chunk.len();
        chunk.entities.push(entity);
        bundle.push_into(chunk, &self.signature);
        #[cfg(debug_assertions)]
        chunk.assert_aligned();

        self.len += 1;
        (chunk_index, row)
    }

    /// Remove the record at `(chunk_index, row)`.
    ///
    /// The archetype's last record fills the hole. Returns the entity that
    /// moved, whose new location is `(chunk_index, row)`.
    pub(crate) fn remove(&mut self, chunk_index: usize, row: usize) -> Option<EntityId> {
        if self.len == 0 {
            return None;
        }

        let last = self.len - 1;
        let last_chunk = last / self.chunk_capacity;
        self.len -= 1;

        if chunk_index == last_chunk {
            let chunk = &mut self.chunks[chunk_index];
            chunk.entities.swap_remove(row);
            for column in &mut chunk.columns {
                column.swap_remove(row);
            }
            return chunk.entities.get(row).copied();
        }

        debug_assert!(chunk_index < last_chunk);
        let (head, tail) = self.chunks.split_at_mut(last_chunk);
        let target = &mut head[chunk_index];
        let donor = &mut tail[0];

        let moved = donor.entities.pop()?;
        target.entities[row] = moved;
        for (column, donor_column) in target.columns.iter_mut().zip(donor.columns.iter_mut()) {
            column.fill_from_last(row, donor_column.as_mut());
        }
        Some(moved)
    }
}
