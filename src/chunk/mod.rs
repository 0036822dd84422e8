//! Chunk: fixed-size typed column store for one archetype (spec §4.C).

pub mod allocator;

use {
    crate::{
        archetype::layout::ArchetypeLayout,
        entity::Entity,
        error::fatal,
        version::{ColumnVersion, WorldVersion},
    },
    self::allocator::{ChunkAllocator, ChunkSizeClass},
    core::ptr::NonNull,
    smallvec::SmallVec,
};

/// Read or write access, as requested by a query term (§4.G) or a direct
/// `get`/`set` call; write access bumps the column's version (§4.C).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    /// Mutable access that does not bump the version counter -- used for
    /// internal reorderings (swap-remove, enable/disable, defrag) and for
    /// `set_component_silent` (§4.C "silent write view").
    WriteSilent,
}

/// One fixed-size block of rows for an archetype. Holds the entity-id
/// column followed by each component column, plus the disabled/enabled
/// partition and per-column version counters (§4.C).
pub(crate) struct Chunk {
    data: NonNull<u8>,
    size_class: ChunkSizeClass,
    capacity: u16,
    count: u16,
    disabled_count: u16,
    column_versions: SmallVec<[ColumnVersion; 8]>,
    lock_depth: u8,
    lifespan_countdown: u8,
}

impl Chunk {
    pub fn new(allocator: &mut ChunkAllocator, layout: &ArchetypeLayout) -> Self {
        let data = allocator.alloc(layout.size_class);
        Chunk {
            data,
            size_class: layout.size_class,
            capacity: layout.capacity,
            count: 0,
            disabled_count: 0,
            column_versions: smallvec::smallvec![ColumnVersion::zero(); layout.columns.len()],
            lock_depth: 0,
            lifespan_countdown: Self::NOT_DYING,
        }
    }

    pub fn release(mut self, allocator: &mut ChunkAllocator, layout: &ArchetypeLayout) {
        self.drop_all_rows(layout);
        allocator.free(self.size_class, self.data);
        // Prevent the (now dangling) Drop impl from running a second time.
        core::mem::forget(self);
    }

    fn drop_all_rows(&mut self, layout: &ArchetypeLayout) {
        for col in &layout.columns {
            let Some(drop_fn) = col.drop_fn else {
                continue;
            };
            for row in 0..self.count {
                unsafe {
                    if col.field_offsets.is_empty() {
                        drop_fn(self.raw_component_ptr(col, row));
                    } else {
                        for (i, &size) in col.field_sizes.iter().enumerate() {
                            let _ = size;
                            drop_fn(self.raw_field_ptr(col, i, row));
                        }
                    }
                }
            }
        }
    }

    pub fn len(&self) -> u16 {
        self.count
    }

    pub fn disabled_count(&self) -> u16 {
        self.disabled_count
    }

    pub fn enabled_count(&self) -> u16 {
        self.count - self.disabled_count
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_locked(&self) -> bool {
        self.lock_depth > 0
    }

    pub fn lock(&mut self) {
        self.lock_depth = self
            .lock_depth
            .checked_add(1)
            .unwrap_or_else(|| fatal("chunk lock depth overflow"));
    }

    pub fn unlock(&mut self) {
        self.lock_depth = self
            .lock_depth
            .checked_sub(1)
            .unwrap_or_else(|| fatal("chunk unlocked more times than it was locked"));
    }

    /// Sentinel meaning "not currently dying" (occupied, or emptied but
    /// not yet GC-swept once).
    const NOT_DYING: u8 = u8::MAX;

    pub fn is_dying(&self) -> bool {
        self.lifespan_countdown != Self::NOT_DYING
    }

    /// Marks the chunk as occupied again, cancelling any in-progress death
    /// countdown (§4.C "re-adding a row resurrects it").
    fn resurrect(&mut self) {
        self.lifespan_countdown = Self::NOT_DYING;
    }

    /// Advances the chunk's GC state by one `update()` tick. Arms the
    /// death countdown the first time the chunk is found empty, then
    /// counts down on each subsequent call; returns `true` once the
    /// countdown is exhausted (the chunk should be released).
    pub fn tick_lifespan(&mut self, default_ticks: u8) -> bool {
        debug_assert!(self.is_empty());
        if self.lifespan_countdown == Self::NOT_DYING {
            self.lifespan_countdown = default_ticks;
        }
        if self.lifespan_countdown == 0 {
            true
        } else {
            self.lifespan_countdown -= 1;
            false
        }
    }

    unsafe fn entity_ptr(&self, row: u16) -> *mut Entity {
        self.data.as_ptr().cast::<Entity>().add(row as usize)
    }

    pub fn entity_at(&self, row: u16) -> Entity {
        debug_assert!(row < self.count);
        unsafe { self.entity_at_unchecked(row) }
    }

    /// Like [`Chunk::entity_at`] but usable while `self.count` is being
    /// adjusted around a relocation (the row itself is always within the
    /// chunk's allocated capacity).
    unsafe fn entity_at_unchecked(&self, row: u16) -> Entity {
        debug_assert!(row < self.capacity);
        *self.entity_ptr(row)
    }

    fn set_entity_at(&mut self, row: u16, entity: Entity) {
        unsafe { *self.entity_ptr(row) = entity };
    }

    /// Entity handles for rows `lo..hi` (§4.H "Full iterator"), backing
    /// chunk-slice-at-a-time queries alongside [`Chunk::raw_component_ptr`].
    pub fn entities(&self, lo: u16, hi: u16) -> &[Entity] {
        debug_assert!(lo <= hi && hi <= self.count);
        unsafe { core::slice::from_raw_parts(self.entity_ptr(lo).cast_const(), (hi - lo) as usize) }
    }

    /// Byte address of an AoS column's element at `row`.
    ///
    /// # Safety
    /// Caller must ensure `col` belongs to this chunk's archetype, `row <
    /// count`, and that the requested access does not overlap another live
    /// borrow of the same column.
    pub(crate) unsafe fn raw_component_ptr(
        &self,
        col: &crate::archetype::layout::ColumnLayout,
        row: u16,
    ) -> NonNull<u8> {
        NonNull::new_unchecked(
            self.data
                .as_ptr()
                .add(col.offset + col.element_size * row as usize),
        )
    }

    /// Byte address of one field's element within a SoA column.
    ///
    /// # Safety
    /// Same as [`Chunk::raw_component_ptr`].
    pub(crate) unsafe fn raw_field_ptr(
        &self,
        col: &crate::archetype::layout::ColumnLayout,
        field_index: usize,
        row: u16,
    ) -> NonNull<u8> {
        let field_offset = col.field_offsets[field_index];
        let field_size = col.field_sizes[field_index];
        NonNull::new_unchecked(self.data.as_ptr().add(field_offset + field_size * row as usize))
    }

    pub fn column_version(&self, column_index: usize) -> ColumnVersion {
        self.column_versions[column_index]
    }

    pub fn bump_column_version(&mut self, column_index: usize, world: WorldVersion) {
        self.column_versions[column_index].stamp(world);
    }

    /// Appends a row to the enabled section (§4.C `add_row`). If the chunk had
    /// disabled rows, the row that sat at `disabled_count` is relocated to
    /// the end first to make room, and its entity/new-row-index is
    /// returned so the caller can update that entity's directory record.
    /// The caller is responsible for constructing each component's value
    /// into the returned new row via [`Chunk::raw_component_ptr`] /
    /// [`Chunk::raw_field_ptr`] immediately afterwards.
    pub fn add_row(&mut self, layout: &ArchetypeLayout, entity: Entity) -> (u16, Option<(Entity, u16)>) {
        debug_assert!(!self.is_full());
        self.resurrect();
        let (row, displaced) = if self.disabled_count == 0 || self.disabled_count == self.count {
            (self.count, None)
        } else {
            let hole = self.disabled_count;
            let last = self.count;
            unsafe {
                self.copy_row(layout, last, hole);
                (hole, Some((self.entity_at_unchecked(last), last)))
            }
        };
        self.count += 1;
        self.set_entity_at(row, entity);
        (row, displaced)
    }

    /// Copies the full row (entity id + every component, AoS and SoA
    /// fields) from `src` to `dst`. Always a plain byte copy: Rust values
    /// are unconditionally relocatable, so there is no "move constructor"
    /// slot in the component descriptor the way spec §3 describes for the
    /// source language.
    unsafe fn copy_row(&self, layout: &ArchetypeLayout, dst: u16, src: u16) {
        if dst == src {
            return;
        }
        core::ptr::copy_nonoverlapping(self.entity_ptr(src), self.entity_ptr(dst), 1);
        for col in &layout.columns {
            if col.field_offsets.is_empty() {
                let s = self.raw_component_ptr(col, src);
                let d = self.raw_component_ptr(col, dst);
                core::ptr::copy_nonoverlapping(s.as_ptr(), d.as_ptr(), col.element_size);
            } else {
                for (i, &size) in col.field_sizes.iter().enumerate() {
                    let s = self.raw_field_ptr(col, i, src);
                    let d = self.raw_field_ptr(col, i, dst);
                    core::ptr::copy_nonoverlapping(s.as_ptr(), d.as_ptr(), size);
                }
            }
        }
    }

    unsafe fn swap_rows(&self, layout: &ArchetypeLayout, a: u16, b: u16) {
        if a == b {
            return;
        }
        core::ptr::swap(self.entity_ptr(a), self.entity_ptr(b));
        for col in &layout.columns {
            if col.field_offsets.is_empty() {
                swap_bytes(
                    self.raw_component_ptr(col, a).as_ptr(),
                    self.raw_component_ptr(col, b).as_ptr(),
                    col.element_size,
                );
            } else {
                for (i, &size) in col.field_sizes.iter().enumerate() {
                    swap_bytes(
                        self.raw_field_ptr(col, i, a).as_ptr(),
                        self.raw_field_ptr(col, i, b).as_ptr(),
                        size,
                    );
                }
            }
        }
    }

    /// Drops every component's value at `row` without touching the
    /// partition or the row count. Used right before a row is recycled or
    /// swap-removed.
    unsafe fn drop_row_values(&self, layout: &ArchetypeLayout, row: u16) {
        for col in &layout.columns {
            let Some(drop_fn) = col.drop_fn else {
                continue;
            };
            if col.field_offsets.is_empty() {
                drop_fn(self.raw_component_ptr(col, row));
            } else {
                for i in 0..col.field_sizes.len() {
                    drop_fn(self.raw_field_ptr(col, i, row));
                }
            }
        }
    }

    /// Swap-removes `row` from its partition (§4.C `remove_row`). Returns
    /// the entity that was moved into `row`'s old slot, if any (the caller
    /// must update that entity's directory record), and whether the
    /// removed row itself was in the disabled partition.
    pub fn remove_row(&mut self, layout: &ArchetypeLayout, row: u16) -> RemoveOutcome {
        debug_assert!(row < self.count);
        unsafe { self.drop_row_values(layout, row) };

        if row < self.disabled_count {
            let last_disabled = self.disabled_count - 1;
            let moved = if row != last_disabled {
                unsafe { self.copy_row(layout, row, last_disabled) };
                Some((self.entity_at(row), row))
            } else {
                None
            };
            self.disabled_count -= 1;
            self.count -= 1;
            RemoveOutcome { moved }
        } else {
            let last_enabled = self.count - 1;
            let moved = if row != last_enabled {
                unsafe { self.copy_row(layout, row, last_enabled) };
                Some((self.entity_at(row), row))
            } else {
                None
            };
            self.count -= 1;
            RemoveOutcome { moved }
        }
    }

    /// Moves `row` across the enabled/disabled partition boundary (§4.C
    /// `enable`). Returns `None` if the row is already on the requested
    /// side (idempotence, §8); otherwise the toggled entity's new row and,
    /// if a second entity was swapped to make room, its entity and new row.
    pub fn set_enabled(
        &mut self,
        layout: &ArchetypeLayout,
        row: u16,
        enabled: bool,
    ) -> Option<EnableOutcome> {
        let currently_enabled = row >= self.disabled_count;
        if currently_enabled == enabled {
            return None;
        }
        let target = if enabled {
            // row is in [0, disabled_count); swap with the last disabled slot.
            self.disabled_count - 1
        } else {
            // row is in [disabled_count, count); swap with the first enabled slot.
            self.disabled_count
        };
        unsafe { self.swap_rows(layout, row, target) };
        if enabled {
            self.disabled_count -= 1;
        } else {
            self.disabled_count += 1;
        }
        let displaced = if target != row {
            Some((self.entity_at(row), row))
        } else {
            None
        };
        Some(EnableOutcome {
            new_row: target,
            displaced,
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        (0..self.count).map(move |r| self.entity_at(r))
    }
}

/// Outcome of [`Chunk::remove_row`]: the entity (if any) that was
/// swap-moved into the vacated slot, and the row it now occupies.
pub(crate) struct RemoveOutcome {
    pub moved: Option<(Entity, u16)>,
}

/// Outcome of [`Chunk::set_enabled`].
pub(crate) struct EnableOutcome {
    pub new_row: u16,
    pub displaced: Option<(Entity, u16)>,
}

fn swap_bytes(a: *mut u8, b: *mut u8, len: usize) {
    unsafe {
        for i in 0..len {
            core::ptr::swap(a.add(i), b.add(i));
        }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // Values are dropped explicitly via `release()`, which consumes
        // the chunk; reaching this means a Chunk was dropped without going
        // through the archetype's teardown path, which would either leak
        // (fine, if it already released memory) or double free. Treat it
        // as a programmer error rather than silently leaking component
        // values.
        if self.count != 0 {
            log::error!("Chunk dropped with {} live rows and no release()", self.count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archetype::layout::compute_layout,
        chunk::allocator::{ChunkAllocator, ChunkAllocatorConfig},
        component::ComponentRegistry,
        entity::EntityDirectory,
    };

    #[derive(Clone, Copy)]
    struct Position {
        x: f32,
        y: f32,
    }

    fn fixture() -> (ChunkAllocator, ArchetypeLayout, crate::component::ComponentId) {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Position>();
        let descs = vec![reg.describe(id)];
        let layout = compute_layout(&descs, &ChunkAllocatorConfig::default());
        let alloc = ChunkAllocator::new(ChunkAllocatorConfig::default());
        (alloc, layout, id)
    }

    fn write_position(chunk: &Chunk, layout: &ArchetypeLayout, id: crate::component::ComponentId, row: u16, value: Position) {
        let col = layout.column(id).unwrap();
        unsafe {
            core::ptr::write(chunk.raw_component_ptr(col, row).as_ptr().cast::<Position>(), value);
        }
    }

    fn read_position(chunk: &Chunk, layout: &ArchetypeLayout, id: crate::component::ComponentId, row: u16) -> Position {
        let col = layout.column(id).unwrap();
        unsafe { *chunk.raw_component_ptr(col, row).as_ptr().cast::<Position>() }
    }

    #[test]
    fn add_row_then_read_back() {
        let (mut alloc, layout, id) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let e0 = dir.allocate();
        let (row, displaced) = chunk.add_row(&layout, e0);
        assert_eq!(row, 0);
        assert!(displaced.is_none());
        write_position(&chunk, &layout, id, row, Position { x: 1.0, y: 2.0 });
        assert_eq!(chunk.entity_at(0), e0);
        let p = read_position(&chunk, &layout, id, 0);
        assert_eq!((p.x, p.y), (1.0, 2.0));
        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn remove_row_swaps_last_into_hole() {
        let (mut alloc, layout, id) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let e0 = dir.allocate();
        let e1 = dir.allocate();
        let (r0, _) = chunk.add_row(&layout, e0);
        write_position(&chunk, &layout, id, r0, Position { x: 1.0, y: 1.0 });
        let (r1, _) = chunk.add_row(&layout, e1);
        write_position(&chunk, &layout, id, r1, Position { x: 2.0, y: 2.0 });

        let outcome = chunk.remove_row(&layout, 0);
        assert_eq!(outcome.moved, Some((e1, 0)));
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.entity_at(0), e1);
        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn set_enabled_moves_across_partition_and_is_idempotent() {
        let (mut alloc, layout, _id) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let e0 = dir.allocate();
        let e1 = dir.allocate();
        chunk.add_row(&layout, e0);
        chunk.add_row(&layout, e1);
        assert_eq!(chunk.disabled_count(), 0);

        let outcome = chunk.set_enabled(&layout, 0, false).unwrap();
        assert_eq!(chunk.disabled_count(), 1);
        assert_eq!(chunk.entity_at(outcome.new_row), e0);

        // Already disabled: no-op.
        assert!(chunk.set_enabled(&layout, outcome.new_row, false).is_none());
        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn tick_lifespan_expires_after_configured_ticks() {
        let (mut alloc, layout, _id) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        assert!(!chunk.tick_lifespan(2));
        assert!(!chunk.is_full());
        assert!(!chunk.tick_lifespan(2));
        assert!(chunk.tick_lifespan(2));
        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn re_adding_a_row_resurrects_a_dying_chunk() {
        let (mut alloc, layout, _id) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let e0 = dir.allocate();
        chunk.add_row(&layout, e0);
        chunk.remove_row(&layout, 0);
        assert!(!chunk.tick_lifespan(5));
        chunk.add_row(&layout, e0);
        assert!(!chunk.is_dying());
        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn bump_column_version_is_observable() {
        let (mut alloc, layout, _id) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        assert_eq!(chunk.column_version(0), ColumnVersion::zero());
        let baseline = WorldVersion::zero();
        let mut world = baseline;
        chunk.bump_column_version(0, world.bump());
        assert!(chunk.column_version(0).is_newer_than(baseline));
        chunk.release(&mut alloc, &layout);
    }
}
