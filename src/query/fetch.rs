//! Typed row views for query iteration (spec §4.H "typed views").
//!
//! `Read<T>`/`Write<T>` are zero-sized markers, the same role the teacher
//! crate's own `Read<T>`/`Write<T>` play: they carry no data, only select
//! which component column to fetch and whether the access counts as a
//! write for version-bumping purposes. Tuples of up to four markers are
//! supported, generated with the teacher's `for_sequences!` macro idiom
//! (`tuples.rs`), capped at four rather than the teacher's letter list
//! because this spec's row callbacks rarely join more than a few
//! components at once.

use crate::{
    archetype::layout::ArchetypeLayout,
    chunk::Chunk,
    component::{Component, ComponentId, ComponentRegistry},
};
use core::marker::PhantomData;
use smallvec::SmallVec;

/// Declares immutable access to component `T`: filters out archetypes
/// missing it, yields `&T`, never bumps its column version.
pub struct Read<T>(PhantomData<fn() -> T>);

impl<T> Default for Read<T> {
    fn default() -> Self {
        Read(PhantomData)
    }
}

impl<T> Read<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Declares mutable access to component `T`: filters out archetypes
/// missing it, yields `&mut T`, bumps its column version on fetch.
pub struct Write<T>(PhantomData<fn() -> T>);

impl<T> Default for Write<T> {
    fn default() -> Self {
        Write(PhantomData)
    }
}

impl<T> Write<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The lifetime-independent half of a fetch leg: which component ids it
/// needs and whether it counts as a write. Split out of [`Fetch`] so a
/// query built over `Q: for<'a> Fetch<'a>` can call `Q::register_ids` /
/// `Q::is_write` without naming a specific `'a` -- as a supertrait with no
/// lifetime parameter of its own, it resolves unambiguously regardless of
/// how many lifetimes `Fetch` is implemented for.
pub trait FetchShape {
    fn register_ids(registry: &mut ComponentRegistry, ids: &mut SmallVec<[ComponentId; 8]>);
    fn is_write(write: &mut SmallVec<[bool; 8]>);
}

/// One leg of a row callback's argument tuple: resolves to a component id
/// at query-build time (appended to `ids` in tuple order) and a typed
/// pointer dereference per row at iteration time (consuming one id per
/// leg from that same slice, via `cursor`).
///
/// # Safety
/// `fetch_at` casts the chunk's raw column bytes to `Self::Item`; the
/// caller (the query iterator) must guarantee `row < chunk.len()` and
/// that no two legs of the same tuple alias the same component (checked
/// at query build time, see [`assert_no_duplicate_fetches`]).
pub unsafe trait Fetch<'a>: FetchShape {
    type Item;

    /// Fetches this leg's item, consuming one entry from `ids` starting at
    /// `*cursor` and advancing it.
    unsafe fn fetch_at(
        chunk: &'a Chunk,
        layout: &ArchetypeLayout,
        ids: &[ComponentId],
        cursor: &mut usize,
        row: u16,
    ) -> Self::Item;
}

impl<T: Component> FetchShape for Read<T> {
    fn register_ids(registry: &mut ComponentRegistry, ids: &mut SmallVec<[ComponentId; 8]>) {
        ids.push(registry.register::<T>());
    }

    fn is_write(write: &mut SmallVec<[bool; 8]>) {
        write.push(false);
    }
}

unsafe impl<'a, T: Component> Fetch<'a> for Read<T> {
    type Item = &'a T;

    unsafe fn fetch_at(
        chunk: &'a Chunk,
        layout: &ArchetypeLayout,
        ids: &[ComponentId],
        cursor: &mut usize,
        row: u16,
    ) -> &'a T {
        let id = ids[*cursor];
        *cursor += 1;
        let col = layout.column(id).expect("fetch: archetype missing queried component");
        &*chunk.raw_component_ptr(col, row).as_ptr().cast::<T>()
    }
}

impl<T: Component> FetchShape for Write<T> {
    fn register_ids(registry: &mut ComponentRegistry, ids: &mut SmallVec<[ComponentId; 8]>) {
        ids.push(registry.register::<T>());
    }

    fn is_write(write: &mut SmallVec<[bool; 8]>) {
        write.push(true);
    }
}

unsafe impl<'a, T: Component> Fetch<'a> for Write<T> {
    type Item = &'a mut T;

    unsafe fn fetch_at(
        chunk: &'a Chunk,
        layout: &ArchetypeLayout,
        ids: &[ComponentId],
        cursor: &mut usize,
        row: u16,
    ) -> &'a mut T {
        let id = ids[*cursor];
        *cursor += 1;
        let col = layout.column(id).expect("fetch: archetype missing queried component");
        &mut *chunk.raw_component_ptr(col, row).as_ptr().cast::<T>()
    }
}

/// One leg of a chunk-slice callback's argument tuple (§4.H "Full
/// iterator"): the same column selection as [`Fetch`], but resolved once
/// per visited chunk as a slice over `lo..hi` rather than once per row.
///
/// # Safety
/// Same contract as [`Fetch::fetch_at`], applied to the whole `lo..hi`
/// range at once.
pub unsafe trait FetchSlice<'a>: FetchShape {
    type Item;

    unsafe fn fetch_slice(
        chunk: &'a Chunk,
        layout: &ArchetypeLayout,
        ids: &[ComponentId],
        cursor: &mut usize,
        lo: u16,
        hi: u16,
    ) -> Self::Item;
}

unsafe impl<'a, T: Component> FetchSlice<'a> for Read<T> {
    type Item = &'a [T];

    unsafe fn fetch_slice(
        chunk: &'a Chunk,
        layout: &ArchetypeLayout,
        ids: &[ComponentId],
        cursor: &mut usize,
        lo: u16,
        hi: u16,
    ) -> &'a [T] {
        let id = ids[*cursor];
        *cursor += 1;
        let col = layout.column(id).expect("fetch: archetype missing queried component");
        let ptr = chunk.raw_component_ptr(col, lo).as_ptr().cast::<T>();
        core::slice::from_raw_parts(ptr, (hi - lo) as usize)
    }
}

unsafe impl<'a, T: Component> FetchSlice<'a> for Write<T> {
    type Item = &'a mut [T];

    unsafe fn fetch_slice(
        chunk: &'a Chunk,
        layout: &ArchetypeLayout,
        ids: &[ComponentId],
        cursor: &mut usize,
        lo: u16,
        hi: u16,
    ) -> &'a mut [T] {
        let id = ids[*cursor];
        *cursor += 1;
        let col = layout.column(id).expect("fetch: archetype missing queried component");
        let ptr = chunk.raw_component_ptr(col, lo).as_ptr().cast::<T>();
        core::slice::from_raw_parts_mut(ptr, (hi - lo) as usize)
    }
}

/// Debug-only sanity check: a fetch tuple must not name the same
/// component twice, since `Fetch::fetch_at` hands out an unchecked `&mut`
/// alongside any other leg's reference to the same bytes.
pub(crate) fn assert_no_duplicate_fetches(ids: &[ComponentId]) {
    debug_assert!(
        {
            let mut seen: SmallVec<[ComponentId; 8]> = SmallVec::new();
            ids.iter().all(|id| {
                let fresh = !seen.contains(id);
                seen.push(*id);
                fresh
            })
        },
        "query fetch tuple names the same component more than once"
    );
}

macro_rules! for_sequences {
    ($action:ident) => {
        for_sequences!([POP $action] [A, B, C, D]);
    };

    ([POP $action:ident] []) => {};

    ([POP $action:ident] [$head:ident $(,$tail:ident)*]) => {
        for_sequences!([$action] [$head $(,$tail)*]);
        for_sequences!([POP $action] [$($tail),*]);
    };

    ([$action:ident] [$($a:ident),*]) => {
        $action!($($a),*);
    };
}

macro_rules! fetch_tuple {
    ($($a:ident),+) => {
        impl<$($a: FetchShape),+> FetchShape for ($($a,)+) {
            fn register_ids(registry: &mut ComponentRegistry, ids: &mut SmallVec<[ComponentId; 8]>) {
                $($a::register_ids(registry, ids);)+
            }

            fn is_write(write: &mut SmallVec<[bool; 8]>) {
                $($a::is_write(write);)+
            }
        }

        unsafe impl<'a, $($a: Fetch<'a>),+> Fetch<'a> for ($($a,)+) {
            type Item = ($($a::Item,)+);

            unsafe fn fetch_at(
                chunk: &'a Chunk,
                layout: &ArchetypeLayout,
                ids: &[ComponentId],
                cursor: &mut usize,
                row: u16,
            ) -> Self::Item {
                ($($a::fetch_at(chunk, layout, ids, cursor, row),)+)
            }
        }

        unsafe impl<'a, $($a: FetchSlice<'a>),+> FetchSlice<'a> for ($($a,)+) {
            type Item = ($($a::Item,)+);

            unsafe fn fetch_slice(
                chunk: &'a Chunk,
                layout: &ArchetypeLayout,
                ids: &[ComponentId],
                cursor: &mut usize,
                lo: u16,
                hi: u16,
            ) -> Self::Item {
                ($($a::fetch_slice(chunk, layout, ids, cursor, lo, hi),)+)
            }
        }
    };
}

for_sequences!(fetch_tuple);

/// The zero-leg fetch: matches every archetype (an empty `all` set) and
/// hands the callback nothing but the entity. Used for queries that only
/// care which entities exist, e.g. "every entity regardless of components".
impl FetchShape for () {
    fn register_ids(_registry: &mut ComponentRegistry, _ids: &mut SmallVec<[ComponentId; 8]>) {}

    fn is_write(_write: &mut SmallVec<[bool; 8]>) {}
}

unsafe impl<'a> Fetch<'a> for () {
    type Item = ();

    unsafe fn fetch_at(
        _chunk: &'a Chunk,
        _layout: &ArchetypeLayout,
        _ids: &[ComponentId],
        _cursor: &mut usize,
        _row: u16,
    ) {
    }
}

unsafe impl<'a> FetchSlice<'a> for () {
    type Item = ();

    unsafe fn fetch_slice(
        _chunk: &'a Chunk,
        _layout: &ArchetypeLayout,
        _ids: &[ComponentId],
        _cursor: &mut usize,
        _lo: u16,
        _hi: u16,
    ) {
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

    #[derive(Clone, Copy, PartialEq, Debug)]
    struct Mass(f32);
    #[derive(Clone, Copy, PartialEq, Debug)]
    struct Tag(u32);

    fn fixture() -> (ChunkAllocator, ArchetypeLayout, ComponentRegistry) {
        let mut reg = ComponentRegistry::new();
        let mass = reg.register::<Mass>();
        let tag = reg.register::<Tag>();
        let descs = vec![reg.describe(mass), reg.describe(tag)];
        let layout = compute_layout(&descs, &ChunkAllocatorConfig::default());
        let alloc = ChunkAllocator::new(ChunkAllocatorConfig::default());
        (alloc, layout, reg)
    }

    #[test]
    fn read_fetch_returns_shared_reference_to_stored_value() {
        let (mut alloc, layout, mut reg) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let e0 = dir.allocate();
        let (row, _) = chunk.add_row(&layout, e0);
        let col = layout.column(reg.register::<Mass>()).unwrap();
        unsafe { core::ptr::write(chunk.raw_component_ptr(col, row).as_ptr().cast::<Mass>(), Mass(4.0)) };

        let mut ids: SmallVec<[ComponentId; 8]> = SmallVec::new();
        Read::<Mass>::register_ids(&mut reg, &mut ids);
        let mut cursor = 0usize;
        let got = unsafe { Read::<Mass>::fetch_at(&chunk, &layout, &ids, &mut cursor, row) };
        assert_eq!(*got, Mass(4.0));
        assert_eq!(cursor, 1);

        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn write_fetch_allows_in_place_mutation() {
        let (mut alloc, layout, mut reg) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let e0 = dir.allocate();
        let (row, _) = chunk.add_row(&layout, e0);
        let col = layout.column(reg.register::<Tag>()).unwrap();
        unsafe { core::ptr::write(chunk.raw_component_ptr(col, row).as_ptr().cast::<Tag>(), Tag(1)) };

        let mut ids: SmallVec<[ComponentId; 8]> = SmallVec::new();
        Write::<Tag>::register_ids(&mut reg, &mut ids);
        let mut cursor = 0usize;
        let got = unsafe { Write::<Tag>::fetch_at(&chunk, &layout, &ids, &mut cursor, row) };
        got.0 = 7;

        let col = layout.column(ids[0]).unwrap();
        let after = unsafe { *chunk.raw_component_ptr(col, row).as_ptr().cast::<Tag>() };
        assert_eq!(after, Tag(7));

        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn tuple_fetch_consumes_ids_in_declared_order() {
        let (mut alloc, layout, mut reg) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let e0 = dir.allocate();
        let (row, _) = chunk.add_row(&layout, e0);
        let mass_col = layout.column(reg.register::<Mass>()).unwrap();
        unsafe { core::ptr::write(chunk.raw_component_ptr(mass_col, row).as_ptr().cast::<Mass>(), Mass(2.5)) };
        let tag_col = layout.column(reg.register::<Tag>()).unwrap();
        unsafe { core::ptr::write(chunk.raw_component_ptr(tag_col, row).as_ptr().cast::<Tag>(), Tag(9)) };

        type Q = (Read<Mass>, Read<Tag>);
        let mut ids: SmallVec<[ComponentId; 8]> = SmallVec::new();
        Q::register_ids(&mut reg, &mut ids);
        assert_eq!(ids.len(), 2);

        let mut cursor = 0usize;
        let (mass, tag) = unsafe { Q::fetch_at(&chunk, &layout, &ids, &mut cursor, row) };
        assert_eq!(*mass, Mass(2.5));
        assert_eq!(*tag, Tag(9));
        assert_eq!(cursor, 2);

        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn is_write_flags_match_leg_kind() {
        let mut write: SmallVec<[bool; 8]> = SmallVec::new();
        <(Read<Mass>, Write<Tag>) as FetchShape>::is_write(&mut write);
        assert_eq!(&write[..], &[false, true]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn duplicate_fetch_ids_trip_the_debug_assertion() {
        let ids = [ComponentId(0), ComponentId(0)];
        assert_no_duplicate_fetches(&ids);
    }

    #[test]
    fn read_fetch_slice_covers_requested_row_range() {
        let (mut alloc, layout, mut reg) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let col = layout.column(reg.register::<Mass>()).unwrap();
        for i in 0..4 {
            let e = dir.allocate();
            let (row, _) = chunk.add_row(&layout, e);
            unsafe { core::ptr::write(chunk.raw_component_ptr(col, row).as_ptr().cast::<Mass>(), Mass(i as f32)) };
        }

        let mut ids: SmallVec<[ComponentId; 8]> = SmallVec::new();
        Read::<Mass>::register_ids(&mut reg, &mut ids);
        let mut cursor = 0usize;
        let got = unsafe { Read::<Mass>::fetch_slice(&chunk, &layout, &ids, &mut cursor, 1, 4) };
        assert_eq!(got, &[Mass(1.0), Mass(2.0), Mass(3.0)]);
        assert_eq!(cursor, 1);

        chunk.release(&mut alloc, &layout);
    }

    #[test]
    fn unit_fetch_registers_no_ids_and_yields_unit() {
        let mut reg = ComponentRegistry::new();
        let mut ids: SmallVec<[ComponentId; 8]> = SmallVec::new();
        <() as FetchShape>::register_ids(&mut reg, &mut ids);
        assert!(ids.is_empty());

        let (mut alloc, layout, _reg2) = fixture();
        let mut chunk = Chunk::new(&mut alloc, &layout);
        let mut dir = EntityDirectory::new();
        let e0 = dir.allocate();
        let (row, _) = chunk.add_row(&layout, e0);
        let mut cursor = 0usize;
        let item = unsafe { <()>::fetch_at(&chunk, &layout, &ids, &mut cursor, row) };
        assert_eq!(item, ());
        assert_eq!(cursor, 0);
        chunk.release(&mut alloc, &layout);
    }
}
