//! Per-archetype chunk layout computation (spec §4.D "Layout algorithm").

use crate::{
    chunk::allocator::{ChunkAllocatorConfig, ChunkSizeClass},
    component::{ComponentDescriptor, ComponentId, ComponentLayout, DropFn},
};
use smallvec::SmallVec;

/// Minimum row capacity we're willing to accept before falling back from
/// the small to the big size class (below this, chunk traversal overhead
/// dominates and the whole point of chunking is lost).
const MIN_ROW_CAPACITY: u32 = 8;

/// Byte size of the fixed chunk header (cache line, §4.C): owning
/// archetype/chunk index, counts, lock depth, lifespan countdown, and one
/// `u32` version counter per column, inlined up to 8 columns before
/// spilling (mirrors `smallvec`'s inline capacity elsewhere in this
/// crate).
pub(crate) const CHUNK_HEADER_RESERVE: usize = 64;

#[derive(Clone, Copy, Debug)]
pub struct ColumnLayout {
    pub component_id: ComponentId,
    /// Byte offset, within the chunk body, of this column's first element.
    pub offset: usize,
    /// For AoS: size of one element. For SoA: size of one packed group of
    /// `pack` elements of one field, repeated per field (decomposed further
    /// by `field_offsets`).
    pub element_size: usize,
    pub field_offsets: SmallVec<[usize; 4]>,
    pub field_sizes: SmallVec<[usize; 4]>,
    /// Copied from the component's descriptor at archetype-creation time
    /// (the same way the teacher crate embeds `ComponentInfo`, drop
    /// function pointer included, directly into its per-archetype
    /// `ComponentData` instead of re-resolving it through a registry on
    /// every row touch).
    pub drop_fn: Option<DropFn>,
}

impl ColumnLayout {
    pub fn needs_drop(&self) -> bool {
        self.drop_fn.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ArchetypeLayout {
    pub component_ids: SmallVec<[ComponentId; 8]>,
    pub columns: Vec<ColumnLayout>,
    pub capacity: u16,
    pub size_class: ChunkSizeClass,
    /// Offset of the entity-id column (always 0: it is placed first, §3).
    pub entity_column_offset: usize,
    pub entity_column_stride: usize,
}

impl ArchetypeLayout {
    pub fn column_offset(&self, id: ComponentId) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.component_id == id)
            .map(|c| c.offset)
    }

    pub fn column(&self, id: ComponentId) -> Option<&ColumnLayout> {
        self.columns.iter().find(|c| c.component_id == id)
    }

    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        self.columns.iter().position(|c| c.component_id == id)
    }
}

/// Computes the column offsets/strides and the row capacity for an
/// archetype given its (already sorted-by-id) component descriptors.
///
/// Implements the algorithm in spec §4.D: reserve the entity column, then
/// for each component in ascending id order align and reserve its column,
/// then pick the largest capacity that fits the chunk body. Because
/// per-column alignment padding makes the total a non-linear function of
/// capacity, the fit is found by a downward linear search from an
/// analytic upper bound rather than solved in closed form -- this runs
/// once per archetype, never on a hot path.
pub(crate) fn compute_layout(
    descriptors: &[&ComponentDescriptor],
    alloc_config: &ChunkAllocatorConfig,
) -> ArchetypeLayout {
    if descriptors.is_empty() {
        // No components to size against: the root (and any tag-only)
        // archetype is bounded only by the 16-bit row counter, not by the
        // chunk body fitting any column (§4.D).
        let (_, (columns, entity_stride)) = layout_for_capacity(descriptors, u16::MAX as u32);
        return ArchetypeLayout {
            component_ids: SmallVec::new(),
            columns,
            capacity: u16::MAX,
            size_class: ChunkSizeClass::Small,
            entity_column_offset: 0,
            entity_column_stride: entity_stride,
        };
    }

    let row_size: usize = core::mem::size_of::<u64>()
        + descriptors
            .iter()
            .map(|d| row_footprint_per_entity(d))
            .sum::<usize>();

    let small_bytes = ChunkSizeClass::Small.bytes(alloc_config);
    let big_bytes = ChunkSizeClass::Big.bytes(alloc_config);

    let small_capacity = capacity_for_body(small_bytes.saturating_sub(CHUNK_HEADER_RESERVE), row_size);
    let size_class = if small_capacity >= MIN_ROW_CAPACITY {
        ChunkSizeClass::Small
    } else {
        ChunkSizeClass::Big
    };
    let body_bytes = size_class.bytes(alloc_config).saturating_sub(CHUNK_HEADER_RESERVE);

    let mut capacity = capacity_for_body(body_bytes, row_size).max(1);
    loop {
        let (total, _) = layout_for_capacity(descriptors, capacity);
        if total <= body_bytes || capacity == 1 {
            break;
        }
        capacity -= 1;
    }

    let (_, (columns, entity_stride)) = {
        let (total, layout) = layout_for_capacity(descriptors, capacity);
        debug_assert!(
            total <= body_bytes || capacity == 1,
            "capacity search failed to converge"
        );
        (total, layout)
    };

    ArchetypeLayout {
        component_ids: descriptors.iter().map(|d| d.id()).collect(),
        columns,
        capacity: capacity as u16,
        size_class,
        entity_column_offset: 0,
        entity_column_stride: entity_stride,
    }
}

/// Rough per-entity byte cost, used only to seed the capacity search
/// (§4.D step 4); `layout_for_capacity` computes the exact footprint
/// including pack-width padding once a candidate capacity is chosen.
fn row_footprint_per_entity(d: &ComponentDescriptor) -> usize {
    match d.layout() {
        ComponentLayout::AoS => align_up(d.size() as usize, d.align() as usize),
        ComponentLayout::SoA { field_sizes, .. } => {
            field_sizes.iter().map(|&fs| fs as usize).sum()
        }
    }
}

fn capacity_for_body(body_bytes: usize, row_size: usize) -> u32 {
    ((body_bytes / row_size) as u32).min(u16::MAX as u32)
}

fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        return value;
    }
    (value + align - 1) & !(align - 1)
}

/// Lays out all columns for a trial `capacity`, returning the total byte
/// footprint and the per-column offsets.
fn layout_for_capacity(
    descriptors: &[&ComponentDescriptor],
    capacity: u32,
) -> (usize, (Vec<ColumnLayout>, usize)) {
    let capacity = capacity as usize;
    let mut offset = align_up(0, core::mem::align_of::<u64>());
    let entity_stride = core::mem::size_of::<u64>();
    offset += capacity * entity_stride;

    let mut columns = Vec::with_capacity(descriptors.len());
    for d in descriptors {
        offset = align_up(offset, d.align().max(1) as usize);
        match d.layout() {
            ComponentLayout::AoS => {
                let elem = d.size() as usize;
                columns.push(ColumnLayout {
                    component_id: d.id(),
                    offset,
                    element_size: elem,
                    field_offsets: SmallVec::new(),
                    field_sizes: SmallVec::new(),
                    drop_fn: d.drop_fn(),
                });
                offset += elem * capacity;
            }
            ComponentLayout::SoA { pack, field_sizes } => {
                let start = offset;
                let mut field_offsets = SmallVec::new();
                let mut sizes = SmallVec::new();
                for &fs in field_sizes.iter() {
                    offset = align_up(offset, (*pack as usize * fs as usize).max(1));
                    field_offsets.push(offset);
                    sizes.push(fs as usize);
                    offset += fs as usize * capacity;
                }
                columns.push(ColumnLayout {
                    component_id: d.id(),
                    offset: start,
                    element_size: 0,
                    field_offsets,
                    field_sizes: sizes,
                    drop_fn: d.drop_fn(),
                });
            }
        }
    }

    (offset, (columns, entity_stride))
}
