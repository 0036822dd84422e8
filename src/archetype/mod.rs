//! Archetype: owns the chunks for one component-id set (spec §4.D).

pub mod graph;
pub(crate) mod layout;

pub use graph::ArchetypeGraph;

use {
    crate::{
        chunk::{allocator::ChunkAllocator, Chunk},
        component::{ComponentId, ComponentRegistry},
        entity::Entity,
        error::fatal,
    },
    hashbrown::HashMap,
    layout::ArchetypeLayout,
    smallvec::SmallVec,
};

/// Stable index into an [`ArchetypeGraph`]'s arena. Edges reference
/// archetypes by this index rather than by pointer so the arena can grow
/// without invalidating existing edges (Design Notes §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    pub const ROOT: ArchetypeId = ArchetypeId(0);
    pub(crate) const NONE: ArchetypeId = ArchetypeId(u32::MAX);
}

/// Index of a chunk within its owning archetype's chunk list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkId(pub(crate) u32);

impl ChunkId {
    pub(crate) const NONE: ChunkId = ChunkId(u32::MAX);
}

/// Owns the chunks for one archetype, i.e. one component-id set (§4.D).
pub struct Archetype {
    id: ArchetypeId,
    layout: ArchetypeLayout,
    chunks: Vec<Chunk>,
    entity_count: u32,
    pub(crate) add_edges: HashMap<ComponentId, ArchetypeId>,
    pub(crate) remove_edges: HashMap<ComponentId, ArchetypeId>,
}

impl Archetype {
    pub(crate) fn new(
        id: ArchetypeId,
        descriptors: &[&crate::component::ComponentDescriptor],
        alloc_config: &crate::chunk::allocator::ChunkAllocatorConfig,
    ) -> Self {
        let layout = layout::compute_layout(descriptors, alloc_config);
        Archetype {
            id,
            layout,
            chunks: Vec::new(),
            entity_count: 0,
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn component_ids(&self) -> SmallVec<[ComponentId; 8]> {
        self.layout.component_ids.clone()
    }

    pub fn has_component(&self, id: ComponentId) -> bool {
        self.layout.component_ids.contains(&id)
    }

    pub fn layout(&self) -> &ArchetypeLayout {
        &self.layout
    }

    pub fn chunk(&self, id: ChunkId) -> &Chunk {
        &self.chunks[id.0 as usize]
    }

    pub(crate) fn chunk_mut(&mut self, id: ChunkId) -> &mut Chunk {
        &mut self.chunks[id.0 as usize]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_ids(&self) -> impl Iterator<Item = ChunkId> {
        (0..self.chunks.len() as u32).map(ChunkId)
    }

    pub fn entity_count(&self) -> u32 {
        self.entity_count
    }

    /// Finds a chunk with spare room for one more row, preferring the last
    /// chunk to keep inserts contiguous (Design Notes §9's "prefer last"
    /// policy, the default this spec mandates), allocating a new chunk if
    /// none has room.
    fn chunk_with_room(&mut self, allocator: &mut ChunkAllocator) -> ChunkId {
        if let Some(last) = self.chunks.last() {
            if !last.is_full() {
                return ChunkId(self.chunks.len() as u32 - 1);
            }
        }
        if self.chunks.len() >= u32::MAX as usize {
            fatal("archetype has too many chunks");
        }
        self.chunks.push(Chunk::new(allocator, &self.layout));
        ChunkId(self.chunks.len() as u32 - 1)
    }

    /// Reserves a row for `entity`, resurrecting a dying chunk if the
    /// chosen chunk was about to be GC'd (§4.C lifecycle). Returns the
    /// chunk and row, plus the relocation of any row the insert displaced
    /// (when the target chunk had disabled rows, §4.C `add_row`).
    pub(crate) fn insert(
        &mut self,
        allocator: &mut ChunkAllocator,
        entity: Entity,
    ) -> (ChunkId, u16, Option<(Entity, ChunkId, u16)>) {
        let chunk_id = self.chunk_with_room(allocator);
        let chunk = self.chunk_mut(chunk_id);
        let (row, displaced) = chunk.add_row(&self.layout, entity);
        self.entity_count += 1;
        (
            chunk_id,
            row,
            displaced.map(|(e, r)| (e, chunk_id, r)),
        )
    }

    /// Removes the row at `(chunk_id, row)`, dropping its component values
    /// and swap-removing within the partition (§4.C `remove_row`). Returns
    /// the entity relocated into the vacated slot, if any.
    pub(crate) fn remove(
        &mut self,
        chunk_id: ChunkId,
        row: u16,
    ) -> Option<(Entity, ChunkId, u16)> {
        let layout = &self.layout;
        let chunk = &mut self.chunks[chunk_id.0 as usize];
        let outcome = chunk.remove_row(layout, row);
        self.entity_count -= 1;
        outcome.moved.map(|(e, r)| (e, chunk_id, r))
    }

    /// Toggles `row`'s enabled state. Returns `None` if already in the
    /// requested state; otherwise the toggled row's new location and, if a
    /// second entity was swapped to make room, that entity's new location.
    pub(crate) fn set_enabled(
        &mut self,
        chunk_id: ChunkId,
        row: u16,
        enabled: bool,
    ) -> Option<((ChunkId, u16), Option<(Entity, ChunkId, u16)>)> {
        let layout = &self.layout;
        let chunk = &mut self.chunks[chunk_id.0 as usize];
        chunk.set_enabled(layout, row, enabled).map(|outcome| {
            (
                (chunk_id, outcome.new_row),
                outcome.displaced.map(|(e, r)| (e, chunk_id, r)),
            )
        })
    }

    /// Runs GC over this archetype's chunks: ticks the lifespan countdown
    /// of every empty chunk and frees those that expire, as long as they
    /// are not locked (§4.C lifecycle, Design Notes §9 open question (a):
    /// "defragmentation runs only in update() and only when no chunk is
    /// locked").
    pub(crate) fn gc(&mut self, allocator: &mut ChunkAllocator, lifespan_ticks: u8) {
        let mut i = 0;
        while i < self.chunks.len() {
            let expired = {
                let chunk = &mut self.chunks[i];
                if !chunk.is_empty() || chunk.is_locked() {
                    false
                } else {
                    chunk.tick_lifespan(lifespan_ticks)
                }
            };
            if expired {
                let chunk = self.chunks.remove(i);
                chunk.release(allocator, &self.layout);
                log::debug!("archetype {:?}: released empty chunk", self.id);
            } else {
                i += 1;
            }
        }
    }

    /// Frees every chunk back to the allocator. Used by `World`'s teardown
    /// so dropping a store doesn't leak chunk memory.
    pub(crate) fn release_all_chunks(&mut self, allocator: &mut ChunkAllocator) {
        for chunk in self.chunks.drain(..) {
            chunk.release(allocator, &self.layout);
        }
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        if !self.chunks.is_empty() {
            log::warn!(
                "archetype {:?} dropped with {} chunks still allocated (leaked: store teardown doesn't run the allocator)",
                self.id,
                self.chunks.len()
            );
        }
    }
}
