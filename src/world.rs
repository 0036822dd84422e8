//! The store itself: entity lifecycle, component mutation, and the glue
//! between the directory, registry, archetype graph and chunk allocator
//! (spec §6 "External interfaces").

use crate::{
    archetype::{ArchetypeGraph, ArchetypeId},
    chunk::allocator::{ChunkAllocator, ChunkAllocatorConfig},
    component::{self, Component, ComponentId, ComponentRegistry},
    entity::{Entity, EntityDirectory, Location},
    error::{EcsError, EcsResult},
    query::{compiler::QueryKey, iter::QueryBuilder, vm::CompiledQuery},
    version::WorldVersion,
};
use hashbrown::HashMap;

/// Tunables carried into a `World` at construction (spec §10.3).
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub chunk: ChunkAllocatorConfig,
    /// Archetypes may not grow past this many distinct components (§7
    /// `CapacityExceeded`).
    pub max_components_per_archetype: usize,
    /// Number of `update()` ticks an empty chunk survives before being
    /// released (§4.C, confirmed as 15 by `original_source/`'s 4-bit
    /// countdown field, see SPEC_FULL.md §11).
    pub chunk_gc_lifespan_ticks: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            chunk: ChunkAllocatorConfig::default(),
            max_components_per_archetype: 32,
            chunk_gc_lifespan_ticks: 15,
        }
    }
}

/// Owns every subsystem named in spec §2: the directory, registry,
/// archetype graph, chunk allocator, world version, and query cache.
/// Nothing here is process-wide (Design Notes §9 "Global state") except
/// the `ComponentId` assignment itself, which lives in `component.rs`.
pub struct World {
    directory: EntityDirectory,
    registry: ComponentRegistry,
    graph: ArchetypeGraph,
    allocator: ChunkAllocator,
    version: WorldVersion,
    config: StoreConfig,
    queries: HashMap<QueryKey, CompiledQuery>,
}

impl Default for World {
    fn default() -> Self {
        World::with_config(StoreConfig::default())
    }
}

impl World {
    pub fn new() -> Self {
        World::default()
    }

    pub fn with_config(config: StoreConfig) -> Self {
        World {
            directory: EntityDirectory::new(),
            registry: ComponentRegistry::new(),
            graph: ArchetypeGraph::new(&config.chunk),
            allocator: ChunkAllocator::new(config.chunk),
            version: WorldVersion::zero(),
            config,
            queries: HashMap::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Number of distinct archetypes the graph has discovered so far,
    /// including the always-present empty root archetype (§8 "the
    /// archetype graph contains exactly N archetypes").
    pub fn archetype_count(&self) -> usize {
        self.graph.len()
    }

    pub(crate) fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Registers `T` with clone support (§6), enabling `create_entity_like`
    /// to copy it onto a new entity.
    pub fn register_clone<T: Component + Clone>(&mut self) -> ComponentId {
        self.registry.register_clone::<T>()
    }

    /// Registers `T` with equality support (§7), enabling the "silent
    /// no-op on identical value" branch of `add_component`'s
    /// `DuplicateComponent` handling.
    pub fn register_eq<T: Component + PartialEq>(&mut self) -> ComponentId {
        self.registry.register_eq::<T>()
    }

    /// Declares `T` as struct-of-arrays, so its columns decompose into one
    /// contiguous sub-array per field instead of one interleaved element
    /// per row (§3, §4.D). Must be called before the first entity carrying
    /// `T` is created; field values are accessed afterwards through
    /// [`World::get_soa_field`] / [`World::set_soa_field`].
    pub fn register_soa<T: Component>(
        &mut self,
        pack: component::PackWidth,
        field_sizes: &[u32],
    ) -> ComponentId {
        self.registry.register_soa::<T>(pack, field_sizes)
    }

    pub(crate) fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut ArchetypeGraph {
        &mut self.graph
    }

    pub(crate) fn version(&self) -> WorldVersion {
        self.version
    }

    pub(crate) fn bump_version(&mut self) -> WorldVersion {
        self.version.bump()
    }

    /// Looks up (or compiles) the cached query for `key` and incrementally
    /// matches it against the current archetype graph (§4.G "Incremental
    /// matching"). Splits the borrow of `self.graph` from `self.queries`
    /// directly, since both are plain fields of `World`.
    pub(crate) fn refresh_query(&mut self, key: QueryKey) -> QueryRefresh {
        let graph = &self.graph;
        let compiled = self
            .queries
            .entry(key.clone())
            .or_insert_with(|| CompiledQuery::new(key));
        compiled.refresh(graph);
        let bootstrap = compiled.observed_version().is_none();
        let observed = compiled.observed_version().unwrap_or(WorldVersion::zero());
        QueryRefresh {
            matched: compiled.matched().to_vec(),
            changed: compiled.key().changed.clone(),
            observed,
            bootstrap,
        }
    }

    pub(crate) fn finish_query(&mut self, key: &QueryKey, observed_version: WorldVersion) {
        if let Some(compiled) = self.queries.get_mut(key) {
            compiled.set_observed_version(observed_version);
        }
    }

    /// Starts a query against this store (§6 `query()`).
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Allocates a new entity with no components, placed in the root
    /// archetype (§3 "current archetype (or root archetype if entity has
    /// no components)").
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.directory.allocate();
        self.place_in_root(entity);
        self.version.bump();
        entity
    }

    fn place_in_root(&mut self, entity: Entity) {
        let root = self.graph.get_mut(ArchetypeId::ROOT);
        let (chunk, row, displaced) = root.insert(&mut self.allocator, entity);
        self.directory.relocate(
            entity,
            Location {
                archetype: ArchetypeId::ROOT,
                chunk,
                row,
            },
        );
        if let Some((displaced_entity, displaced_row)) = displaced {
            self.directory.relocate(
                displaced_entity,
                Location {
                    archetype: ArchetypeId::ROOT,
                    chunk,
                    row: displaced_row,
                },
            );
        }
    }

    /// Creates a new entity and copies every clonable component from
    /// `source` onto it (§6 `create_entity_like`). Components registered
    /// without `register_clone` are silently omitted: there is no
    /// descriptor-level way to copy them (§4.A).
    pub fn create_entity_like(&mut self, source: Entity) -> EcsResult<Entity> {
        let loc = self.directory.locate(source).ok_or(EcsError::InvalidHandle)?;
        let source_archetype = self.graph.get(loc.archetype);
        let component_ids: smallvec::SmallVec<[ComponentId; 8]> = source_archetype.component_ids();
        let layout = source_archetype.layout().clone();

        let target = self.directory.allocate();
        self.place_in_root(target);

        for id in component_ids {
            let descriptor = self.registry.describe(id);
            let Some(clone_fn) = descriptor.clone_fn() else {
                continue;
            };
            let col = layout.column(id).expect("component id present in archetype's own layout");
            let src_chunk = self.graph.get(loc.archetype).chunk(loc.chunk);
            let src_ptr = if col.field_offsets.is_empty() {
                Some(unsafe { src_chunk.raw_component_ptr(col, loc.row) })
            } else {
                None // SoA clone is not supported by the single-entity path; see DESIGN.md.
            };
            let Some(src_ptr) = src_ptr else { continue };

            self.transition_add(target, id)?;
            let target_loc = self.directory.locate(target).unwrap();
            let target_archetype = self.graph.get(target_loc.archetype);
            let target_col = target_archetype
                .layout()
                .column(id)
                .expect("just-added component must be present in its own archetype");
            let target_chunk = target_archetype.chunk(target_loc.chunk);
            let dst_ptr = unsafe { target_chunk.raw_component_ptr(target_col, target_loc.row) };
            unsafe { clone_fn(src_ptr, dst_ptr) };
        }

        Ok(target)
    }

    /// Removes `entity` from the store, dropping every component value it
    /// held, and releases its id back to the directory's free list.
    pub fn delete_entity(&mut self, entity: Entity) -> EcsResult<()> {
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        let archetype = self.graph.get_mut(loc.archetype);
        if let Some((moved_entity, _, moved_row)) = archetype.remove(loc.chunk, loc.row) {
            self.directory.relocate(
                moved_entity,
                Location {
                    archetype: loc.archetype,
                    chunk: loc.chunk,
                    row: moved_row,
                },
            );
        }
        self.directory.release(entity);
        self.version.bump();
        Ok(())
    }

    /// Toggles `entity`'s enabled flag (§6 `enable_entity`, §8
    /// idempotence).
    pub fn enable_entity(&mut self, entity: Entity, enabled: bool) -> EcsResult<()> {
        if !self.directory.is_valid(entity) {
            return Err(EcsError::InvalidHandle);
        }
        if self.directory.is_enabled(entity) == Some(enabled) {
            return Ok(());
        }
        let loc = self.directory.locate(entity).unwrap();
        let archetype = self.graph.get_mut(loc.archetype);
        if let Some(((new_chunk, new_row), displaced)) = archetype.set_enabled(loc.chunk, loc.row, enabled) {
            self.directory.relocate(
                entity,
                Location {
                    archetype: loc.archetype,
                    chunk: new_chunk,
                    row: new_row,
                },
            );
            if let Some((displaced_entity, displaced_chunk, displaced_row)) = displaced {
                self.directory.relocate(
                    displaced_entity,
                    Location {
                        archetype: loc.archetype,
                        chunk: displaced_chunk,
                        row: displaced_row,
                    },
                );
            }
        }
        self.directory.set_enabled(entity, enabled);
        Ok(())
    }

    pub fn is_enabled(&self, entity: Entity) -> EcsResult<bool> {
        self.directory.is_enabled(entity).ok_or(EcsError::InvalidHandle)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        let Some(id) = component::peek_component_id::<T>() else {
            return Ok(false);
        };
        Ok(self.graph.get(loc.archetype).has_component(id))
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> EcsResult<&T> {
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        let id = component::peek_component_id::<T>().ok_or(EcsError::ComponentNotPresent)?;
        let archetype = self.graph.get(loc.archetype);
        let col = archetype.layout().column(id).ok_or(EcsError::ComponentNotPresent)?;
        let chunk = archetype.chunk(loc.chunk);
        let ptr = unsafe { chunk.raw_component_ptr(col, loc.row) };
        Ok(unsafe { &*ptr.as_ptr().cast::<T>() })
    }

    /// Writes `value` over an existing component, bumping its column's
    /// version (§4.C "write view").
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.write_component(entity, value, true)
    }

    /// Writes `value` over an existing component without bumping its
    /// column's version (§4.C "silent write view").
    pub fn set_component_silent<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.write_component(entity, value, false)
    }

    fn write_component<T: Component>(&mut self, entity: Entity, value: T, bump: bool) -> EcsResult<()> {
        self.store_component(entity, value, bump, true)?;
        let id = component::peek_component_id::<T>().expect("registered by store_component");
        if let Some(hook) = self.registry.describe(id).on_set() {
            hook(entity);
        }
        Ok(())
    }

    /// Constructs `value` into a just-added (uninitialized) component slot
    /// (§4.E transition protocol step 4). Unlike [`World::write_component`],
    /// there is no previous value to drop: the slot's bytes are whatever
    /// the chunk's memory happened to hold before the row was reserved.
    fn init_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        self.store_component(entity, value, true, false)
    }

    fn store_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
        bump: bool,
        drop_previous: bool,
    ) -> EcsResult<()> {
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        let id = component::peek_component_id::<T>().ok_or(EcsError::ComponentNotPresent)?;
        let archetype = self.graph.get(loc.archetype);
        let col = archetype.layout().column(id).ok_or(EcsError::ComponentNotPresent)?.clone();
        let column_index = archetype.layout().column_index(id).unwrap();
        let chunk = archetype.chunk(loc.chunk);
        if col.field_offsets.is_empty() {
            let ptr = unsafe { chunk.raw_component_ptr(&col, loc.row) };
            unsafe {
                if drop_previous {
                    core::ptr::drop_in_place(ptr.as_ptr().cast::<T>());
                }
                core::ptr::write(ptr.as_ptr().cast::<T>(), value);
            }
        } else {
            // SoA: `T`'s row has no contiguous address, so scatter its bytes
            // into each field's own sub-array instead of one `ptr::write`.
            // Assumes `T` is `#[repr(C)]` with fields in the same order and
            // size as `register_soa`'s `field_sizes`, packed with no padding
            // between them (true for same-sized primitive fields, the only
            // case this spec's SoA layout targets) -- Rust's default repr
            // does not guarantee field order, so a non-`repr(C)` `T` here
            // would scatter the wrong bytes to the wrong field.
            let src = (&value as *const T).cast::<u8>();
            let mut field_src_offset = 0usize;
            for (i, &size) in col.field_sizes.iter().enumerate() {
                let dst = unsafe { chunk.raw_field_ptr(&col, i, loc.row) };
                unsafe { core::ptr::copy_nonoverlapping(src.add(field_src_offset), dst.as_ptr(), size) };
                field_src_offset += size;
            }
            core::mem::forget(value);
        }
        if bump {
            let version = self.version.bump();
            self.graph
                .get_mut(loc.archetype)
                .chunk_mut(loc.chunk)
                .bump_column_version(column_index, version);
        }
        Ok(())
    }

    /// Reads one field of a SoA-declared component directly, bypassing
    /// struct reconstruction (there is no reflection to recombine
    /// per-field columns back into `T` generically). `F` must match the
    /// byte size of `field_index` as declared at `register_soa` time.
    pub fn get_soa_field<F: Copy + 'static>(
        &self,
        entity: Entity,
        component: ComponentId,
        field_index: usize,
    ) -> EcsResult<F> {
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        let archetype = self.graph.get(loc.archetype);
        let col = archetype
            .layout()
            .column(component)
            .ok_or(EcsError::ComponentNotPresent)?;
        let chunk = archetype.chunk(loc.chunk);
        let ptr = unsafe { chunk.raw_field_ptr(col, field_index, loc.row) };
        Ok(unsafe { *ptr.as_ptr().cast::<F>() })
    }

    pub fn set_soa_field<F: Copy + 'static>(
        &mut self,
        entity: Entity,
        component: ComponentId,
        field_index: usize,
        value: F,
    ) -> EcsResult<()> {
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        let archetype = self.graph.get(loc.archetype);
        let col = archetype
            .layout()
            .column(component)
            .ok_or(EcsError::ComponentNotPresent)?
            .clone();
        let column_index = archetype.layout().column_index(component).unwrap();
        let chunk = archetype.chunk(loc.chunk);
        let ptr = unsafe { chunk.raw_field_ptr(&col, field_index, loc.row) };
        unsafe { core::ptr::write(ptr.as_ptr().cast::<F>(), value) };
        let version = self.version.bump();
        self.graph
            .get_mut(loc.archetype)
            .chunk_mut(loc.chunk)
            .bump_column_version(column_index, version);
        Ok(())
    }

    /// Adds `T` to `entity` with its default-constructed value, then
    /// immediately overwrites it with `value` (§4.E transition protocol
    /// steps 1-4).
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let id = self.registry.register::<T>();
        if self.directory.locate(entity).is_none() {
            return Err(EcsError::InvalidHandle);
        }
        let loc = self.directory.locate(entity).unwrap();
        if self.graph.get(loc.archetype).has_component(id) {
            // §7 DuplicateComponent: silent no-op on identical value, error
            // on conflict -- requires `register_eq` to compare by value.
            let descriptor = self.registry.describe(id);
            let existing = self.get_component::<T>(entity)?;
            let existing_ptr = core::ptr::NonNull::from(existing).cast::<u8>();
            let staged_ptr = core::ptr::NonNull::from(&value).cast::<u8>();
            let identical = unsafe { descriptor.values_equal(existing_ptr, staged_ptr) };
            if identical {
                return Ok(());
            }
            return Err(EcsError::DuplicateComponent);
        }
        if let Some(hook) = self.registry.describe(id).on_add() {
            hook(entity);
        }
        self.transition_add(entity, id)?;
        self.init_component(entity, value)?;
        Ok(())
    }

    /// Moves `entity` from its current archetype to the archetype with
    /// `id` added, leaving `id`'s slot uninitialized (overwritten
    /// immediately by the caller via `init_component`, §4.E step 4).
    fn transition_add(&mut self, entity: Entity, id: ComponentId) -> EcsResult<()> {
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        let from = loc.archetype;
        let to_ids_len = self.graph.get(from).component_ids().len() + 1;
        if to_ids_len > self.config.max_components_per_archetype {
            return Err(EcsError::CapacityExceeded);
        }
        let to = self.graph.add_edge(from, id, &self.registry, &self.config.chunk);
        self.move_entity(entity, loc, from, to)
    }

    fn transition_remove(&mut self, entity: Entity, id: ComponentId) -> EcsResult<()> {
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        let from = loc.archetype;
        let to = self.graph.remove_edge(from, id, &self.registry, &self.config.chunk);
        self.move_entity(entity, loc, from, to)
    }

    /// Moves one entity's row from `from` to `to`, copying the bytes of
    /// every component present in both (no move-constructor slot is
    /// needed: Rust values are unconditionally relocatable, see
    /// DESIGN.md), dropping components only present in `from`, and
    /// leaving components only present in `to` zero-initialized for the
    /// caller to construct.
    fn move_entity(&mut self, entity: Entity, loc: Location, from: ArchetypeId, to: ArchetypeId) -> EcsResult<()> {
        if from == to {
            return Ok(());
        }
        let (new_chunk, new_row, displaced) = {
            let to_archetype = self.graph.get_mut(to);
            to_archetype.insert(&mut self.allocator, entity)
        };

        {
            let from_layout = self.graph.get(from).layout().clone();
            let to_layout = self.graph.get(to).layout().clone();
            let from_chunk = self.graph.get(from).chunk(loc.chunk);
            let to_chunk = self.graph.get(to).chunk(new_chunk);
            for to_col in &to_layout.columns {
                if let Some(from_col) = from_layout.column(to_col.component_id) {
                    copy_column(from_chunk, from_col, loc.row, to_chunk, to_col, new_row);
                }
            }
        }

        if let Some((displaced_entity, displaced_chunk, displaced_row)) = displaced {
            self.directory.relocate(
                displaced_entity,
                Location {
                    archetype: to,
                    chunk: displaced_chunk,
                    row: displaced_row,
                },
            );
        }

        let removed = self.graph.get_mut(from).remove(loc.chunk, loc.row);
        if let Some((moved_entity, moved_chunk, moved_row)) = removed {
            self.directory.relocate(
                moved_entity,
                Location {
                    archetype: from,
                    chunk: moved_chunk,
                    row: moved_row,
                },
            );
        }

        self.directory.relocate(
            entity,
            Location {
                archetype: to,
                chunk: new_chunk,
                row: new_row,
            },
        );
        self.version.bump();
        Ok(())
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> EcsResult<()> {
        let id = component::peek_component_id::<T>().ok_or(EcsError::ComponentNotPresent)?;
        let loc = self.directory.locate(entity).ok_or(EcsError::InvalidHandle)?;
        if !self.graph.get(loc.archetype).has_component(id) {
            return Err(EcsError::ComponentNotPresent);
        }
        if let Some(hook) = self.registry.describe(id).on_remove() {
            hook(entity);
        }
        self.transition_remove(entity, id)
    }

    /// End-of-frame hook: advances bookkeeping that does not need to
    /// happen on every mutation -- chunk GC and allocator page release
    /// (§6 `update()`, §4.C lifecycle, §4.B).
    pub fn update(&mut self) {
        for (_, archetype) in self.graph.iter_mut() {
            archetype.gc(&mut self.allocator, self.config.chunk_gc_lifespan_ticks);
        }
        self.allocator.gc();
    }
}

impl Drop for World {
    fn drop(&mut self) {
        for (_, archetype) in self.graph.iter_mut() {
            archetype.release_all_chunks(&mut self.allocator);
        }
    }
}

fn copy_column(
    from_chunk: &crate::chunk::Chunk,
    from_col: &crate::archetype::layout::ColumnLayout,
    from_row: u16,
    to_chunk: &crate::chunk::Chunk,
    to_col: &crate::archetype::layout::ColumnLayout,
    to_row: u16,
) {
    unsafe {
        if from_col.field_offsets.is_empty() {
            let src = from_chunk.raw_component_ptr(from_col, from_row);
            let dst = to_chunk.raw_component_ptr(to_col, to_row);
            core::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), from_col.element_size);
        } else {
            for (i, &size) in from_col.field_sizes.iter().enumerate() {
                let src = from_chunk.raw_field_ptr(from_col, i, from_row);
                let dst = to_chunk.raw_field_ptr(to_col, i, to_row);
                core::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), size);
            }
        }
    }
}

/// Snapshot handed back to the query iterator by [`World::refresh_query`].
pub(crate) struct QueryRefresh {
    pub matched: Vec<ArchetypeId>,
    pub changed: smallvec::SmallVec<[ComponentId; 8]>,
    pub observed: WorldVersion,
    pub bootstrap: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position {
        x: f32,
        y: f32,
        z: f32,
    }
    #[derive(Clone, Copy, PartialEq)]
    struct Velocity(f32, f32);

    #[test]
    fn create_and_delete_round_trip() {
        let mut world = World::new();
        let e = world.create_entity();
        assert_eq!(world.len(), 1);
        world.delete_entity(e).unwrap();
        assert_eq!(world.len(), 0);
        assert_eq!(world.delete_entity(e), Err(EcsError::InvalidHandle));
    }

    #[test]
    fn add_get_set_component() {
        let mut world = World::new();
        let e = world.create_entity();
        world
            .add_component(
                e,
                Position {
                    x: 1.0,
                    y: 2.0,
                    z: 3.0,
                },
            )
            .unwrap();
        assert!(world.has_component::<Position>(e).unwrap());
        assert_eq!(world.get_component::<Position>(e).unwrap().x, 1.0);
        world
            .set_component(
                e,
                Position {
                    x: 9.0,
                    y: 2.0,
                    z: 3.0,
                },
            )
            .unwrap();
        assert_eq!(world.get_component::<Position>(e).unwrap().x, 9.0);
    }

    #[test]
    fn add_remove_churn_yields_three_archetypes() {
        let mut world = World::new();
        let mut entities = Vec::new();
        for _ in 0..16 {
            let e = world.create_entity();
            world
                .add_component(
                    e,
                    Position {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                    },
                )
                .unwrap();
            world.add_component(e, Velocity(1.0, 1.0)).unwrap();
            world.remove_component::<Position>(e).unwrap();
            entities.push(e);
        }
        for &e in &entities {
            assert!(!world.has_component::<Position>(e).unwrap());
            assert!(world.has_component::<Velocity>(e).unwrap());
        }
        assert_eq!(world.graph.len(), 3);
    }

    #[test]
    fn duplicate_component_with_identical_value_is_silent_no_op() {
        let mut world = World::new();
        let e = world.create_entity();
        world.registry_mut().register_eq::<Velocity>();
        world.add_component(e, Velocity(1.0, 2.0)).unwrap();
        assert!(world.add_component(e, Velocity(1.0, 2.0)).is_ok());
        assert_eq!(
            world.add_component(e, Velocity(9.0, 9.0)),
            Err(EcsError::DuplicateComponent)
        );
    }

    #[test]
    fn enable_disable_idempotence_and_counts() {
        let mut world = World::new();
        let mut entities = Vec::new();
        for _ in 0..100 {
            let e = world.create_entity();
            world
                .add_component(
                    e,
                    Position {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                    },
                )
                .unwrap();
            entities.push(e);
        }
        world.enable_entity(entities[42], false).unwrap();
        assert_eq!(world.is_enabled(entities[42]).unwrap(), false);
        world.enable_entity(entities[42], false).unwrap();
        assert_eq!(world.is_enabled(entities[42]).unwrap(), false);
        world.enable_entity(entities[42], true).unwrap();
        assert!(world.is_enabled(entities[42]).unwrap());
    }
}
