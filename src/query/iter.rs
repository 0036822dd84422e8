//! Query builder, disabled-row handling, and filtered iteration (spec
//! §4.G, §4.H).

use crate::{
    component::{Component, ComponentId},
    entity::Entity,
    query::{
        compiler::QueryKey,
        fetch::{self, Fetch, FetchShape, FetchSlice},
    },
    world::World,
};
use smallvec::SmallVec;

/// Which rows of a chunk a query visits (§4.H "Contracts").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterMode {
    /// Enabled rows only (the default).
    Enabled,
    /// Every row, enabled and disabled.
    All,
    /// Disabled rows only.
    DisabledOnly,
}

impl IterMode {
    fn row_range(self, disabled_count: u16, count: u16) -> (u16, u16) {
        match self {
            IterMode::Enabled => (disabled_count, count),
            IterMode::All => (0, count),
            IterMode::DisabledOnly => (0, disabled_count),
        }
    }
}

/// Builds a query against a `World`: chained `.all()`/`.any()`/`.none()`/
/// `.changed()` calls accumulate predicate terms, then `.each()` or
/// `.iter_chunks()` compiles (or reuses the cached compilation of) the
/// predicate and runs the filtered iteration.
pub struct QueryBuilder<'w> {
    world: &'w mut World,
    key: QueryKey,
    mode: IterMode,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        QueryBuilder {
            world,
            key: QueryKey::default(),
            mode: IterMode::Enabled,
        }
    }

    pub fn all<T: Component>(mut self) -> Self {
        let id = self.world.registry_mut().register::<T>();
        self.key.all.push(id);
        self
    }

    pub fn any<T: Component>(mut self) -> Self {
        let id = self.world.registry_mut().register::<T>();
        self.key.any.push(id);
        self
    }

    pub fn none<T: Component>(mut self) -> Self {
        let id = self.world.registry_mut().register::<T>();
        self.key.not.push(id);
        self
    }

    /// Restricts iteration to chunks whose `T` column was written since
    /// this query's last iteration (§4.H "Change-filter"). Implies `all`:
    /// a chunk cannot be tested for a column it does not have.
    pub fn changed<T: Component>(mut self) -> Self {
        let id = self.world.registry_mut().register::<T>();
        self.key.changed.push(id);
        self.key.all.push(id);
        self
    }

    pub fn mode(mut self, mode: IterMode) -> Self {
        self.mode = mode;
        self
    }

    /// Runs `callback` once per matched, visible row, handing it the
    /// entity and the typed view(s) declared by `Q` (`Read<T>`, `Write<T>`,
    /// or a tuple of up to four such legs).
    pub fn each<Q>(self, mut callback: impl for<'r> FnMut(Entity, <Q as Fetch<'r>>::Item))
    where
        Q: FetchShape + for<'a> Fetch<'a>,
    {
        let QueryBuilder { world, mut key, mode } = self;

        let mut fetch_ids: SmallVec<[ComponentId; 8]> = SmallVec::new();
        Q::register_ids(world.registry_mut(), &mut fetch_ids);
        fetch::assert_no_duplicate_fetches(&fetch_ids);
        key.all.extend(fetch_ids.iter().copied());
        key.canonicalize();

        let mut write_flags: SmallVec<[bool; 8]> = SmallVec::new();
        Q::is_write(&mut write_flags);
        let any_write = write_flags.iter().any(|&w| w);

        let new_version = if any_write {
            Some(world.bump_version())
        } else {
            None
        };

        let refresh = world.refresh_query(key.clone());
        let (matched, changed_ids, observed, bootstrap) =
            (refresh.matched, refresh.changed, refresh.observed, refresh.bootstrap);

        let start_version = world.version();

        for archetype_id in matched {
            // Cloned once per archetype so the fetch loop below doesn't hold
            // a borrow of `world.graph()` across the later mutable reborrow
            // that bumps written columns' versions.
            let layout = world.graph().get(archetype_id).layout().clone();
            let chunk_ids: Vec<_> = world.graph().get(archetype_id).chunk_ids().collect();

            for chunk_id in chunk_ids {
                {
                    let archetype = world.graph().get(archetype_id);
                    let chunk = archetype.chunk(chunk_id);

                    if !bootstrap && !changed_ids.is_empty() {
                        let touched = changed_ids.iter().any(|&id| match layout.column_index(id) {
                            Some(idx) => chunk.column_version(idx).is_newer_than(observed),
                            None => false,
                        });
                        if !touched {
                            continue;
                        }
                    }

                    let (lo, hi) = mode.row_range(chunk.disabled_count(), chunk.len());
                    for row in lo..hi {
                        let entity = chunk.entity_at(row);
                        let mut cursor = 0usize;
                        let item = unsafe { Q::fetch_at(chunk, &layout, &fetch_ids, &mut cursor, row) };
                        callback(entity, item);
                    }
                }

                if let Some(version) = new_version {
                    let archetype_mut = world.graph_mut().get_mut(archetype_id);
                    for (i, &id) in fetch_ids.iter().enumerate() {
                        if write_flags[i] {
                            if let Some(idx) = layout.column_index(id) {
                                archetype_mut.chunk_mut(chunk_id).bump_column_version(idx, version);
                            }
                        }
                    }
                }
            }
        }

        world.finish_query(&key, start_version);
    }

    /// Runs `callback` once per matched, visible chunk, handing it the
    /// entity slice and the typed column slice(s) declared by `Q`
    /// (§4.H "Full iterator"), rather than once per row as [`each`] does.
    ///
    /// [`each`]: QueryBuilder::each
    pub fn iter_chunks<Q>(self, mut callback: impl for<'r> FnMut(&'r [Entity], <Q as FetchSlice<'r>>::Item))
    where
        Q: FetchShape + for<'a> FetchSlice<'a>,
    {
        let QueryBuilder { world, mut key, mode } = self;

        let mut fetch_ids: SmallVec<[ComponentId; 8]> = SmallVec::new();
        Q::register_ids(world.registry_mut(), &mut fetch_ids);
        fetch::assert_no_duplicate_fetches(&fetch_ids);
        key.all.extend(fetch_ids.iter().copied());
        key.canonicalize();

        let mut write_flags: SmallVec<[bool; 8]> = SmallVec::new();
        Q::is_write(&mut write_flags);
        let any_write = write_flags.iter().any(|&w| w);

        let new_version = if any_write {
            Some(world.bump_version())
        } else {
            None
        };

        let refresh = world.refresh_query(key.clone());
        let (matched, changed_ids, observed, bootstrap) =
            (refresh.matched, refresh.changed, refresh.observed, refresh.bootstrap);

        let start_version = world.version();

        for archetype_id in matched {
            let layout = world.graph().get(archetype_id).layout().clone();
            let chunk_ids: Vec<_> = world.graph().get(archetype_id).chunk_ids().collect();

            for chunk_id in chunk_ids {
                {
                    let archetype = world.graph().get(archetype_id);
                    let chunk = archetype.chunk(chunk_id);

                    if !bootstrap && !changed_ids.is_empty() {
                        let touched = changed_ids.iter().any(|&id| match layout.column_index(id) {
                            Some(idx) => chunk.column_version(idx).is_newer_than(observed),
                            None => false,
                        });
                        if !touched {
                            continue;
                        }
                    }

                    let (lo, hi) = mode.row_range(chunk.disabled_count(), chunk.len());
                    if lo < hi {
                        let entities = chunk.entities(lo, hi);
                        let mut cursor = 0usize;
                        let item = unsafe { Q::fetch_slice(chunk, &layout, &fetch_ids, &mut cursor, lo, hi) };
                        callback(entities, item);
                    }
                }

                if let Some(version) = new_version {
                    let archetype_mut = world.graph_mut().get_mut(archetype_id);
                    for (i, &id) in fetch_ids.iter().enumerate() {
                        if write_flags[i] {
                            if let Some(idx) = layout.column_index(id) {
                                archetype_mut.chunk_mut(chunk_id).bump_column_version(idx, version);
                            }
                        }
                    }
                }
            }
        }

        world.finish_query(&key, start_version);
    }
}
