//! Incremental opcode matching against the archetype graph (spec §4.G
//! "Compilation steps" 3-4 and "Incremental matching").
//!
//! The source compiles `ALL`/`ANY`/`NOT` into a tiny `OP_AND`/`OP_ANY`/
//! `OP_NOT` program walked by a straight-line VM. This crate keeps the
//! three-predicate shape but evaluates it directly as a boolean function
//! per candidate archetype (`matches`) rather than threading success/
//! failure opcode labels through an interpreter loop -- with at most
//! three predicates the "program" has no branches worth compiling, and
//! `matches` is exactly the OP_AND/OP_ANY/OP_NOT semantics inlined.

use crate::{
    archetype::{Archetype, ArchetypeGraph, ArchetypeId},
    query::compiler::QueryKey,
    version::WorldVersion,
};

/// Per-query cached state: the archetypes matched so far (append-only,
/// in first-matched order, §4.G "Ordering/tie-breaks") and the cursor
/// used to scan only newly created archetypes on each refresh.
pub(crate) struct CompiledQuery {
    key: QueryKey,
    matched: Vec<ArchetypeId>,
    scanned_archetypes: usize,
    /// World version as of the end of this query's last iteration; used
    /// as the change-filter baseline. `None` until the first iteration
    /// completes (spec §4.H: "first-ever execution ... skips no chunks").
    observed_version: Option<WorldVersion>,
}

impl CompiledQuery {
    pub(crate) fn new(key: QueryKey) -> Self {
        CompiledQuery {
            key,
            matched: Vec::new(),
            scanned_archetypes: 0,
            observed_version: None,
        }
    }

    pub(crate) fn key(&self) -> &QueryKey {
        &self.key
    }

    pub(crate) fn matched(&self) -> &[ArchetypeId] {
        &self.matched
    }

    pub(crate) fn observed_version(&self) -> Option<WorldVersion> {
        self.observed_version
    }

    pub(crate) fn set_observed_version(&mut self, version: WorldVersion) {
        self.observed_version = Some(version);
    }

    /// Scans archetypes created since the last refresh and appends any
    /// that satisfy the predicate to `matched` (§4.G "Incremental
    /// matching": "walks only the tail ... appending survivors").
    pub(crate) fn refresh(&mut self, graph: &ArchetypeGraph) {
        let total = graph.len();
        while self.scanned_archetypes < total {
            let id = ArchetypeId(self.scanned_archetypes as u32);
            let archetype = graph.get(id);
            if matches(&self.key, archetype) {
                self.matched.push(id);
            }
            self.scanned_archetypes += 1;
        }
    }
}

/// `OP_AND ∧ OP_ANY ∧ OP_NOT`, applied to one archetype's component set.
fn matches(key: &QueryKey, archetype: &Archetype) -> bool {
    if !key.all.iter().all(|&id| archetype.has_component(id)) {
        return false;
    }
    if !key.any.is_empty() && !key.any.iter().any(|&id| archetype.has_component(id)) {
        return false;
    }
    if key.not.iter().any(|&id| archetype.has_component(id)) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::allocator::ChunkAllocatorConfig;
    use smallvec::SmallVec;

    struct A;
    struct B;
    struct C;

    #[test]
    fn refresh_is_incremental_and_append_only() {
        let mut graph = ArchetypeGraph::new(&ChunkAllocatorConfig::default());
        let config = ChunkAllocatorConfig::default();
        let mut registry = crate::component::ComponentRegistry::new();
        let a = registry.register::<A>();
        let b = registry.register::<B>();
        let with_a = graph.add_edge(ArchetypeId::ROOT, a, &registry, &config);

        let key = QueryKey {
            all: SmallVec::from_slice(&[a]),
            ..Default::default()
        };
        let mut query = CompiledQuery::new(key);
        query.refresh(&graph);
        assert_eq!(query.matched(), &[with_a]);

        // Creating an unrelated archetype doesn't touch already-matched results.
        let _with_b = graph.add_edge(ArchetypeId::ROOT, b, &registry, &config);
        query.refresh(&graph);
        assert_eq!(query.matched(), &[with_a]);
    }

    #[test]
    fn any_seeds_from_all_archetypes_when_all_is_empty() {
        let mut graph = ArchetypeGraph::new(&ChunkAllocatorConfig::default());
        let config = ChunkAllocatorConfig::default();
        let mut registry = crate::component::ComponentRegistry::new();
        let c = registry.register::<C>();
        let with_c = graph.add_edge(ArchetypeId::ROOT, c, &registry, &config);

        let key = QueryKey {
            any: SmallVec::from_slice(&[c]),
            ..Default::default()
        };
        let mut query = CompiledQuery::new(key);
        query.refresh(&graph);
        assert!(query.matched().contains(&with_c));
        assert!(!query.matched().contains(&ArchetypeId::ROOT));
    }

    #[test]
    fn not_excludes_matches() {
        let mut graph = ArchetypeGraph::new(&ChunkAllocatorConfig::default());
        let config = ChunkAllocatorConfig::default();
        let mut registry = crate::component::ComponentRegistry::new();
        let a = registry.register::<A>();
        let _with_a = graph.add_edge(ArchetypeId::ROOT, a, &registry, &config);

        let key = QueryKey {
            not: SmallVec::from_slice(&[a]),
            ..Default::default()
        };
        let mut query = CompiledQuery::new(key);
        query.refresh(&graph);
        assert!(query.matched().contains(&ArchetypeId::ROOT));
        assert_eq!(query.matched().len(), 1);
    }
}
