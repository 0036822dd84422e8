//! Archetype graph: dedup by component set, add/remove edges, and the
//! reverse index used by the query engine (spec §4.E).

use {
    crate::{
        archetype::{Archetype, ArchetypeId},
        component::{ComponentId, ComponentRegistry},
        util::XorBuildHasher,
    },
    hashbrown::HashMap,
    smallvec::SmallVec,
};

/// Hash-indexed directory of archetypes, keyed by their sorted
/// component-id multiset, plus the `component_id -> archetypes` reverse
/// index the query compiler walks (§4.E, §4.G).
pub struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    // Keys are sorted component-id slices, i.e. sets: `XorHasher` folds
    // them order-independently, which is cheaper than SipHash over the
    // whole slice and still collision-free enough for a handful of ids.
    by_components: HashMap<SmallVec<[ComponentId; 8]>, ArchetypeId, XorBuildHasher>,
    reverse_index: HashMap<ComponentId, Vec<ArchetypeId>>,
}

impl ArchetypeGraph {
    pub fn new(config: &crate::chunk::allocator::ChunkAllocatorConfig) -> Self {
        let mut graph = ArchetypeGraph {
            archetypes: Vec::new(),
            by_components: HashMap::default(),
            reverse_index: HashMap::new(),
        };
        // The root archetype (no components) always exists, at index 0,
        // so a freshly allocated entity has somewhere to live (§3 "current
        // archetype (or root archetype if entity has no components)").
        let root = Archetype::new(ArchetypeId(0), &[], config);
        graph.archetypes.push(root);
        graph
            .by_components
            .insert(SmallVec::new(), ArchetypeId::ROOT);
        graph
    }

    pub fn get(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArchetypeId, &Archetype)> {
        self.archetypes
            .iter()
            .enumerate()
            .map(|(i, a)| (ArchetypeId(i as u32), a))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ArchetypeId, &mut Archetype)> {
        self.archetypes
            .iter_mut()
            .enumerate()
            .map(|(i, a)| (ArchetypeId(i as u32), a))
    }

    pub fn archetypes_containing(&self, component: ComponentId) -> &[ArchetypeId] {
        self.reverse_index
            .get(&component)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Finds (or creates) the archetype whose component-id set is exactly
    /// `ids` (must already be sorted and deduped).
    pub fn find_or_create(
        &mut self,
        ids: &[ComponentId],
        registry: &ComponentRegistry,
        config: &crate::chunk::allocator::ChunkAllocatorConfig,
    ) -> ArchetypeId {
        let key: SmallVec<[ComponentId; 8]> = SmallVec::from_slice(ids);
        if let Some(&id) = self.by_components.get(&key) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        let descriptors: Vec<&crate::component::ComponentDescriptor> =
            ids.iter().map(|&cid| registry.describe(cid)).collect();
        let archetype = Archetype::new(id, &descriptors, config);
        self.archetypes.push(archetype);
        self.by_components.insert(key, id);
        for &cid in ids {
            self.reverse_index.entry(cid).or_default().push(id);
        }
        log::debug!("archetype graph: created archetype {:?} with {} components", id, ids.len());
        id
    }

    /// Traverses (creating if absent) the `add_edges[component]` edge from
    /// `from`, memoizing it on the archetype (§4.E transition protocol).
    pub fn add_edge(
        &mut self,
        from: ArchetypeId,
        component: ComponentId,
        registry: &ComponentRegistry,
        config: &crate::chunk::allocator::ChunkAllocatorConfig,
    ) -> ArchetypeId {
        if let Some(&to) = self.get(from).add_edges.get(&component) {
            return to;
        }
        let mut ids: SmallVec<[ComponentId; 8]> =
            SmallVec::from_slice(&self.get(from).component_ids());
        let pos = ids.binary_search(&component).unwrap_or_else(|p| p);
        ids.insert(pos, component);
        let to = self.find_or_create(&ids, registry, config);
        self.get_mut(from).add_edges.insert(component, to);
        self.get_mut(to).remove_edges.insert(component, from);
        to
    }

    /// Traverses (creating if absent) the `remove_edges[component]` edge.
    pub fn remove_edge(
        &mut self,
        from: ArchetypeId,
        component: ComponentId,
        registry: &ComponentRegistry,
        config: &crate::chunk::allocator::ChunkAllocatorConfig,
    ) -> ArchetypeId {
        if let Some(&to) = self.get(from).remove_edges.get(&component) {
            return to;
        }
        let mut ids: SmallVec<[ComponentId; 8]> =
            SmallVec::from_slice(&self.get(from).component_ids());
        if let Ok(pos) = ids.binary_search(&component) {
            ids.remove(pos);
        }
        let to = self.find_or_create(&ids, registry, config);
        self.get_mut(from).remove_edges.insert(component, to);
        self.get_mut(to).add_edges.insert(component, from);
        to
    }
}
