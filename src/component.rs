//! Component registry (spec §4.A).
//!
//! Every distinct component type gets a stable small integer id and a
//! descriptor of its size, alignment, layout, and the type-erased
//! functions a chunk needs to move, copy, drop or compare rows without
//! knowing the concrete type.

use {
    crate::{entity::Entity, util::NoOpBuildHasher},
    core::{
        any::TypeId,
        mem::{align_of, size_of},
        ptr::NonNull,
    },
    hashbrown::HashMap,
    once_cell::sync::Lazy,
    smallvec::SmallVec,
    std::sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};

/// Marker for anything that can be stored as a component.
///
/// Blanket-implemented: the spec only requires "distinct types yield
/// distinct ids" (§6), so any `'static` value usable across the store's
/// single owning thread qualifies.
pub trait Component: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Component for T {}

/// Stable per-type component id (§4.A). Ids are assigned process-wide off
/// a type's `TypeId` the first time any `World` registers it, so that
/// "concurrent registration of the same T must yield the same id" holds
/// even across independent stores (§6). The *descriptor* table itself
/// stays per-registry (Design Notes §9: no process-wide state besides the
/// id itself).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

static NEXT_COMPONENT_ID: AtomicU32 = AtomicU32::new(0);
// `TypeId`'s own hash is already well distributed, so re-mixing it through
// the default hasher buys nothing; `NoOpHasher` just takes it verbatim.
static TYPE_ID_TO_COMPONENT_ID: Lazy<Mutex<HashMap<TypeId, ComponentId, NoOpBuildHasher>>> =
    Lazy::new(|| Mutex::new(HashMap::default()));

fn global_component_id(type_id: TypeId) -> ComponentId {
    let mut map = TYPE_ID_TO_COMPONENT_ID.lock().unwrap();
    *map.entry(type_id).or_insert_with(|| {
        let id = NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed);
        ComponentId(id)
    })
}

/// Looks up `T`'s id without assigning one, for callers that must not
/// register a type just to ask "does this entity have it" (e.g.
/// `World::get_component` on a type no `World` has ever registered).
pub(crate) fn peek_component_id<T: Component>() -> Option<ComponentId> {
    TYPE_ID_TO_COMPONENT_ID
        .lock()
        .unwrap()
        .get(&TypeId::of::<T>())
        .copied()
}

/// Column layout kind (§3 "Component descriptor").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackWidth {
    W4 = 4,
    W8 = 8,
    W16 = 16,
}

#[derive(Clone, Debug)]
pub enum ComponentLayout {
    /// One contiguous element per row.
    AoS,
    /// Each field of the struct is its own contiguous column, grouped in
    /// SIMD-friendly packs of `pack` rows.
    SoA {
        pack: PackWidth,
        /// Byte size of each field, in declaration order.
        field_sizes: SmallVec<[u32; 8]>,
    },
}

pub(crate) type DropFn = unsafe fn(NonNull<u8>);
type CloneFn = unsafe fn(NonNull<u8>, NonNull<u8>);
type EqFn = unsafe fn(NonNull<u8>, NonNull<u8>) -> bool;
type HookFn = fn(Entity);

/// Type-erased descriptor for one registered component type (§3).
#[derive(Clone)]
pub struct ComponentDescriptor {
    id: ComponentId,
    name: &'static str,
    size: u32,
    align: u32,
    layout: ComponentLayout,
    drop_fn: Option<DropFn>,
    clone_fn: Option<CloneFn>,
    eq_fn: Option<EqFn>,
    on_add: Option<HookFn>,
    on_remove: Option<HookFn>,
    on_set: Option<HookFn>,
}

impl core::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("layout", &self.layout)
            .finish()
    }
}

impl ComponentDescriptor {
    fn new<T: Component>() -> Self {
        ComponentDescriptor {
            id: global_component_id(TypeId::of::<T>()),
            name: core::any::type_name::<T>(),
            size: size_of::<T>() as u32,
            align: align_of::<T>() as u32,
            layout: ComponentLayout::AoS,
            drop_fn: if core::mem::needs_drop::<T>() {
                Some(erased_drop::<T>)
            } else {
                None
            },
            clone_fn: None,
            eq_fn: None,
            on_add: None,
            on_remove: None,
            on_set: None,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn align(&self) -> u32 {
        self.align
    }

    pub fn layout(&self) -> &ComponentLayout {
        &self.layout
    }

    pub fn is_zero_sized(&self) -> bool {
        self.size == 0
    }

    pub(crate) fn drop_fn(&self) -> Option<DropFn> {
        self.drop_fn
    }

    pub(crate) fn clone_fn(&self) -> Option<CloneFn> {
        self.clone_fn
    }

    pub fn is_clonable(&self) -> bool {
        self.clone_fn.is_some()
    }

    /// Returns `true` if the two byte-identical-typed values compare equal.
    /// Absent an `eq_fn` (the type never opted in via
    /// [`ComponentRegistry::register_eq`]), two writes are always treated
    /// as conflicting, i.e. never silently deduplicated (§7
    /// `DuplicateComponent`, "default: silent no-op on identical value,
    /// error on conflict").
    pub(crate) unsafe fn values_equal(&self, a: NonNull<u8>, b: NonNull<u8>) -> bool {
        match self.eq_fn {
            Some(eq) => eq(a, b),
            None => false,
        }
    }

    pub(crate) fn on_add(&self) -> Option<HookFn> {
        self.on_add
    }

    pub(crate) fn on_remove(&self) -> Option<HookFn> {
        self.on_remove
    }

    pub(crate) fn on_set(&self) -> Option<HookFn> {
        self.on_set
    }
}

unsafe fn erased_drop<T>(ptr: NonNull<u8>) {
    core::ptr::drop_in_place(ptr.as_ptr().cast::<T>());
}

unsafe fn erased_clone<T: Clone>(src: NonNull<u8>, dst: NonNull<u8>) {
    let value = (*src.as_ptr().cast::<T>()).clone();
    core::ptr::write(dst.as_ptr().cast::<T>(), value);
}

unsafe fn erased_eq<T: PartialEq>(a: NonNull<u8>, b: NonNull<u8>) -> bool {
    *a.as_ptr().cast::<T>() == *b.as_ptr().cast::<T>()
}

/// Per-`World` table of registered component descriptors (§4.A).
///
/// Registration is idempotent: registering the same `T` twice returns the
/// same [`ComponentId`] and leaves the descriptor (including any lifecycle
/// hooks already attached) untouched.
#[derive(Default)]
pub struct ComponentRegistry {
    descriptors: Vec<Option<ComponentDescriptor>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        ComponentRegistry {
            descriptors: Vec::new(),
        }
    }

    fn ensure_slot(&mut self, id: ComponentId) -> &mut Option<ComponentDescriptor> {
        let idx = id.index();
        if idx >= self.descriptors.len() {
            self.descriptors.resize(idx + 1, None);
        }
        &mut self.descriptors[idx]
    }

    /// Registers `T`, if not already registered, and returns its id.
    pub fn register<T: Component>(&mut self) -> ComponentId {
        let id = global_component_id(TypeId::of::<T>());
        let slot = self.ensure_slot(id);
        if slot.is_none() {
            *slot = Some(ComponentDescriptor::new::<T>());
        }
        id
    }

    /// Registers `T` with clone support, enabling `create_entity_like` and
    /// command-buffer value capture for this component type.
    pub fn register_clone<T: Component + Clone>(&mut self) -> ComponentId {
        let id = self.register::<T>();
        let slot = self.descriptors[id.index()].as_mut().unwrap();
        slot.clone_fn = Some(erased_clone::<T>);
        id
    }

    /// Registers `T` with equality support, enabling the "silent no-op on
    /// identical value" branch of `DuplicateComponent` handling (§7).
    pub fn register_eq<T: Component + PartialEq>(&mut self) -> ComponentId {
        let id = self.register::<T>();
        let slot = self.descriptors[id.index()].as_mut().unwrap();
        slot.eq_fn = Some(erased_eq::<T>);
        id
    }

    pub fn set_on_add<T: Component>(&mut self, hook: HookFn) {
        let id = self.register::<T>();
        self.descriptors[id.index()].as_mut().unwrap().on_add = Some(hook);
    }

    pub fn set_on_remove<T: Component>(&mut self, hook: HookFn) {
        let id = self.register::<T>();
        self.descriptors[id.index()].as_mut().unwrap().on_remove = Some(hook);
    }

    pub fn set_on_set<T: Component>(&mut self, hook: HookFn) {
        let id = self.register::<T>();
        self.descriptors[id.index()].as_mut().unwrap().on_set = Some(hook);
    }

    /// Declares `T` as struct-of-arrays with the given field byte sizes,
    /// packed for SIMD access in groups of `pack` rows (§3, §4.D).
    pub fn register_soa<T: Component>(
        &mut self,
        pack: PackWidth,
        field_sizes: &[u32],
    ) -> ComponentId {
        let id = self.register::<T>();
        let slot = self.descriptors[id.index()].as_mut().unwrap();
        slot.layout = ComponentLayout::SoA {
            pack,
            field_sizes: SmallVec::from_slice(field_sizes),
        };
        id
    }

    /// Infallible after registration (§4.A).
    pub fn describe(&self, id: ComponentId) -> &ComponentDescriptor {
        self.descriptors[id.index()]
            .as_ref()
            .expect("describe() called with an id that was never registered in this registry")
    }

    pub fn is_registered(&self, id: ComponentId) -> bool {
        self.descriptors
            .get(id.index())
            .map_or(false, |d| d.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position {
        x: f32,
        y: f32,
    }
    #[derive(Clone, PartialEq)]
    struct Velocity(f32, f32);
    struct Tag;

    #[test]
    fn register_is_idempotent() {
        let mut reg = ComponentRegistry::new();
        let a = reg.register::<Position>();
        let b = reg.register::<Position>();
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_registration_yields_same_id() {
        let mut reg_a = ComponentRegistry::new();
        let mut reg_b = ComponentRegistry::new();
        assert_eq!(reg_a.register::<Velocity>(), reg_b.register::<Velocity>());
    }

    #[test]
    fn distinct_types_get_distinct_ids() {
        let mut reg = ComponentRegistry::new();
        assert_ne!(reg.register::<Position>(), reg.register::<Velocity>());
    }

    #[test]
    fn zero_sized_tag_component() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Tag>();
        assert!(reg.describe(id).is_zero_sized());
    }

    #[test]
    fn clone_and_eq_opt_in() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register_clone::<Velocity>();
        let id2 = reg.register_eq::<Velocity>();
        assert_eq!(id, id2);
        assert!(reg.describe(id).is_clonable());
    }
}
