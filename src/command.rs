//! Deferred mutation buffer (spec §11 "Command buffer").
//!
//! Structural changes (create, delete, add/remove component) invalidate the
//! chunk and row a running query iteration is looking at -- `World::each`
//! holds borrows into chunk memory for the duration of the callback, so
//! mutating the archetype graph from inside it would be undefined behavior.
//! `CommandBuffer` lets callers queue such mutations during iteration and
//! apply them afterwards, in the order they were recorded.
//!
//! The teacher's and gaia's command buffers encode each op into a tagged
//! byte buffer (`CommandBufferCmd` + a packed data segment) so the op list
//! can live in a flat allocation. Rust's trait objects give the same
//! deferred-call-with-captured-data shape without hand-rolled encoding, so
//! each queued op is boxed as `FnOnce(&mut World)` instead.

use crate::{component::Component, entity::Entity, world::World};

/// Collects mutations during iteration and replays them against a
/// [`World`] once it is safe to do so, in FIFO order.
#[derive(Default)]
pub struct CommandBuffer {
    ops: Vec<Box<dyn FnOnce(&mut World) + 'static>>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        CommandBuffer { ops: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queues the creation of a new empty entity, invoking `then` with the
    /// assigned handle once the buffer is applied. Since the entity does
    /// not exist yet at record time, callers that need to set up components
    /// on it chain further commands from inside `then`.
    pub fn create_entity(&mut self, then: impl FnOnce(&mut World, Entity) + 'static) {
        self.ops.push(Box::new(move |world| {
            let entity = world.create_entity();
            then(world, entity);
        }));
    }

    /// Queues the creation of an entity that clones `source`'s components
    /// (those with a registered clone function; see `World::create_entity_like`).
    pub fn create_entity_like(
        &mut self,
        source: Entity,
        then: impl FnOnce(&mut World, Entity) + 'static,
    ) {
        self.ops.push(Box::new(move |world| {
            if let Ok(entity) = world.create_entity_like(source) {
                then(world, entity);
            }
        }));
    }

    pub fn delete_entity(&mut self, entity: Entity) {
        self.ops.push(Box::new(move |world| {
            let _ = world.delete_entity(entity);
        }));
    }

    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) {
        self.ops.push(Box::new(move |world| {
            let _ = world.add_component(entity, value);
        }));
    }

    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) {
        self.ops.push(Box::new(move |world| {
            let _ = world.set_component(entity, value);
        }));
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        self.ops.push(Box::new(move |world| {
            let _ = world.remove_component::<T>(entity);
        }));
    }

    pub fn enable_entity(&mut self, entity: Entity, enabled: bool) {
        self.ops.push(Box::new(move |world| {
            let _ = world.enable_entity(entity, enabled);
        }));
    }

    /// Applies every queued op against `world` in insertion order, then
    /// clears the buffer. Ops whose target entity was deleted or already in
    /// the target state are silently skipped (errors from the underlying
    /// `World` calls are ignored), matching the teacher's "best-effort
    /// replay" semantics for commands recorded against possibly-stale
    /// handles.
    pub fn apply(&mut self, world: &mut World) {
        for op in self.ops.drain(..) {
            op(world);
        }
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(f32, f32);

    #[test]
    fn queued_create_is_invisible_until_applied() {
        let mut world = World::new();
        let mut cmds = CommandBuffer::new();
        cmds.create_entity(|w, e| {
            let _ = w.add_component(e, Position(1.0, 2.0));
        });

        assert_eq!(world.len(), 0);
        cmds.apply(&mut world);
        assert_eq!(world.len(), 1);
        assert!(cmds.is_empty());
    }

    #[test]
    fn delete_on_stale_entity_is_a_noop() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.delete_entity(entity).unwrap();

        let mut cmds = CommandBuffer::new();
        cmds.delete_entity(entity);
        cmds.apply(&mut world);
        assert_eq!(world.len(), 0);
    }

    #[test]
    fn ops_apply_in_fifo_order() {
        let mut world = World::new();
        let entity = world.create_entity();

        let mut cmds = CommandBuffer::new();
        cmds.add_component(entity, Position(1.0, 1.0));
        cmds.set_component(entity, Position(2.0, 2.0));
        cmds.apply(&mut world);

        assert_eq!(world.get_component::<Position>(entity), Ok(&Position(2.0, 2.0)));
    }
}
