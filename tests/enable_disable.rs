//! End-to-end: disabling one entity removes it from the default (enabled)
//! query and surfaces it under `disabled_only`; re-enabling restores it.

use archetype_ecs::{IterMode, Read, World};

#[derive(Clone, Copy)]
struct Position {
    _x: f32,
    _y: f32,
}

fn count_matches(world: &mut World, mode: IterMode) -> usize {
    let mut count = 0;
    world
        .query()
        .all::<Position>()
        .mode(mode)
        .each::<Read<Position>>(|_entity, _pos| count += 1);
    count
}

#[test]
fn disabling_one_entity_moves_it_between_default_and_disabled_only() {
    let mut world = World::new();
    let mut entities = Vec::with_capacity(100);
    for _ in 0..100 {
        let e = world.create_entity();
        world.add_component(e, Position { _x: 0.0, _y: 0.0 }).unwrap();
        entities.push(e);
    }

    assert_eq!(count_matches(&mut world, IterMode::Enabled), 100);

    world.enable_entity(entities[42], false).unwrap();
    assert_eq!(count_matches(&mut world, IterMode::Enabled), 99);
    assert_eq!(count_matches(&mut world, IterMode::DisabledOnly), 1);

    world.enable_entity(entities[42], true).unwrap();
    assert_eq!(count_matches(&mut world, IterMode::Enabled), 100);
}
