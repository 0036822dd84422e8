//! End-to-end: repeated add/remove churn settles every entity into the
//! `{Velocity}` archetype and leaves exactly three archetypes discovered
//! (the empty root, `{Velocity}`, and the transient `{Position, Velocity}`
//! the add/remove sequence passes through).

use archetype_ecs::World;

const COUNT: usize = 10_000;

struct Position {
    _x: f32,
    _y: f32,
    _z: f32,
}
#[derive(Clone, Copy)]
struct Velocity(f32, f32);

#[test]
fn add_remove_churn_settles_into_velocity_only_archetype() {
    let mut world = World::new();
    let mut entities = Vec::with_capacity(COUNT);
    for _ in 0..COUNT {
        let e = world.create_entity();
        world
            .add_component(
                e,
                Position {
                    _x: 0.0,
                    _y: 0.0,
                    _z: 0.0,
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
    assert_eq!(world.archetype_count(), 3);
}
